// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decoder.rs - 候选框解码
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use ndarray::{ArrayView2, ArrayView3, s};
use thiserror::Error;
use tracing::{debug, error};

use crate::{
  config::PipelineConfig, geometry::GeometryContext, model::Detection, tensor::Tensor,
};

pub const PREDICTION_OUTPUT: &str = "output0";
pub const PROTOTYPE_OUTPUT: &str = "output1";

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("模型缺少输出张量: {0}")]
  MissingOutput(&'static str),
  #[error("输出张量 {name} 形状不匹配: 期望 {expected}, 实际 {actual:?}")]
  ShapeMismatch {
    name: &'static str,
    expected: String,
    actual: Vec<usize>,
  },
}

/// 将预测张量视为 `[属性数, 候选数]` 的二维矩阵
///
/// 预测张量按属性优先存储：先是全部候选的中心 x，然后是中心 y、宽、高，
/// 接着每个类别一行分数，最后每个掩码通道一行系数。
pub fn prediction_view<'a>(
  predictions: &'a Tensor,
  config: &PipelineConfig,
) -> Result<ArrayView2<'a, f32>, DecodeError> {
  let expected_attrs = config.num_attributes();
  let mismatch = || {
    error!(
      "预测张量形状不匹配: 期望 [1, {}, N], 实际 {:?}",
      expected_attrs,
      predictions.shape()
    );
    DecodeError::ShapeMismatch {
      name: PREDICTION_OUTPUT,
      expected: format!("[1, {}, N]", expected_attrs),
      actual: predictions.shape().to_vec(),
    }
  };

  let shape = predictions.squeezed_shape(2).ok_or_else(mismatch)?;
  if shape[0] != expected_attrs {
    return Err(mismatch());
  }

  ArrayView2::from_shape((shape[0], shape[1]), predictions.data()).map_err(|_| mismatch())
}

/// 将原型掩码张量视为 `[通道数, 掩码高, 掩码宽]` 的三维数组
pub fn prototype_view<'a>(
  prototypes: &'a Tensor,
  config: &PipelineConfig,
) -> Result<ArrayView3<'a, f32>, DecodeError> {
  let mismatch = || {
    error!(
      "原型掩码张量形状不匹配: 期望 [1, {}, H, W], 实际 {:?}",
      config.mask_channels,
      prototypes.shape()
    );
    DecodeError::ShapeMismatch {
      name: PROTOTYPE_OUTPUT,
      expected: format!("[1, {}, H, W]", config.mask_channels),
      actual: prototypes.shape().to_vec(),
    }
  };

  let shape = prototypes.squeezed_shape(3).ok_or_else(mismatch)?;
  if shape[0] != config.mask_channels {
    return Err(mismatch());
  }

  ArrayView3::from_shape((shape[0], shape[1], shape[2]), prototypes.data())
    .map_err(|_| mismatch())
}

/// 解码全部候选，返回分数严格大于阈值的检测结果（未排序，未计算掩码）
pub fn decode_candidates(
  predictions: ArrayView2<'_, f32>,
  geometry: &GeometryContext,
  config: &PipelineConfig,
) -> Vec<Detection> {
  let num_predictions = predictions.ncols();
  let num_classes = config.num_classes;

  let boxes = predictions.slice(s![..4, ..]);
  let scores = predictions.slice(s![4..4 + num_classes, ..]);
  let coefficients = predictions.slice(s![4 + num_classes.., ..]);

  let mut detections = Vec::new();
  for i in 0..num_predictions {
    let (class_idx, score) = scores.column(i).iter().enumerate().fold(
      (0usize, 0.0f32),
      |(best_idx, best), (c, &s)| {
        if s > best { (c, s) } else { (best_idx, best) }
      },
    );

    if score <= config.score_threshold {
      continue;
    }

    // 先乘比例，再由中心点换算左上角
    let width = (boxes[[2, i]] * geometry.x_ratio).max(0.0);
    let height = (boxes[[3, i]] * geometry.y_ratio).max(0.0);
    let x = boxes[[0, i]] * geometry.x_ratio - 0.5 * width;
    let y = boxes[[1, i]] * geometry.y_ratio - 0.5 * height;

    detections.push(Detection {
      bbox: [x, y, width, height],
      class_idx,
      score,
      mask_coefficients: coefficients.column(i).to_vec().into_boxed_slice(),
    });
  }

  debug!(
    "候选数 {}, 通过阈值 {} 的检测数 {}",
    num_predictions,
    config.score_threshold,
    detections.len()
  );
  detections
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  /// 按属性优先的布局构造预测张量，`boxes` 为中心点格式 `[cx, cy, w, h]`
  pub(crate) fn prediction_tensor(
    candidates: &[([f32; 4], usize, f32, Vec<f32>)],
    num_classes: usize,
    mask_channels: usize,
  ) -> Tensor {
    let n = candidates.len();
    let attrs = 4 + num_classes + mask_channels;
    let mut data = vec![0.0f32; attrs * n];
    for (i, (bbox, class_idx, score, coefficients)) in candidates.iter().enumerate() {
      for k in 0..4 {
        data[k * n + i] = bbox[k];
      }
      data[(4 + class_idx) * n + i] = *score;
      for (c, value) in coefficients.iter().enumerate() {
        data[(4 + num_classes + c) * n + i] = *value;
      }
    }
    Tensor::new(vec![1, attrs, n], data).unwrap()
  }

  fn config() -> PipelineConfig {
    PipelineConfig::default()
      .with_num_classes(3)
      .with_mask_channels(2)
      .with_score_threshold(0.5)
  }

  #[test]
  fn decodes_center_boxes_after_scaling() {
    let config = config();
    let tensor = prediction_tensor(&[([50.0, 40.0, 20.0, 10.0], 2, 0.9, vec![0.25, -1.0])], 3, 2);
    let view = prediction_view(&tensor, &config).unwrap();
    let geometry = GeometryContext {
      x_ratio: 2.0,
      y_ratio: 0.5,
      ..GeometryContext::identity()
    };

    let detections = decode_candidates(view, &geometry, &config);
    assert_eq!(detections.len(), 1);
    let det = &detections[0];
    assert_eq!(det.class_idx, 2);
    assert_eq!(det.score, 0.9);
    assert_eq!(det.bbox, [80.0, 17.5, 40.0, 5.0]);
    assert_eq!(&*det.mask_coefficients, &[0.25, -1.0]);
  }

  #[test]
  fn threshold_is_strict() {
    let config = config();
    let tensor = prediction_tensor(
      &[
        ([10.0, 10.0, 4.0, 4.0], 0, 0.5, vec![0.0, 0.0]),
        ([10.0, 10.0, 4.0, 4.0], 1, 0.51, vec![0.0, 0.0]),
        ([10.0, 10.0, 4.0, 4.0], 1, 0.2, vec![0.0, 0.0]),
      ],
      3,
      2,
    );
    let view = prediction_view(&tensor, &config).unwrap();
    let detections = decode_candidates(view, &GeometryContext::identity(), &config);
    assert_eq!(detections.len(), 1);
    assert!(detections.iter().all(|d| d.score > config.score_threshold));
    assert_eq!(detections[0].class_idx, 1);
  }

  #[test]
  fn picks_max_class_score() {
    let config = config();
    let mut tensor_data = prediction_tensor(&[([0.0; 4], 0, 0.6, vec![0.0, 0.0])], 3, 2)
      .data()
      .to_vec();
    // 第 1 类分数更高
    tensor_data[5] = 0.8;
    let tensor = Tensor::new(vec![1, 9, 1], tensor_data).unwrap();
    let view = prediction_view(&tensor, &config).unwrap();
    let detections = decode_candidates(view, &GeometryContext::identity(), &config);
    assert_eq!(detections[0].class_idx, 1);
    assert_eq!(detections[0].score, 0.8);
  }

  #[test]
  fn empty_predictions() {
    let config = config();
    let tensor = Tensor::new(vec![1, 9, 0], Vec::new()).unwrap();
    let view = prediction_view(&tensor, &config).unwrap();
    assert!(decode_candidates(view, &GeometryContext::identity(), &config).is_empty());
  }

  #[test]
  fn rejects_wrong_attribute_count() {
    let config = config();
    let tensor = Tensor::new(vec![1, 8, 2], vec![0.0; 16]).unwrap();
    let err = prediction_view(&tensor, &config).unwrap_err();
    assert!(matches!(
      err,
      DecodeError::ShapeMismatch {
        name: PREDICTION_OUTPUT,
        ..
      }
    ));
  }

  #[test]
  fn rejects_wrong_prototype_channels() {
    let config = config();
    let tensor = Tensor::new(vec![1, 3, 4, 4], vec![0.0; 48]).unwrap();
    assert!(prototype_view(&tensor, &config).is_err());

    let tensor = Tensor::new(vec![1, 2, 4, 4], vec![0.0; 32]).unwrap();
    let view = prototype_view(&tensor, &config).unwrap();
    assert_eq!(view.dim(), (2, 4, 4));
  }
}
