// 该文件是 Shanan （山南西风） 项目的一部分。
// src/session.rs - 分割会话：保存最近一帧结果并支持重绘
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

use std::time::Duration;

use image::{RgbImage, RgbaImage};
use tracing::{error, info};

use crate::{
  mask::InstanceMask,
  model::{Detection, Model},
  output::draw::{Draw, MaskSnapshot, composite},
  pipeline::{PipelineError, SegmentPipeline, Segmentation},
};

/// 最近一帧的完整结果
#[derive(Debug, Clone)]
pub struct FrameResult {
  /// 按分数降序排列的检测
  pub detections: Vec<Detection>,
  pub masks: Vec<InstanceMask>,
  /// 掩码 + 检测框 + 标签
  pub overlay: RgbaImage,
  /// 绘制检测框之前的掩码层
  pub snapshot: MaskSnapshot,
  pub inference_time: Duration,
  /// 当前隔离显示的检测下标
  pub selected: Option<usize>,
}

impl FrameResult {
  pub fn empty(width: u32, height: u32) -> Self {
    Self::from_segmentation(Segmentation::empty(width, height))
  }

  fn from_segmentation(segmentation: Segmentation) -> Self {
    let Segmentation {
      detections,
      masks,
      mask_layer,
      inference_time,
    } = segmentation;
    Self {
      detections,
      masks,
      snapshot: MaskSnapshot::capture(&mask_layer),
      overlay: mask_layer,
      inference_time,
      selected: None,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }
}

impl Default for FrameResult {
  fn default() -> Self {
    Self::empty(0, 0)
  }
}

pub struct SegmentSession {
  pipeline: SegmentPipeline,
  draw: Draw,
  frame: FrameResult,
}

impl SegmentSession {
  pub fn new(pipeline: SegmentPipeline, draw: Draw) -> Self {
    let draw = draw.with_color_order(pipeline.color_order());
    Self {
      pipeline,
      draw,
      frame: FrameResult::default(),
    }
  }

  pub fn pipeline(&self) -> &SegmentPipeline {
    &self.pipeline
  }

  pub fn draw(&self) -> &Draw {
    &self.draw
  }

  /// 处理一帧图像，替换之前保存的结果
  ///
  /// 出错时保存的结果被重置为与输入同尺寸的空结果（无检测、全透明覆盖层），
  /// 然后返回错误。
  pub fn process<M: Model>(
    &mut self,
    image: &RgbImage,
    model: &M,
  ) -> Result<&FrameResult, PipelineError> {
    match self.pipeline.run(image, model) {
      Ok(segmentation) => {
        let mut frame = FrameResult::from_segmentation(segmentation);
        self
          .draw
          .draw_boxes(&mut frame.overlay, &frame.detections, None);
        info!(
          "本帧检测到 {} 个实例，推理耗时: {:.2?}",
          frame.detections.len(),
          frame.inference_time
        );
        self.frame = frame;
        Ok(&self.frame)
      }
      Err(err) => {
        error!("分割失败: {}", err);
        let (width, height) = image.dimensions();
        self.frame = FrameResult::empty(width, height);
        Err(err)
      }
    }
  }

  /// 在保存的掩码层上重绘检测框
  ///
  /// `Some(i)` 隔离显示第 `i` 个检测，`None` 恢复全部正常显示。
  pub fn redraw(&mut self, selected: Option<usize>) -> &RgbaImage {
    let frame = &mut self.frame;
    self
      .draw
      .redraw_into(&mut frame.overlay, &frame.snapshot, &frame.detections, selected);
    frame.selected = selected;
    &frame.overlay
  }

  pub fn frame(&self) -> &FrameResult {
    &self.frame
  }

  pub fn detections(&self) -> &[Detection] {
    &self.frame.detections
  }

  pub fn overlay(&self) -> &RgbaImage {
    &self.frame.overlay
  }

  /// 将当前覆盖层叠加到原图上
  pub fn composite(&self, source: &RgbImage) -> RgbImage {
    composite(source, &self.frame.overlay)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::PipelineConfig,
    decoder::tests::prediction_tensor,
    frame::NchwTensor,
    tensor::{ModelOutputs, Tensor},
  };

  struct FixedModel(ModelOutputs);

  #[derive(Debug, thiserror::Error)]
  #[error("fixed model")]
  struct Never;

  impl Model for FixedModel {
    type Error = Never;

    fn infer(&self, _input: &NchwTensor) -> Result<ModelOutputs, Self::Error> {
      Ok(self.0.clone())
    }
  }

  fn session() -> SegmentSession {
    let config = PipelineConfig::default()
      .with_num_classes(2)
      .with_mask_channels(1);
    SegmentSession::new(SegmentPipeline::new(config).unwrap(), Draw::default())
  }

  fn model() -> FixedModel {
    let predictions = prediction_tensor(
      &[
        ([16.0, 24.0, 16.0, 16.0], 0, 0.8, vec![3.0]),
        ([48.0, 24.0, 16.0, 16.0], 1, 0.7, vec![3.0]),
      ],
      2,
      1,
    );
    let prototypes = Tensor::new(vec![1, 1, 8, 8], vec![1.0; 64]).unwrap();
    FixedModel(ModelOutputs::new(predictions, prototypes))
  }

  #[test]
  fn redraw_round_trip_restores_overlay() {
    let mut session = session();
    let image = RgbImage::new(64, 64);
    session.process(&image, &model()).unwrap();
    assert_eq!(session.detections().len(), 2);

    let original = session.overlay().clone();
    let isolated = session.redraw(Some(1)).clone();
    assert_ne!(isolated, original);
    assert_eq!(session.frame().selected, Some(1));

    assert_eq!(session.redraw(None), &original);
    assert_eq!(session.redraw(None), &original);
  }

  #[test]
  fn failure_resets_to_empty_frame() {
    let mut session = session();
    let image = RgbImage::new(64, 48);
    session.process(&image, &model()).unwrap();
    assert!(!session.frame().is_empty());

    let broken = FixedModel(ModelOutputs::default());
    assert!(session.process(&image, &broken).is_err());
    assert!(session.frame().is_empty());
    assert_eq!(session.overlay().dimensions(), (64, 48));
    assert!(session.overlay().pixels().all(|p| p[3] == 0));
  }
}
