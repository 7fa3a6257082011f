// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::time::{Duration, Instant};

use tracing::info;

use crate::{frame::NchwTensor, labels, tensor::ModelOutputs};

/// 推理引擎
///
/// 分割流水线只消费引擎输出的张量，引擎本身（会话生命周期、执行后端）由调用方持有，
/// 以引用的方式传入。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, input: &NchwTensor) -> Result<ModelOutputs, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Error = M::Error;

  fn infer(&self, input: &NchwTensor) -> Result<ModelOutputs, Self::Error> {
    (**self).infer(input)
  }
}

/// 用全零输入执行一次推理，返回耗时
pub fn warm_up<M: Model>(model: &M, width: u32, height: u32) -> Result<Duration, M::Error> {
  let input = NchwTensor::zeros(width, height);
  let now = Instant::now();
  model.infer(&input)?;
  let elapsed = now.elapsed();
  info!("模型预热完成 ({}x{})，耗时: {:.2?}", width, height, elapsed);
  Ok(elapsed)
}

/// 一个检测到的实例
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// 原图坐标下的 `[x, y, width, height]`，左上角为原点
  pub bbox: [f32; 4],
  pub class_idx: usize,
  /// 最大类别分数
  pub score: f32,
  /// 掩码系数，长度等于原型掩码通道数
  pub mask_coefficients: Box<[f32]>,
}

impl Detection {
  pub fn class_name(&self) -> &'static str {
    labels::class_name(self.class_idx)
  }
}

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxModel, OnnxModelBuilder, OnnxModelError};
