// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 模型输出张量
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

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
  #[error("数据长度不匹配: 形状 {shape:?} 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
}

/// 推理引擎输出的原始浮点张量，按行主序平铺存储
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  shape: Vec<usize>,
  data: Box<[f32]>,
}

impl Tensor {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
    let expected = shape.iter().product::<usize>();
    if expected != data.len() {
      return Err(TensorError::LengthMismatch {
        shape,
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  /// 去掉前导的批次维度 1，得到 `rank` 维形状
  ///
  /// `[1, 116, 8400]` 与 `[116, 8400]` 都会被视为二维。
  pub fn squeezed_shape(&self, rank: usize) -> Option<&[usize]> {
    let mut shape = self.shape.as_slice();
    while shape.len() > rank && shape[0] == 1 {
      shape = &shape[1..];
    }
    (shape.len() == rank).then_some(shape)
  }
}

/// 一帧推理的全部输出
///
/// `predictions` 对应 `output0`（`[1, 4 + 类别数 + 掩码通道数, 候选数]`，属性优先存储），
/// `prototypes` 对应 `output1`（`[1, 掩码通道数, 掩码高, 掩码宽]`）。
#[derive(Debug, Clone, Default)]
pub struct ModelOutputs {
  pub predictions: Option<Tensor>,
  pub prototypes: Option<Tensor>,
}

impl ModelOutputs {
  pub fn new(predictions: Tensor, prototypes: Tensor) -> Self {
    Self {
      predictions: Some(predictions),
      prototypes: Some(prototypes),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_wrong_length() {
    let err = Tensor::new(vec![1, 2, 3], vec![0.0; 5]).unwrap_err();
    assert_eq!(
      err,
      TensorError::LengthMismatch {
        shape: vec![1, 2, 3],
        expected: 6,
        actual: 5
      }
    );
  }

  #[test]
  fn squeezes_batch_dimension() {
    let tensor = Tensor::new(vec![1, 4, 2], vec![0.0; 8]).unwrap();
    assert_eq!(tensor.squeezed_shape(2), Some(&[4usize, 2][..]));
    assert_eq!(tensor.squeezed_shape(3), Some(&[1usize, 4, 2][..]));
    assert_eq!(tensor.squeezed_shape(1), None);

    let tensor = Tensor::new(vec![4, 2], vec![0.0; 8]).unwrap();
    assert_eq!(tensor.squeezed_shape(2), Some(&[4usize, 2][..]));
  }
}
