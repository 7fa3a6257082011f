// 该文件是 Shanan （山南西风） 项目的一部分。
// src/geometry.rs - 步长对齐与坐标映射
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

use image::{RgbImage, imageops};
use thiserror::Error;
use tracing::debug;

use crate::{config::PreprocessPolicy, frame::NchwTensor};

#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
  #[error("图像尺寸 {width}x{height} 按步长 {stride} 对齐后为空")]
  Degenerate { width: u32, height: u32, stride: u32 },
}

/// 模型输入坐标到原图坐标的缩放比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryContext {
  pub x_ratio: f32,
  pub y_ratio: f32,
  /// 图像内容在模型输入中所占的宽度比例，其余为补边
  pub content_width: f32,
  /// 图像内容在模型输入中所占的高度比例
  pub content_height: f32,
}

impl GeometryContext {
  pub fn identity() -> Self {
    Self {
      x_ratio: 1.0,
      y_ratio: 1.0,
      content_width: 1.0,
      content_height: 1.0,
    }
  }
}

/// 预处理结果：送入推理引擎的张量，以及解码时使用的坐标比例
#[derive(Debug, Clone)]
pub struct Preprocessed {
  pub tensor: NchwTensor,
  pub geometry: GeometryContext,
}

fn align_dim(stride: u32, dim: u32) -> u32 {
  if stride == 0 {
    return dim;
  }
  let rem = dim % stride;
  let base = dim - rem;
  // 四舍五入到最近的倍数，余数恰好为一半时向上
  if 2 * (rem as u64) >= stride as u64 {
    base + stride
  } else {
    base
  }
}

/// 计算能被步长整除的最近尺寸，返回 `(对齐宽, 对齐高)`
pub fn align_to_stride(stride: u32, width: u32, height: u32) -> (u32, u32) {
  (align_dim(stride, width), align_dim(stride, height))
}

/// 图像预处理：缩放（和补边）后转换为 NCHW 张量，同时给出坐标映射比例
pub fn preprocess(
  image: &RgbImage,
  stride: u32,
  policy: PreprocessPolicy,
) -> Result<Preprocessed, GeometryError> {
  let (width, height) = image.dimensions();
  let (aligned_width, aligned_height) = align_to_stride(stride, width, height);
  if aligned_width == 0 || aligned_height == 0 {
    return Err(GeometryError::Degenerate {
      width,
      height,
      stride,
    });
  }

  let resized = if (aligned_width, aligned_height) == (width, height) {
    image.clone()
  } else {
    imageops::resize(
      image,
      aligned_width,
      aligned_height,
      imageops::FilterType::Triangle,
    )
  };

  let x_scale = width as f32 / aligned_width as f32;
  let y_scale = height as f32 / aligned_height as f32;

  match policy {
    PreprocessPolicy::Dynamic => {
      debug!(
        "动态输入: {}x{} -> {}x{}",
        width, height, aligned_width, aligned_height
      );
      Ok(Preprocessed {
        tensor: NchwTensor::from(&resized),
        geometry: GeometryContext {
          x_ratio: x_scale,
          y_ratio: y_scale,
          content_width: 1.0,
          content_height: 1.0,
        },
      })
    }
    PreprocessPolicy::FixedSquare {
      input_width,
      input_height,
    } => {
      let square = aligned_width.max(aligned_height);
      let mut padded = RgbImage::new(square, square);
      imageops::replace(&mut padded, &resized, 0, 0);

      let input = if (input_width, input_height) == (square, square) {
        padded
      } else {
        imageops::resize(
          &padded,
          input_width,
          input_height,
          imageops::FilterType::Triangle,
        )
      };

      debug!(
        "固定输入: {}x{} -> {}x{} -> 补边 {}x{} -> {}x{}",
        width, height, aligned_width, aligned_height, square, square, input_width, input_height
      );

      // 比例相对补边后的正方形计算，再折算回原图
      Ok(Preprocessed {
        tensor: NchwTensor::from(&input),
        geometry: GeometryContext {
          x_ratio: square as f32 / input_width as f32 * x_scale,
          y_ratio: square as f32 / input_height as f32 * y_scale,
          content_width: aligned_width as f32 / square as f32,
          content_height: aligned_height as f32 / square as f32,
        },
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rounds_to_nearest_multiple() {
    assert_eq!(align_to_stride(32, 640, 480), (640, 480));
    assert_eq!(align_to_stride(32, 500, 375), (512, 384));
    assert_eq!(align_to_stride(32, 15, 16), (0, 32));
    assert_eq!(align_to_stride(32, 47, 48), (32, 64));
    assert_eq!(align_to_stride(32, 0, 0), (0, 0));
  }

  #[test]
  fn aligned_dims_divisible_by_stride() {
    for stride in [8u32, 16, 32, 33] {
      for dim in (0u32..2000).step_by(7) {
        let (w, h) = align_to_stride(stride, dim, dim + 3);
        assert_eq!(w % stride, 0);
        assert_eq!(h % stride, 0);
      }
    }
  }

  #[test]
  fn dynamic_ratios() {
    let image = RgbImage::new(500, 375);
    let pre = preprocess(&image, 32, PreprocessPolicy::Dynamic).unwrap();
    assert_eq!(pre.tensor.shape(), [1, 3, 384, 512]);
    assert!((pre.geometry.x_ratio - 500.0 / 512.0).abs() < 1e-6);
    assert!((pre.geometry.y_ratio - 375.0 / 384.0).abs() < 1e-6);
  }

  #[test]
  fn fixed_square_ratios_use_padded_square() {
    let image = RgbImage::new(640, 480);
    let policy = PreprocessPolicy::FixedSquare {
      input_width: 320,
      input_height: 320,
    };
    let pre = preprocess(&image, 32, policy).unwrap();
    assert_eq!(pre.tensor.shape(), [1, 3, 320, 320]);
    // 640x480 已对齐，补边为 640x640，缩放到 320
    assert!((pre.geometry.x_ratio - 2.0).abs() < 1e-6);
    assert!((pre.geometry.y_ratio - 2.0).abs() < 1e-6);
    assert_eq!(pre.geometry.content_width, 1.0);
    assert_eq!(pre.geometry.content_height, 0.75);
  }

  #[test]
  fn dynamic_input_has_no_padding() {
    let image = RgbImage::new(64, 32);
    let pre = preprocess(&image, 32, PreprocessPolicy::Dynamic).unwrap();
    assert_eq!(pre.geometry.content_width, 1.0);
    assert_eq!(pre.geometry.content_height, 1.0);
  }

  #[test]
  fn tiny_image_is_degenerate() {
    let image = RgbImage::new(10, 100);
    let err = preprocess(&image, 32, PreprocessPolicy::Dynamic).unwrap_err();
    assert_eq!(
      err,
      GeometryError::Degenerate {
        width: 10,
        height: 100,
        stride: 32
      }
    );
  }
}
