// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - NCHW 模型输入帧定义
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

use image::RgbImage;

const RGB_CHANNELS: usize = 3;
const PIXEL_SCALE: f32 = 1.0 / 255.0;

/// 模型输入张量，形状为 `[1, 3, H, W]`，RGB 顺序，像素值缩放到 `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor {
  width: u32,
  height: u32,
  data: Box<[f32]>,
}

impl NchwTensor {
  /// 全零输入，用于模型预热
  pub fn zeros(width: u32, height: u32) -> Self {
    let size = RGB_CHANNELS * (width as usize) * (height as usize);
    Self {
      width,
      height,
      data: vec![0.0f32; size].into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height as usize, self.width as usize]
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }
}

impl From<&RgbImage> for NchwTensor {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let mut frame = NchwTensor::zeros(width, height);
    let plane_size = (width as usize) * (height as usize);

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = (y as usize) * (width as usize) + (x as usize);
      for c in 0..RGB_CHANNELS {
        frame.data[c * plane_size + idx] = f32::from(pixel[c]) * PIXEL_SCALE;
      }
    }

    frame
  }
}
