// 该文件是 Shanan （山南西风） 项目的一部分。
// src/color.rs - 类别调色板
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

use std::{
  collections::HashMap,
  sync::{LazyLock, Mutex},
};

use image::Rgba;

/// Ultralytics 默认调色板
const PALETTE: [[u8; 3]; 20] = [
  [0x04, 0x2A, 0xFF],
  [0x0B, 0xDB, 0xEB],
  [0xF3, 0xF3, 0xF3],
  [0x00, 0xDF, 0xB7],
  [0x11, 0x1F, 0x68],
  [0xFF, 0x6F, 0xDD],
  [0xFF, 0x44, 0x4F],
  [0xCC, 0xED, 0x00],
  [0x00, 0xF3, 0x44],
  [0xBD, 0x00, 0xFF],
  [0x00, 0xB4, 0xFF],
  [0xDD, 0x00, 0xBA],
  [0x00, 0xFF, 0xFF],
  [0x26, 0xC0, 0x00],
  [0x01, 0xFF, 0xB3],
  [0x7D, 0x24, 0xFF],
  [0x7B, 0x00, 0x68],
  [0xFF, 0x1B, 0x6C],
  [0xFC, 0x6D, 0x2F],
  [0xA2, 0xFF, 0x0B],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorOrder {
  #[default]
  Rgb,
  Bgr,
}

type CacheKey = (usize, u32, ColorOrder);

static COLOR_CACHE: LazyLock<Mutex<HashMap<CacheKey, Rgba<u8>>>> =
  LazyLock::new(|| Mutex::new(HashMap::new()));

fn alpha_to_u8(alpha: f32) -> u8 {
  (alpha.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn make_color(class_idx: usize, alpha: f32, order: ColorOrder) -> Rgba<u8> {
  let [r, g, b] = PALETTE[class_idx % PALETTE.len()];
  let a = alpha_to_u8(alpha);
  match order {
    ColorOrder::Rgb => Rgba([r, g, b, a]),
    ColorOrder::Bgr => Rgba([b, g, r, a]),
  }
}

/// 获取类别颜色，结果按 `(类别, 透明度, 通道顺序)` 缓存
pub fn class_color(class_idx: usize, alpha: f32, order: ColorOrder) -> Rgba<u8> {
  let key = (class_idx, alpha.to_bits(), order);
  match COLOR_CACHE.lock() {
    Ok(mut cache) => *cache
      .entry(key)
      .or_insert_with(|| make_color(class_idx, alpha, order)),
    // 调色板是静态的，缓存损坏时直接计算
    Err(_) => make_color(class_idx, alpha, order),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wraps_around_palette() {
    assert_eq!(class_color(0, 1.0, ColorOrder::Rgb), Rgba([0x04, 0x2A, 0xFF, 255]));
    assert_eq!(
      class_color(20, 1.0, ColorOrder::Rgb),
      class_color(0, 1.0, ColorOrder::Rgb)
    );
    assert_eq!(class_color(6, 0.5, ColorOrder::Rgb), Rgba([0xFF, 0x44, 0x4F, 128]));
  }

  #[test]
  fn bgr_order_swaps_channels() {
    assert_eq!(class_color(0, 0.0, ColorOrder::Bgr), Rgba([0xFF, 0x2A, 0x04, 0]));
  }

  #[test]
  fn repeated_lookup_is_stable() {
    let first = class_color(42, 0.15, ColorOrder::Rgb);
    let second = class_color(42, 0.15, ColorOrder::Rgb);
    assert_eq!(first, second);
    assert_eq!(first[3], 38);
  }
}
