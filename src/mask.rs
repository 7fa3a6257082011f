// 该文件是 Shanan （山南西风） 项目的一部分。
// src/mask.rs - 实例掩码重建
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

use image::{GrayImage, Luma, RgbaImage};
use ndarray::{
  Array2, ArrayView1, ArrayView3,
  parallel::prelude::{IntoParallelIterator, ParallelIterator as _},
};
use tracing::debug;

use crate::{
  color::{ColorOrder, class_color},
  decoder::{DecodeError, PROTOTYPE_OUTPUT},
  geometry::GeometryContext,
  model::Detection,
};

/// 二值化阈值，sigmoid 输出严格大于该值视为前景
pub const MASK_THRESHOLD: f32 = 0.5;
/// 掩码着色透明度
pub const MASK_ALPHA: f32 = 0.5;

const MASK_ON: Luma<u8> = Luma([255]);
const MASK_OFF: Luma<u8> = Luma([0]);

pub fn sigmoid(v: f32) -> f32 {
  1.0 / (1.0 + (-v).exp())
}

/// 掩码在覆盖层上的有效区域（边界框裁剪到覆盖层范围内）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskRoi {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl MaskRoi {
  /// 边界框完全落在覆盖层之外或面积为零时返回 `None`
  pub fn from_bbox(bbox: &[f32; 4], width: u32, height: u32) -> Option<Self> {
    let x1 = bbox[0].max(0.0);
    let y1 = bbox[1].max(0.0);
    let x2 = (bbox[0] + bbox[2]).min(width as f32);
    let y2 = (bbox[1] + bbox[3]).min(height as f32);

    if !(x2 > x1 && y2 > y1) {
      return None;
    }

    let x = x1 as u32;
    let y = y1 as u32;
    let roi_width = ((x2 - x1) as u32).min(width - x);
    let roi_height = ((y2 - y1) as u32).min(height - y);

    (roi_width > 0 && roi_height > 0).then_some(MaskRoi {
      x,
      y,
      width: roi_width,
      height: roi_height,
    })
  }
}

/// 一个检测实例的二值掩码，仅覆盖其 ROI
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceMask {
  /// 对应检测结果在接受列表中的下标
  pub detection: usize,
  pub roi: MaskRoi,
  /// ROI 大小的掩码，255 为前景
  pub bitmap: GrayImage,
}

impl InstanceMask {
  /// 覆盖层坐标 `(x, y)` 是否属于该实例
  pub fn contains(&self, x: u32, y: u32) -> bool {
    x >= self.roi.x
      && y >= self.roi.y
      && self
        .bitmap
        .get_pixel_checked(x - self.roi.x, y - self.roi.y)
        .is_some_and(|p| p[0] > 0)
  }

  pub fn pixel_count(&self) -> usize {
    self.bitmap.pixels().filter(|p| p[0] > 0).count()
  }
}

/// 双线性采样坐标，像素中心对齐，越界时贴边
fn sample_coord(dst: u32, scale: f32, src_len: usize) -> (usize, usize, f32) {
  let f = (dst as f32 + 0.5) * scale - 0.5;
  let i0 = f.floor();
  if i0 < 0.0 {
    return (0, 0, 0.0);
  }
  let i0 = i0 as usize;
  if i0 + 1 >= src_len {
    return (src_len - 1, src_len - 1, 0.0);
  }
  (i0, i0 + 1, f - i0 as f32)
}

/// 原型掩码中对应图像内容（不含补边）的区域尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
struct ContentRegion {
  width: f32,
  height: f32,
}

impl ContentRegion {
  fn new(mask_height: usize, mask_width: usize, geometry: &GeometryContext) -> Self {
    let extent = |len: usize, fraction: f32| (len as f32 * fraction.clamp(0.0, 1.0)).max(1.0);
    Self {
      width: extent(mask_width, geometry.content_width),
      height: extent(mask_height, geometry.content_height),
    }
  }
}

/// 将一行 sigmoid 后的低分辨率掩码放大到覆盖层尺寸，只计算 ROI 内的像素并二值化
///
/// 只有原型掩码左上角的内容区域被映射到覆盖层，补边部分被裁掉。
fn binarize_roi(
  row: ArrayView1<'_, f32>,
  (mask_height, mask_width): (usize, usize),
  content: ContentRegion,
  (width, height): (u32, u32),
  roi: MaskRoi,
) -> GrayImage {
  let scale_x = content.width / width as f32;
  let scale_y = content.height / height as f32;
  let content_cols = (content.width.ceil() as usize).clamp(1, mask_width);
  let content_rows = (content.height.ceil() as usize).clamp(1, mask_height);

  let xs: Vec<_> = (roi.x..roi.x + roi.width)
    .map(|dx| sample_coord(dx, scale_x, content_cols))
    .collect();
  let ys: Vec<_> = (roi.y..roi.y + roi.height)
    .map(|dy| sample_coord(dy, scale_y, content_rows))
    .collect();

  GrayImage::from_fn(roi.width, roi.height, |rx, ry| {
    let (x0, x1, ax) = xs[rx as usize];
    let (y0, y1, ay) = ys[ry as usize];
    let p = |y: usize, x: usize| row[y * mask_width + x];

    let top = (1.0 - ax) * p(y0, x0) + ax * p(y0, x1);
    let bottom = (1.0 - ax) * p(y1, x0) + ax * p(y1, x1);
    let value = (1.0 - ay) * top + ay * bottom;

    if value > MASK_THRESHOLD { MASK_ON } else { MASK_OFF }
  })
}

/// 由原型掩码与掩码系数重建每个检测的二值掩码
///
/// 计算 `C × P`（`[检测数, 通道数] × [通道数, 掩码高*掩码宽]`），逐元素 sigmoid，
/// 然后逐检测将内容区域放大到 `width x height`、二值化并裁剪到边界框。
/// 边界框与覆盖层无交集的检测不产生掩码。
pub fn reconstruct_masks(
  detections: &[Detection],
  prototypes: ArrayView3<'_, f32>,
  geometry: &GeometryContext,
  width: u32,
  height: u32,
) -> Result<Vec<InstanceMask>, DecodeError> {
  if detections.is_empty() || width == 0 || height == 0 {
    return Ok(Vec::new());
  }

  let (channels, mask_height, mask_width) = prototypes.dim();
  let mismatch = |actual: Vec<usize>| DecodeError::ShapeMismatch {
    name: PROTOTYPE_OUTPUT,
    expected: format!("[{}, H>0, W>0]", channels),
    actual,
  };

  if mask_height == 0 || mask_width == 0 {
    return Err(mismatch(vec![channels, mask_height, mask_width]));
  }
  if let Some(det) = detections
    .iter()
    .find(|d| d.mask_coefficients.len() != channels)
  {
    return Err(mismatch(vec![det.mask_coefficients.len()]));
  }

  let coefficients = Array2::from_shape_fn((detections.len(), channels), |(i, c)| {
    detections[i].mask_coefficients[c]
  });
  let protos = prototypes
    .to_shape((channels, mask_height * mask_width))
    .map_err(|_| mismatch(vec![channels, mask_height, mask_width]))?;

  let mut raw = coefficients.dot(&protos);
  raw.mapv_inplace(sigmoid);
  debug!(
    "掩码矩阵: {:?}, 放大到 {}x{}",
    raw.dim(),
    width,
    height
  );

  let content = ContentRegion::new(mask_height, mask_width, geometry);
  let masks: Vec<Option<InstanceMask>> = (0..detections.len())
    .into_par_iter()
    .map(|i| {
      let roi = MaskRoi::from_bbox(&detections[i].bbox, width, height)?;
      let bitmap = binarize_roi(
        raw.row(i),
        (mask_height, mask_width),
        content,
        (width, height),
        roi,
      );
      Some(InstanceMask {
        detection: i,
        roi,
        bitmap,
      })
    })
    .collect();

  Ok(masks.into_iter().flatten().collect())
}

/// 按接受顺序将掩码着色绘制到覆盖层，后绘制的掩码覆盖先绘制的
pub fn paint_masks(
  overlay: &mut RgbaImage,
  detections: &[Detection],
  masks: &[InstanceMask],
  order: ColorOrder,
) {
  for mask in masks {
    let Some(det) = detections.get(mask.detection) else {
      continue;
    };
    let color = class_color(det.class_idx, MASK_ALPHA, order);

    for (rx, ry, pixel) in mask.bitmap.enumerate_pixels() {
      if pixel[0] == 0 {
        continue;
      }
      if let Some(target) = overlay.get_pixel_mut_checked(mask.roi.x + rx, mask.roi.y + ry) {
        *target = color;
      }
    }
  }
}
