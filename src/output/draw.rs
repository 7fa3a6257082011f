// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 分割结果覆盖层绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, RgbImage, Rgba, RgbaImage, imageops};
use imageproc::{
  drawing::{Blend, draw_filled_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  color::{ColorOrder, class_color},
  model::Detection,
};

/// 正常（或被选中）检测框的透明度
pub const BOX_ALPHA: f32 = 0.8;
/// 隔离模式下未选中检测框的透明度
pub const DIMMED_ALPHA: f32 = 0.15;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 无字体时每字符平均宽度（粗略估计）
const LABEL_PADDING: i32 = 4;
const LABEL_TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]); // 白色文本
const LINE_WIDTH_DIVISOR: f32 = 250.0;

const DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf"); // 内置标签字体 (DejaVu Sans)

fn default_font() -> Option<FontArc> {
  match FontArc::try_from_slice(DEFAULT_FONT) {
    Ok(font) => Some(font),
    Err(err) => {
      warn!("无法加载内置字体，标签将不绘制文本: {}", err);
      None
    }
  }
}

/// 以 alpha 混合方式绘制的覆盖层画布
type BlendCanvas = Blend<RgbaImage>;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 只包含掩码的覆盖层快照，用于在不重新推理的情况下重绘检测框
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSnapshot(RgbaImage);

impl MaskSnapshot {
  pub fn capture(overlay: &RgbaImage) -> Self {
    Self(overlay.clone())
  }

  pub fn image(&self) -> &RgbaImage {
    &self.0
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.0.dimensions()
  }

  /// 将快照内容写回覆盖层，撤销此前绘制的检测框和标签
  pub fn restore_into(&self, overlay: &mut RgbaImage) {
    if overlay.dimensions() == self.0.dimensions() {
      overlay.copy_from_slice(&self.0);
    } else {
      *overlay = self.0.clone();
    }
  }
}

/// 覆盖层线宽：对角线长度的 1/250
pub fn line_width(width: u32, height: u32) -> f32 {
  (width as f32).hypot(height as f32) / LINE_WIDTH_DIVISOR
}

/// 混合填充矩形，超出画布的部分被裁剪
fn blend_rect(canvas: &mut BlendCanvas, x: i32, y: i32, w: i32, h: i32, color: Rgba<u8>) {
  if w <= 0 || h <= 0 {
    return;
  }
  draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(w as u32, h as u32), color);
}

/// 描边矩形，线条以边界为中心，四条边互不重叠以免重复混合
fn stroke_rect(canvas: &mut BlendCanvas, bbox: &[f32; 4], line_width: f32, color: Rgba<u8>) {
  let half = line_width / 2.0;
  let t = line_width.round().max(1.0) as i32;

  let left = (bbox[0] - half).round() as i32;
  let top = (bbox[1] - half).round() as i32;
  let right = (bbox[0] + bbox[2] + half).round() as i32;
  let bottom = (bbox[1] + bbox[3] + half).round() as i32;

  let (w, h) = (right - left, bottom - top);
  if w <= 0 || h <= 0 {
    return;
  }
  if w <= 2 * t || h <= 2 * t {
    blend_rect(canvas, left, top, w, h, color);
    return;
  }

  blend_rect(canvas, left, top, w, t, color);
  blend_rect(canvas, left, bottom - t, w, t, color);
  blend_rect(canvas, left, top + t, t, h - 2 * t, color);
  blend_rect(canvas, right - t, top + t, t, h - 2 * t, color);
}

/// 覆盖层绘制器：检测框、标签，以及隔离模式重绘
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_char_width: f32,
  color_order: ColorOrder,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: default_font(),
      font_size: LABEL_FONT_SIZE,
      label_char_width: LABEL_CHAR_WIDTH,
      color_order: ColorOrder::default(),
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn with_color_order(mut self, order: ColorOrder) -> Self {
    self.color_order = order;
    self
  }

  /// 从字体文件加载标签字体
  pub fn with_font_file(self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontArc::try_from_vec(data)?;
    debug!("加载标签字体: {}", path.as_ref().display());
    Ok(self.with_font(font))
  }

  pub fn color_order(&self) -> ColorOrder {
    self.color_order
  }

  fn label_size(&self, text: &str) -> (i32, i32) {
    let height = self.font_size.round() as i32;
    let width = match &self.font {
      Some(font) => text_size(PxScale::from(self.font_size), font, text).0 as i32,
      None => (text.chars().count() as f32 * self.label_char_width) as i32,
    };
    (width, height)
  }

  /// 在检测框上方绘制标签；上方空间不足时绘制在框内顶部
  fn draw_label(&self, canvas: &mut BlendCanvas, detection: &Detection, color: Rgba<u8>) {
    let text = format!("{} {:.2}", detection.class_name(), detection.score);
    let (text_width, text_height) = self.label_size(&text);

    let x = detection.bbox[0].round() as i32;
    let y = detection.bbox[1].round() as i32;
    let mut rect_y = y - text_height - LABEL_PADDING;
    if rect_y < 0 {
      rect_y = y + 1;
    }

    blend_rect(
      canvas,
      x - 1,
      rect_y,
      text_width + LABEL_PADDING,
      text_height + LABEL_PADDING,
      color,
    );

    if let Some(font) = &self.font {
      draw_text_mut(
        &mut canvas.0,
        LABEL_TEXT_COLOR,
        x + 1,
        rect_y + LABEL_PADDING / 2,
        PxScale::from(self.font_size),
        font,
        &text,
      );
    }
  }

  /// 在已有内容（掩码）之上绘制检测框与标签，不清除覆盖层
  ///
  /// `selected` 为 `Some(i)` 时只有第 `i` 个检测以正常透明度绘制并带标签，
  /// 其余检测降低透明度且不绘制标签。
  pub fn draw_boxes(
    &self,
    overlay: &mut RgbaImage,
    detections: &[Detection],
    selected: Option<usize>,
  ) {
    if let Some(index) = selected
      && index >= detections.len()
    {
      warn!(
        "选中的检测下标 {} 超出范围 (共 {} 个)，全部以降低透明度绘制",
        index,
        detections.len()
      );
    }

    let line_width = line_width(overlay.width(), overlay.height());
    let mut canvas = Blend(std::mem::take(overlay));
    for (idx, detection) in detections.iter().enumerate() {
      let dimmed = selected.is_some_and(|s| s != idx);
      let alpha = if dimmed { DIMMED_ALPHA } else { BOX_ALPHA };
      let color = class_color(detection.class_idx, alpha, self.color_order);

      stroke_rect(&mut canvas, &detection.bbox, line_width, color);
      if !dimmed {
        self.draw_label(&mut canvas, detection, color);
      }
    }
    *overlay = canvas.0;
  }

  /// 由掩码快照重建覆盖层并重新绘制检测框，无需重新推理
  pub fn redraw_into(
    &self,
    overlay: &mut RgbaImage,
    snapshot: &MaskSnapshot,
    detections: &[Detection],
    selected: Option<usize>,
  ) {
    snapshot.restore_into(overlay);
    self.draw_boxes(overlay, detections, selected);
  }

  pub fn redraw(
    &self,
    snapshot: &MaskSnapshot,
    detections: &[Detection],
    selected: Option<usize>,
  ) -> RgbaImage {
    let mut overlay = snapshot.image().clone();
    self.draw_boxes(&mut overlay, detections, selected);
    overlay
  }
}

/// 将覆盖层混合到原图上
pub fn composite(source: &RgbImage, overlay: &RgbaImage) -> RgbImage {
  let mut base = DynamicImage::ImageRgb8(source.clone()).into_rgba8();
  imageops::overlay(&mut base, overlay, 0, 0);
  DynamicImage::ImageRgba8(base).into_rgb8()
}
