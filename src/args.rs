// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 分割流水线命令行参数
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Args;

use crate::{
  color::ColorOrder,
  config::{
    DEFAULT_IOU_THRESHOLD, DEFAULT_MASK_CHANNELS, DEFAULT_NUM_CLASSES, DEFAULT_SCORE_THRESHOLD,
    DEFAULT_STRIDE, PipelineConfig, PreprocessPolicy, SuppressionPolicy,
  },
  output::draw::{Draw, DrawError},
  pipeline::{PipelineError, SegmentPipeline},
};

/// 动态输入模型的预热尺寸
pub const DEFAULT_WARM_UP_SIZE: (u32, u32) = (640, 640);

/// 解析 `640` 或 `640x480` 形式的输入尺寸
pub fn parse_input_size(value: &str) -> Result<(u32, u32), String> {
  let parse = |s: &str| {
    s.trim()
      .parse::<u32>()
      .map_err(|e| format!("无效的尺寸 '{}': {}", value, e))
  };
  match value.split_once(['x', 'X']) {
    Some((w, h)) => Ok((parse(w)?, parse(h)?)),
    None => {
      let size = parse(value)?;
      Ok((size, size))
    }
  }
}

/// 分割流水线参数
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 置信度阈值 (0.0 - 1.0)，最大类别分数必须严格大于该值
  #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub score_threshold: f32,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou_threshold: f32,

  /// 输入尺寸对齐步长
  #[arg(long, default_value_t = DEFAULT_STRIDE, value_name = "STRIDE")]
  pub stride: u32,

  #[arg(long, default_value_t = DEFAULT_NUM_CLASSES, value_name = "COUNT")]
  pub num_classes: usize,

  #[arg(long, default_value_t = DEFAULT_MASK_CHANNELS, value_name = "COUNT")]
  pub mask_channels: usize,

  /// 固定输入尺寸的模型（如 `640` 或 `640x640`），不指定则为动态输入
  #[arg(long, value_name = "SIZE", value_parser = parse_input_size)]
  pub fixed_input: Option<(u32, u32)>,

  /// 仅在同类别之间执行 NMS
  #[arg(long)]
  pub per_class_nms: bool,

  /// 以 BGR 通道顺序取调色板颜色
  #[arg(long)]
  pub bgr: bool,

  /// 标签字体文件（TTF/OTF），不指定则使用内置字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
}

impl PipelineArgs {
  pub fn to_config(&self) -> PipelineConfig {
    let preprocess = match self.fixed_input {
      Some((input_width, input_height)) => PreprocessPolicy::FixedSquare {
        input_width,
        input_height,
      },
      None => PreprocessPolicy::Dynamic,
    };
    let suppression = if self.per_class_nms {
      SuppressionPolicy::PerClass
    } else {
      SuppressionPolicy::Global
    };

    PipelineConfig::default()
      .with_score_threshold(self.score_threshold)
      .with_iou_threshold(self.iou_threshold)
      .with_stride(self.stride)
      .with_num_classes(self.num_classes)
      .with_mask_channels(self.mask_channels)
      .with_preprocess(preprocess)
      .with_suppression(suppression)
  }

  pub fn color_order(&self) -> ColorOrder {
    if self.bgr { ColorOrder::Bgr } else { ColorOrder::Rgb }
  }

  pub fn build_pipeline(&self) -> Result<SegmentPipeline, PipelineError> {
    Ok(SegmentPipeline::new(self.to_config())?.with_color_order(self.color_order()))
  }

  pub fn build_draw(&self) -> Result<Draw, DrawError> {
    let draw = Draw::default().with_color_order(self.color_order());
    match &self.font {
      Some(path) => draw.with_font_file(path),
      None => Ok(draw),
    }
  }

  /// 预热使用的输入尺寸
  pub fn warm_up_size(&self) -> (u32, u32) {
    self.fixed_input.unwrap_or(DEFAULT_WARM_UP_SIZE)
  }
}
