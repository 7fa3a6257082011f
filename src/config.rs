// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 分割流水线配置
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

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.45;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.35;
pub const DEFAULT_STRIDE: u32 = 32;
pub const DEFAULT_NUM_CLASSES: usize = 80;
pub const DEFAULT_MASK_CHANNELS: usize = 32;

/// 预处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreprocessPolicy {
  /// 动态输入：按步长对齐后直接送入模型
  #[default]
  Dynamic,
  /// 固定输入：按步长对齐，补零成正方形，再缩放到模型输入尺寸
  FixedSquare { input_width: u32, input_height: u32 },
}

/// 重叠抑制策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionPolicy {
  /// 不区分类别，全局抑制
  #[default]
  Global,
  /// 仅在同类别之间抑制
  PerClass,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值超出范围 [0, 1]: {0}")]
  ScoreThreshold(f32),
  #[error("IoU 阈值超出范围 [0, 1]: {0}")]
  IouThreshold(f32),
  #[error("步长不能为 0")]
  ZeroStride,
  #[error("类别数量不能为 0")]
  ZeroClasses,
  #[error("掩码通道数不能为 0")]
  ZeroMaskChannels,
  #[error("固定输入尺寸不能为 0: {0}x{1}")]
  ZeroInput(u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
  /// 置信度阈值，最大类别分数必须严格大于该值
  pub score_threshold: f32,
  /// NMS IoU 阈值，大于该值的重叠框被抑制
  pub iou_threshold: f32,
  pub stride: u32,
  pub num_classes: usize,
  pub mask_channels: usize,
  pub preprocess: PreprocessPolicy,
  pub suppression: SuppressionPolicy,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      stride: DEFAULT_STRIDE,
      num_classes: DEFAULT_NUM_CLASSES,
      mask_channels: DEFAULT_MASK_CHANNELS,
      preprocess: PreprocessPolicy::default(),
      suppression: SuppressionPolicy::default(),
    }
  }
}

impl PipelineConfig {
  pub fn with_score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn with_stride(mut self, stride: u32) -> Self {
    self.stride = stride;
    self
  }

  pub fn with_num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn with_mask_channels(mut self, mask_channels: usize) -> Self {
    self.mask_channels = mask_channels;
    self
  }

  pub fn with_preprocess(mut self, preprocess: PreprocessPolicy) -> Self {
    self.preprocess = preprocess;
    self
  }

  pub fn with_suppression(mut self, suppression: SuppressionPolicy) -> Self {
    self.suppression = suppression;
    self
  }

  /// 预测张量中每个候选的属性数量：4 个框坐标 + 类别分数 + 掩码系数
  pub fn num_attributes(&self) -> usize {
    4 + self.num_classes + self.mask_channels
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.score_threshold) {
      return Err(ConfigError::ScoreThreshold(self.score_threshold));
    }
    if !(0.0..=1.0).contains(&self.iou_threshold) {
      return Err(ConfigError::IouThreshold(self.iou_threshold));
    }
    if self.stride == 0 {
      return Err(ConfigError::ZeroStride);
    }
    if self.num_classes == 0 {
      return Err(ConfigError::ZeroClasses);
    }
    if self.mask_channels == 0 {
      return Err(ConfigError::ZeroMaskChannels);
    }
    if let PreprocessPolicy::FixedSquare {
      input_width,
      input_height,
    } = self.preprocess
      && (input_width == 0 || input_height == 0)
    {
      return Err(ConfigError::ZeroInput(input_width, input_height));
    }
    Ok(())
  }
}
