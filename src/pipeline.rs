// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 实例分割后处理流水线
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

use std::time::{Duration, Instant};

use image::{RgbImage, RgbaImage};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  color::ColorOrder,
  config::{ConfigError, PipelineConfig},
  decoder::{
    DecodeError, PREDICTION_OUTPUT, PROTOTYPE_OUTPUT, decode_candidates, prediction_view,
    prototype_view,
  },
  geometry::{GeometryContext, GeometryError, Preprocessed, preprocess},
  mask::{InstanceMask, paint_masks, reconstruct_masks},
  model::{Detection, Model},
  nms::non_max_suppression,
  tensor::ModelOutputs,
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("预处理错误: {0}")]
  Geometry(#[from] GeometryError),
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("推理引擎错误: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PipelineError {
  pub fn engine(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    PipelineError::Engine(Box::new(err))
  }
}

/// 一帧的分割结果：经过 NMS 的检测（按分数降序）、对应的二值掩码，以及只含掩码的覆盖层
#[derive(Debug, Clone)]
pub struct Segmentation {
  pub detections: Vec<Detection>,
  pub masks: Vec<InstanceMask>,
  pub mask_layer: RgbaImage,
  pub inference_time: Duration,
}

impl Segmentation {
  /// 指定尺寸的空结果，覆盖层全透明
  pub fn empty(width: u32, height: u32) -> Self {
    Self {
      detections: Vec::new(),
      masks: Vec::new(),
      mask_layer: RgbaImage::new(width, height),
      inference_time: Duration::ZERO,
    }
  }
}

#[derive(Debug, Clone)]
pub struct SegmentPipeline {
  config: PipelineConfig,
  color_order: ColorOrder,
}

impl SegmentPipeline {
  pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
    config.validate()?;
    Ok(Self {
      config,
      color_order: ColorOrder::default(),
    })
  }

  pub fn with_color_order(mut self, order: ColorOrder) -> Self {
    self.color_order = order;
    self
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn color_order(&self) -> ColorOrder {
    self.color_order
  }

  pub fn preprocess(&self, image: &RgbImage) -> Result<Preprocessed, PipelineError> {
    Ok(preprocess(
      image,
      self.config.stride,
      self.config.preprocess,
    )?)
  }

  /// 由模型输出得到检测与掩码覆盖层，`width x height` 为原图尺寸
  pub fn postprocess(
    &self,
    outputs: &ModelOutputs,
    geometry: &GeometryContext,
    width: u32,
    height: u32,
  ) -> Result<Segmentation, PipelineError> {
    let predictions = outputs
      .predictions
      .as_ref()
      .ok_or(DecodeError::MissingOutput(PREDICTION_OUTPUT))?;
    let prototypes = outputs
      .prototypes
      .as_ref()
      .ok_or(DecodeError::MissingOutput(PROTOTYPE_OUTPUT))?;

    let predictions = prediction_view(predictions, &self.config)?;
    let prototypes = prototype_view(prototypes, &self.config)?;

    let candidates = decode_candidates(predictions, geometry, &self.config);
    let keep = non_max_suppression(
      &candidates,
      self.config.iou_threshold,
      self.config.suppression,
    );

    let mut slots: Vec<Option<Detection>> = candidates.into_iter().map(Some).collect();
    let detections: Vec<Detection> = keep.iter().filter_map(|&i| slots[i].take()).collect();

    let masks = reconstruct_masks(&detections, prototypes, geometry, width, height)?;
    let mut mask_layer = RgbaImage::new(width, height);
    paint_masks(&mut mask_layer, &detections, &masks, self.color_order);

    debug!("检测 {} 个实例, 掩码 {} 个", detections.len(), masks.len());

    Ok(Segmentation {
      detections,
      masks,
      mask_layer,
      inference_time: Duration::ZERO,
    })
  }

  /// 预处理、推理、后处理一帧图像
  pub fn run<M: Model>(&self, image: &RgbImage, model: &M) -> Result<Segmentation, PipelineError> {
    let Preprocessed { tensor, geometry } = self.preprocess(image)?;

    let now = Instant::now();
    let outputs = model.infer(&tensor).map_err(PipelineError::engine)?;
    let inference_time = now.elapsed();
    info!("推理完成，耗时: {:.2?}", inference_time);

    let (width, height) = image.dimensions();
    let mut segmentation = self.postprocess(&outputs, &geometry, width, height)?;
    segmentation.inference_time = inference_time;
    Ok(segmentation)
  }
}
