// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Mutex;

use ort::{session::Session, value::Tensor as OrtTensor};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::NchwTensor,
  model::Model,
  tensor::{ModelOutputs, Tensor, TensorError},
};

const ONNX_INPUT_NAME: &str = "images";
const ONNX_PREDICTION_OUTPUT: &str = "output0";
const ONNX_PROTOTYPE_OUTPUT: &str = "output1";

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(String),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorError),
  #[error("推理会话锁已损坏")]
  SessionPoisoned,
}

impl OnnxModelError {
  fn ort(err: impl std::fmt::Display) -> Self {
    OnnxModelError::OrtError(err.to_string())
  }
}

pub struct OnnxModelBuilder {
  model_path: String,
}

impl FromUrlWithScheme for OnnxModelBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxModelBuilder {
  type Error = OnnxModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(OnnxModelBuilder {
      model_path: url.path().to_string(),
    })
  }
}

impl OnnxModelBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
    }
  }

  pub fn build(self) -> Result<OnnxModel, OnnxModelError> {
    info!("加载模型文件: {}", self.model_path);
    let session = Session::builder()
      .map_err(OnnxModelError::ort)?
      .commit_from_file(&self.model_path)
      .map_err(OnnxModelError::ort)?;

    for input in session.inputs.iter() {
      debug!("模型输入: {}", input.name);
    }
    for output in session.outputs.iter() {
      debug!("模型输出: {}", output.name);
    }
    info!("模型加载完成");

    Ok(OnnxModel {
      session: Mutex::new(session),
    })
  }
}

/// ONNX Runtime 会话，推理调用在内部串行执行
pub struct OnnxModel {
  session: Mutex<Session>,
}

fn extract_output(
  outputs: &ort::session::SessionOutputs<'_>,
  name: &str,
) -> Result<Option<Tensor>, OnnxModelError> {
  let Some(value) = outputs.get(name) else {
    error!("模型缺少输出: {}", name);
    return Ok(None);
  };

  let (shape, data) = value
    .try_extract_tensor::<f32>()
    .map_err(OnnxModelError::ort)?;
  let shape = shape.iter().map(|&d| d.max(0) as usize).collect();
  Ok(Some(Tensor::new(shape, data.to_vec())?))
}

impl Model for OnnxModel {
  type Error = OnnxModelError;

  fn infer(&self, input: &NchwTensor) -> Result<ModelOutputs, Self::Error> {
    debug!("设置模型输入: {:?}", input.shape());
    let tensor = OrtTensor::from_array((input.shape(), input.as_nchw().to_vec()))
      .map_err(OnnxModelError::ort)?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| OnnxModelError::SessionPoisoned)?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![ONNX_INPUT_NAME => tensor])
      .map_err(OnnxModelError::ort)?;

    Ok(ModelOutputs {
      predictions: extract_output(&outputs, ONNX_PREDICTION_OUTPUT)?,
      prototypes: extract_output(&outputs, ONNX_PROTOTYPE_OUTPUT)?,
    })
  }
}
