// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{Datelike, Utc};
use image::RgbImage;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{
    Render,
    draw::{Draw, composite},
    overlay_for, selected_from_url,
  },
  session::FrameResult,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 检测记录：保存原图，旁边写一份 JSON 检测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn to_json(&self, result: &FrameResult) -> serde_json::Value {
    let detections: Vec<_> = result
      .detections
      .iter()
      .enumerate()
      .map(|(idx, det)| {
        let label = if self.label_with_name {
          json!(det.class_name())
        } else {
          json!(det.class_idx)
        };
        let mask_pixels = result
          .masks
          .iter()
          .find(|m| m.detection == idx)
          .map_or(0, |m| m.pixel_count());
        json!({
          "label": label,
          "score": det.score,
          "bbox": det.bbox,
          "mask_pixels": mask_pixels,
        })
      })
      .collect();

    json!({
      "inference_ms": result.inference_time.as_secs_f64() * 1000.0,
      "detections": detections,
    })
  }

  pub fn record(&self, result: &FrameResult, path: &Path) -> Result<(), DirectoryRecordOutputError> {
    let content = serde_json::to_string_pretty(&self.to_json(result))?;
    std::fs::write(path.with_extension("json"), content)?;
    Ok(())
  }
}

pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record(Record),
}

impl DrawWrapper {
  pub fn with(kind: &str) -> Self {
    match kind {
      "record-name" => DrawWrapper::Record(Record {
        label_with_name: true,
      }),
      "record-id" => DrawWrapper::Record(Record {
        label_with_name: false,
      }),
      _ => DrawWrapper::Draw(Box::default()),
    }
  }

  pub fn save_result(
    &self,
    path: &Path,
    frame: &RgbImage,
    result: &FrameResult,
    selected: Option<usize>,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        let overlay = overlay_for(draw, selected, result);
        composite(frame, &overlay).save(path)?;
      }
      DrawWrapper::Record(record) => {
        frame.save(path)?;
        record.record(result, path)?;
      }
    };

    Ok(())
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: AtomicU16,
  always: bool,
  selected: Option<usize>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = match uri.query_pairs().find(|(k, _)| k == "record") {
      Some((_, v)) if v == "id" => "record-id",
      Some(_) => "record-name",
      None => "draw",
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: DrawWrapper::with(kind),
      frame_counter: AtomicU16::new(0),
      always,
      selected: selected_from_url(uri),
    })
  }
}

impl DirectoryRecordOutput {
  /// 替换绘制器（例如加载了字体的绘制器），记录模式不受影响
  pub fn with_draw(mut self, draw: Draw) -> Self {
    if let DrawWrapper::Draw(_) = self.draw {
      self.draw = DrawWrapper::Draw(Box::new(draw));
    }
    self
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<RgbImage, FrameResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &FrameResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("本帧没有检测结果，跳过保存");
      return Ok(());
    }
    let path = self.frame_path()?;
    self.draw.save_result(&path, frame, result, self.selected)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Detection;

  fn result() -> FrameResult {
    let mut result = FrameResult::empty(8, 8);
    result.detections.push(Detection {
      bbox: [1.0, 2.0, 3.0, 4.0],
      class_idx: 16,
      score: 0.75,
      mask_coefficients: Box::new([]),
    });
    result
  }

  #[test]
  fn record_uses_name_or_id() {
    let by_name = Record {
      label_with_name: true,
    }
    .to_json(&result());
    assert_eq!(by_name["detections"][0]["label"], "dog");
    assert_eq!(by_name["detections"][0]["mask_pixels"], 0);

    let by_id = Record {
      label_with_name: false,
    }
    .to_json(&result());
    assert_eq!(by_id["detections"][0]["label"], 16);
  }

  #[test]
  fn parses_record_kind() {
    let url = url::Url::parse("folder:///tmp/records?record=id&always").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(output.always);
    assert!(matches!(
      output.draw,
      DrawWrapper::Record(Record {
        label_with_name: false
      })
    ));

    let url = url::Url::parse("folder:///tmp/records?select=0").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(matches!(output.draw, DrawWrapper::Draw(_)));
    assert_eq!(output.selected, Some(0));
  }

  #[test]
  fn frame_ids_increase() {
    let url = url::Url::parse("folder:///tmp/records").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.frame_id(), 1);
    assert_eq!(output.frame_id(), 2);
  }
}
