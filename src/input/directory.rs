// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/directory.rs - 目录图像序列输入
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
  collections::VecDeque,
  path::{Path, PathBuf},
};

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("目录中没有图像文件: {0}")]
  Empty(String),
}

/// 按文件名顺序逐帧读取目录中的图像，无法解码的文件被跳过
pub struct DirectoryInput {
  files: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

fn is_image_file(path: &Path) -> bool {
  path.is_file() && ImageFormat::from_path(path).is_ok()
}

impl DirectoryInput {
  pub fn open(directory: impl AsRef<Path>) -> Result<Self, DirectoryInputError> {
    let directory = directory.as_ref();
    let mut files = std::fs::read_dir(directory)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| is_image_file(path))
      .collect::<Vec<_>>();

    if files.is_empty() {
      return Err(DirectoryInputError::Empty(directory.display().to_string()));
    }
    files.sort();
    info!("目录 {} 中共有 {} 张图像", directory.display(), files.len());

    Ok(DirectoryInput {
      files: files.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.files.len()
  }
}

impl Iterator for DirectoryInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.files.pop_front() {
      match image::open(&path) {
        Ok(image) => return Some(image.into_rgb8()),
        Err(err) => warn!("跳过无法读取的图像 {}: {}", path.display(), err),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn reads_images_in_name_order() {
    let directory = std::env::temp_dir().join("shanan-seg-directory-input-test");
    let _ = std::fs::remove_dir_all(&directory);
    std::fs::create_dir_all(&directory).unwrap();

    RgbImage::from_pixel(2, 2, Rgb([2, 2, 2]))
      .save(directory.join("b.png"))
      .unwrap();
    RgbImage::from_pixel(1, 1, Rgb([1, 1, 1]))
      .save(directory.join("a.png"))
      .unwrap();
    std::fs::write(directory.join("broken.png"), b"not an image").unwrap();
    std::fs::write(directory.join("notes.txt"), b"skip").unwrap();

    let input = DirectoryInput::open(&directory).unwrap();
    assert_eq!(input.remaining(), 3);
    let sizes: Vec<_> = input.map(|i| i.dimensions()).collect();
    assert_eq!(sizes, vec![(1, 1), (2, 2)]);

    let _ = std::fs::remove_dir_all(&directory);
  }

  #[test]
  fn empty_directory_is_error() {
    let directory = std::env::temp_dir().join("shanan-seg-directory-input-empty");
    let _ = std::fs::remove_dir_all(&directory);
    std::fs::create_dir_all(&directory).unwrap();
    assert!(matches!(
      DirectoryInput::open(&directory),
      Err(DirectoryInputError::Empty(_))
    ));
    let _ = std::fs::remove_dir_all(&directory);
  }
}
