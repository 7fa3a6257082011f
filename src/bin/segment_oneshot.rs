// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/segment_oneshot.rs - 单张图像实例分割
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_seg::{
  FromUrl,
  args::PipelineArgs,
  input::ImageFileInput,
  model::{OnnxModelBuilder, warm_up},
  output::SaveImageFileOutput,
  session::SegmentSession,
  task::{OneShotTask, Task},
};
use tracing::info;

/// 单张图像分割
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径，如 onnx:///path/to/yolo-seg.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，如 image:///path/to/input.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出图像，如 image:///path/to/output.png?select=0
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let session = SegmentSession::new(args.pipeline.build_pipeline()?, args.pipeline.build_draw()?);
  let input = ImageFileInput::from_url(&args.input)?;
  let model = OnnxModelBuilder::from_url(&args.model)?.build()?;
  let output = SaveImageFileOutput::from_url(&args.output)?.with_draw(session.draw().clone());

  let (width, height) = args.pipeline.warm_up_size();
  warm_up(&model, width, height)?;

  OneShotTask::new(session).run_task(input, model, output)?;

  Ok(())
}
