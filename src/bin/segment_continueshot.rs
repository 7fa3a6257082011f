// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/segment_continueshot.rs - 连续帧实例分割
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
  input::InputWrapper,
  model::{OnnxModelBuilder, warm_up},
  output::OutputWrapper,
  session::SegmentSession,
  task::{ContinuousTask, StopHandle, Task},
};
use tracing::info;

/// 连续帧分割，Ctrl-C 停止
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源（image:// 或 folder://）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径（image:// 或 folder://，可带 ?record、?always、?select=N）
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

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
  let input = InputWrapper::from_url(&args.input)?;
  let model = OnnxModelBuilder::from_url(&args.model)?.build()?;
  let output = OutputWrapper::from_url(&args.output)?.with_draw(session.draw().clone());

  let (width, height) = args.pipeline.warm_up_size();
  warm_up(&model, width, height)?;

  let stop = StopHandle::default();
  stop.install_ctrlc_handler()?;

  ContinuousTask::new(session)
    .with_frame_number(args.frame_number)
    .with_stop_handle(stop)
    .run_task(input, model, output)?;

  Ok(())
}
