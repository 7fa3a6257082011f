// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 分割任务循环
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use image::RgbImage;
use tracing::{info, warn};

use crate::{model::Model, output::Render, session::FrameResult, session::SegmentSession};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 协作式停止标志，可在线程间共享
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
  pub fn stop(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  /// 收到 Ctrl-C 时置位停止标志；30 秒后仍未退出则强制结束进程
  pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
    let handle = self.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      handle.stop();
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
  }
}

pub struct OneShotTask {
  session: SegmentSession,
}

impl OneShotTask {
  pub fn new(session: SegmentSession) -> Self {
    Self { session }
  }
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model,
  O: Render<RgbImage, FrameResult, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(mut self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功 ({}x{})，开始分割...", frame.width(), frame.height());
    let now = Instant::now();
    let result = self.session.process(&frame, &model)?;
    info!(
      "分割完成，检测到 {} 个实例，耗时: {:.2?}",
      result.detections.len(),
      now.elapsed()
    );
    output.render_result(&frame, result)?;
    info!("渲染完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

pub struct ContinuousTask {
  session: SegmentSession,
  frame_number: Option<usize>,
  stop: StopHandle,
}

impl ContinuousTask {
  pub fn new(session: SegmentSession) -> Self {
    Self {
      session,
      frame_number: None,
      stop: StopHandle::default(),
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
    self.stop = stop;
    self
  }

  pub fn stop_handle(&self) -> StopHandle {
    self.stop.clone()
  }

  fn reached_frame_number(&self, frame_index: usize) -> bool {
    self.frame_number.is_some_and(|n| frame_index >= n)
  }
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbImage>,
  M: Model,
  O: Render<RgbImage, FrameResult, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(mut self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");

    let mut frame_index = 0usize;
    let mut failures = 0usize;
    loop {
      // 先检查停止标志，停止后不再拉取新帧
      if self.stop.is_stopped() {
        warn!("停止信号已收到，退出任务循环");
        break;
      }
      let Some(frame) = input.next() else {
        break;
      };

      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧图像", frame_index);
      let now = Instant::now();
      match self.session.process(&frame, &model) {
        Ok(result) => {
          let elapsed_a = now.elapsed();
          if self.stop.is_stopped() {
            warn!("停止信号已收到，丢弃第 {} 帧结果", frame_index);
            break;
          }

          output.render_result(&frame, result)?;
          let elapsed_b = now.elapsed();
          info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
        }
        Err(err) => {
          failures += 1;
          warn!("第 {} 帧分割失败: {}，继续下一帧", frame_index, err);
        }
      }

      // 失败的帧同样计入帧数
      if self.reached_frame_number(frame_index) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
    }

    info!("任务完成，共 {} 帧，失败 {} 帧", frame_index, failures);
    Ok(())
  }
}
