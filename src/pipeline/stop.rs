// 该文件是 Yuedong （悦动） 项目的一部分。
// src/pipeline/stop.rs - 停止信号
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

use std::sync::{
  Arc,
  atomic::{AtomicU8, Ordering},
};

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const ABORTED: u8 = 2;

/// 所有阶段共享的协作式停止信号，只能向更强的方向推进
///
/// - 有序停止：采集阶段不再读取新帧，已经入队的帧和步输出照常处理完；
/// - 强制停止：各阶段尽快退出，队列中尚未处理的帧计为放弃。
#[derive(Debug, Clone, Default)]
pub struct StopToken {
  state: Arc<AtomicU8>,
}

impl StopToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn request_stop(&self) {
    self.state.fetch_max(STOPPING, Ordering::SeqCst);
  }

  pub fn abort(&self) {
    self.state.fetch_max(ABORTED, Ordering::SeqCst);
  }

  pub fn is_running(&self) -> bool {
    self.state.load(Ordering::SeqCst) == RUNNING
  }

  /// 有序停止或强制停止
  pub fn is_stop_requested(&self) -> bool {
    self.state.load(Ordering::SeqCst) >= STOPPING
  }

  pub fn is_aborted(&self) -> bool {
    self.state.load(Ordering::SeqCst) == ABORTED
  }
}
