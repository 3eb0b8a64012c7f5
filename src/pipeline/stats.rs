// 该文件是 Yuedong （悦动） 项目的一部分。
// src/pipeline/stats.rs - 流水线统计
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
  sync::atomic::{AtomicU64, Ordering},
  time::{Duration, Instant},
};

use serde::Serialize;

/// 各阶段共享的计数器
#[derive(Debug, Default)]
pub struct PipelineStats {
  /// 从输入源读到的帧
  pub(crate) captured: AtomicU64,
  /// 帧率重采样时跳过的帧
  pub(crate) resampled_out: AtomicU64,
  /// 进入帧队列的帧
  pub(crate) enqueued: AtomicU64,
  /// 丢旧帧策略丢弃的帧
  pub(crate) dropped: AtomicU64,
  /// 交给窗口缓冲区的帧
  pub(crate) processed: AtomicU64,
  /// 强制停止时仍在队列中或无法入队的帧
  pub(crate) abandoned: AtomicU64,
  pub(crate) warm_up_windows: AtomicU64,
  pub(crate) steps: AtomicU64,
  /// 强制停止时未能输出的步
  pub(crate) steps_abandoned: AtomicU64,
  pub(crate) records: AtomicU64,
}

impl PipelineStats {
  pub(crate) fn add(counter: &AtomicU64, n: u64) -> u64 {
    counter.fetch_add(n, Ordering::Relaxed) + n
  }

  pub(crate) fn inc(counter: &AtomicU64) -> u64 {
    Self::add(counter, 1)
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    let load = |counter: &AtomicU64| counter.load(Ordering::SeqCst);
    StatsSnapshot {
      captured: load(&self.captured),
      resampled_out: load(&self.resampled_out),
      enqueued: load(&self.enqueued),
      dropped: load(&self.dropped),
      processed: load(&self.processed),
      abandoned: load(&self.abandoned),
      warm_up_windows: load(&self.warm_up_windows),
      steps: load(&self.steps),
      steps_abandoned: load(&self.steps_abandoned),
      records: load(&self.records),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
  pub captured: u64,
  pub resampled_out: u64,
  pub enqueued: u64,
  pub dropped: u64,
  pub processed: u64,
  pub abandoned: u64,
  pub warm_up_windows: u64,
  pub steps: u64,
  pub steps_abandoned: u64,
  pub records: u64,
}

impl StatsSnapshot {
  /// 每一帧都有且只有一个去向
  pub fn is_balanced(&self) -> bool {
    self.captured == self.resampled_out + self.enqueued
      && self.enqueued == self.processed + self.dropped + self.abandoned
  }
}

/// 推理阶段最近一次有进展的时间
#[derive(Debug)]
pub(crate) struct Progress {
  origin: Instant,
  last_micros: AtomicU64,
}

impl Progress {
  pub(crate) fn new() -> Self {
    Self {
      origin: Instant::now(),
      last_micros: AtomicU64::new(0),
    }
  }

  pub(crate) fn touch(&self) {
    let now = self.origin.elapsed().as_micros() as u64;
    self.last_micros.fetch_max(now, Ordering::Relaxed);
  }

  pub(crate) fn idle(&self) -> Duration {
    let last = Duration::from_micros(self.last_micros.load(Ordering::Relaxed));
    self.origin.elapsed().saturating_sub(last)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_snapshot_balance() {
    let stats = PipelineStats::default();
    PipelineStats::add(&stats.captured, 10);
    PipelineStats::add(&stats.resampled_out, 2);
    PipelineStats::add(&stats.enqueued, 8);
    PipelineStats::add(&stats.processed, 5);
    PipelineStats::add(&stats.dropped, 2);
    assert!(!stats.snapshot().is_balanced());

    assert_eq!(PipelineStats::inc(&stats.abandoned), 1);
    assert!(stats.snapshot().is_balanced());
  }

  #[test]
  fn test_progress_idle_resets_on_touch() {
    let progress = Progress::new();
    std::thread::sleep(Duration::from_millis(20));
    assert!(progress.idle() >= Duration::from_millis(20));
    progress.touch();
    assert!(progress.idle() < Duration::from_millis(20));
  }
}
