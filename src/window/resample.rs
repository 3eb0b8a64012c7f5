// 该文件是 Yuedong （悦动） 项目的一部分。
// src/window/resample.rs - 帧率重采样
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

use tracing::info;

// 浮点步长取整时的容差
const EPSILON: f64 = 1e-9;

/// 对已知长度的片段做均匀抽帧，返回被选中的帧下标
///
/// `ratio = model_fps / source_fps`，`ratio >= 1` 时不抽帧。
/// 选中的帧整体居中于片段。
pub fn uniform_sample_indices(depth: usize, ratio: f64) -> Vec<usize> {
  if depth == 0 {
    return Vec::new();
  }
  if ratio >= 1.0 {
    return (0..depth).collect();
  }

  let step = 1.0 / ratio;
  let mut targets = Vec::new();
  let mut k = 0u64;
  while (k as f64) * step < depth as f64 - EPSILON {
    targets.push(k as f64 * step);
    k += 1;
  }
  let last = targets.last().copied().unwrap_or(0.0);
  let offset = ((depth as f64 - last) / 2.0 + EPSILON).floor();

  targets
    .into_iter()
    .map(|t| ((t + offset + EPSILON).floor() as usize).min(depth - 1))
    .collect()
}

/// 实时流的均匀抽帧
///
/// 源帧率高于模型帧率时，第 k 个模型帧取源帧 `floor(k * step) + offset`，
/// `step = source_fps / model_fps`，`offset = floor(step / 2)`，与
/// [`uniform_sample_indices`] 在片段长度为步长整数倍时结果一致。
///
/// 目标帧被丢弃时取其后第一个到达的帧代替，并跳过已经错过的目标，
/// 返回的位置因此会跳跃，窗口缓冲区据此重新对齐步长。
#[derive(Debug, Clone)]
pub struct FrameResampler {
  step: Option<f64>,
  offset: u64,
  next_target: u64,
}

impl FrameResampler {
  pub fn new(source_fps: f64, model_fps: f64) -> Self {
    let ratio = model_fps / source_fps;
    if ratio < 1.0 {
      let step = source_fps / model_fps;
      let offset = (step / 2.0 + EPSILON).floor() as u64;
      info!(
        "源帧率 {:.2} 高于模型帧率 {:.2}，每 {:.2} 帧取一帧",
        source_fps, model_fps, step
      );
      Self {
        step: Some(step),
        offset,
        next_target: 0,
      }
    } else {
      Self {
        step: None,
        offset: 0,
        next_target: 0,
      }
    }
  }

  pub fn passthrough() -> Self {
    Self {
      step: None,
      offset: 0,
      next_target: 0,
    }
  }

  pub fn is_passthrough(&self) -> bool {
    self.step.is_none()
  }

  fn target(&self, step: f64, k: u64) -> u64 {
    (k as f64 * step + EPSILON).floor() as u64 + self.offset
  }

  /// 判断源帧是否被选中，选中时返回其在模型帧率下的位置
  pub fn accept(&mut self, index: u64) -> Option<u64> {
    let Some(step) = self.step else {
      return Some(index);
    };
    if index < self.target(step, self.next_target) {
      return None;
    }

    // 找到不超过 index 的最后一个目标
    let mut k = ((index - self.offset) as f64 / step).floor() as u64;
    while self.target(step, k + 1) <= index {
      k += 1;
    }
    while k > 0 && self.target(step, k) > index {
      k -= 1;
    }
    let k = k.max(self.next_target);
    self.next_target = k + 1;
    Some(k)
  }

  pub fn reset(&mut self) {
    self.next_target = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_60_to_20_fps_selects_one_in_three_centered() {
    assert_eq!(uniform_sample_indices(9, 20.0 / 60.0), vec![1, 4, 7]);
    assert_eq!(uniform_sample_indices(12, 20.0 / 60.0), vec![1, 4, 7, 10]);

    let mut resampler = FrameResampler::new(60.0, 20.0);
    let accepted: Vec<(u64, u64)> = (0..12)
      .filter_map(|i| resampler.accept(i).map(|p| (i, p)))
      .collect();
    assert_eq!(accepted, vec![(1, 0), (4, 1), (7, 2), (10, 3)]);
  }

  #[test]
  fn test_streaming_matches_batch_sampling() {
    for (source, model, depth) in [(30.0, 12.0, 20), (50.0, 16.0, 50), (32.0, 16.0, 16)] {
      let mut resampler = FrameResampler::new(source, model);
      let streaming: Vec<usize> = (0..depth as u64)
        .filter(|i| resampler.accept(*i).is_some())
        .map(|i| i as usize)
        .collect();
      assert_eq!(streaming, uniform_sample_indices(depth, model / source));
    }
  }

  #[test]
  fn test_slower_source_is_not_resampled() {
    assert_eq!(uniform_sample_indices(4, 16.0 / 12.0), vec![0, 1, 2, 3]);
    let mut resampler = FrameResampler::new(12.0, 16.0);
    assert!(resampler.is_passthrough());
    assert_eq!(resampler.accept(7), Some(7));
    assert!(uniform_sample_indices(0, 0.5).is_empty());
  }

  #[test]
  fn test_dropped_target_is_replaced_by_next_arrival() {
    let mut resampler = FrameResampler::new(60.0, 20.0);
    assert_eq!(resampler.accept(1), Some(0));
    // 4 和 7 都被丢弃
    assert_eq!(resampler.accept(8), Some(2));
    assert_eq!(resampler.accept(9), None);
    assert_eq!(resampler.accept(10), Some(3));
  }
}
