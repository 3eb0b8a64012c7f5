// 该文件是 Yuedong （悦动） 项目的一部分。
// src/window.rs - 时间窗口缓冲区
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

//! # 时间窗口缓冲区
//!
//! 带步长的时序卷积模型每 `S` 帧输出一步，每一步需要最近 `R` 帧的历史。
//! 本模块把任意长度的帧序列切成右边缘间隔 `S` 的长度为 `R` 的窗口。
//!
//! ## 预热
//!
//! 会话开始时用第一帧重复填充缺失的历史（边缘填充）。填充阶段落在步长边界上的
//! 窗口作为预热窗口交给模型，用来冲掉上一段视频残留在模型内部的状态，但不产生
//! 步输出；第一帧真实图像所在的窗口就是第 0 步。
//!
//! ## 位置
//!
//! 缓冲区按“位置”对齐步长，而不是按收到的帧数。位置由 [`FrameResampler`] 给出，
//! 丢帧时位置会跳跃，缓冲区据此重新计算步长对齐，而不会假设帧是连续的。

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::{config::WarmUpPolicy, frame::Frame};

mod resample;
pub use self::resample::{FrameResampler, uniform_sample_indices};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
  /// 预热窗口，只用于推进模型内部状态
  WarmUp,
  /// 第 n 步
  Step(u64),
}

/// 交给模型的一个时间窗口，帧按时间先后排列
#[derive(Debug)]
pub struct Window<I> {
  pub kind: WindowKind,
  pub frames: Vec<Frame<I>>,
  /// 窗口中合成（填充）帧的数量
  pub synthetic: usize,
}

impl<I> Clone for Window<I> {
  fn clone(&self) -> Self {
    Self {
      kind: self.kind,
      frames: self.frames.clone(),
      synthetic: self.synthetic,
    }
  }
}

impl<I> Window<I> {
  pub fn step_index(&self) -> Option<u64> {
    match self.kind {
      WindowKind::Step(step) => Some(step),
      WindowKind::WarmUp => None,
    }
  }

  pub fn is_warm_up(&self) -> bool {
    self.kind == WindowKind::WarmUp
  }

  /// 窗口右边缘的帧
  pub fn right_edge(&self) -> Option<&Frame<I>> {
    self.frames.last()
  }
}

struct Slot<I> {
  frame: Frame<I>,
  synthetic: bool,
}

impl<I> Clone for Slot<I> {
  fn clone(&self) -> Self {
    Self {
      frame: self.frame.clone(),
      synthetic: self.synthetic,
    }
  }
}

pub struct TemporalWindowBuffer<I> {
  context: usize,
  stride: usize,
  warm_up: WarmUpPolicy,
  ring: VecDeque<Slot<I>>,
  pending: VecDeque<Window<I>>,
  next_step_position: u64,
  last_position: Option<u64>,
  steps_emitted: u64,
}

impl<I> TemporalWindowBuffer<I> {
  pub fn new(context: usize, stride: usize, warm_up: WarmUpPolicy) -> Self {
    assert!(context > 0 && stride > 0, "时间上下文和步长必须为正整数");
    Self {
      context,
      stride,
      warm_up,
      ring: VecDeque::with_capacity(context),
      pending: VecDeque::new(),
      next_step_position: 0,
      last_position: None,
      steps_emitted: 0,
    }
  }

  pub fn context(&self) -> usize {
    self.context
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  /// 预热时产生的窗口数量，等于填充区内落在步长边界上的位置数
  pub fn warm_up_windows(&self) -> usize {
    match self.warm_up {
      WarmUpPolicy::EdgePad => self.context / self.stride,
      WarmUpPolicy::Disabled => 0,
    }
  }

  pub fn steps_emitted(&self) -> u64 {
    self.steps_emitted
  }

  /// 以帧索引作为位置压入一帧
  pub fn push(&mut self, frame: Frame<I>) {
    let position = frame.index;
    self.push_at(position, frame);
  }

  /// 在给定位置压入一帧，位置必须严格递增，可以不连续
  pub fn push_at(&mut self, position: u64, frame: Frame<I>) {
    if let Some(last) = self.last_position
      && position <= last
    {
      warn!("帧位置 {} 不大于上一位置 {}，已忽略", position, last);
      return;
    }

    if self.last_position.is_none() {
      self.start_session(position, &frame);
    } else if position > self.last_position.map_or(0, |p| p + 1) {
      debug!(
        "帧位置从 {:?} 跳到 {}，重新计算步长对齐",
        self.last_position, position
      );
    }
    self.last_position = Some(position);

    self.ring.push_back(Slot {
      frame,
      synthetic: false,
    });
    while self.ring.len() > self.context {
      self.ring.pop_front();
    }

    if self.ring.len() >= self.context && position >= self.next_step_position {
      let step = position / self.stride as u64;
      self.emit(WindowKind::Step(step));
      self.next_step_position = (step + 1) * self.stride as u64;
    }
  }

  fn start_session(&mut self, position: u64, first: &Frame<I>) {
    match self.warm_up {
      WarmUpPolicy::EdgePad => {
        for _ in 1..self.context {
          self.ring.push_back(Slot {
            frame: first.clone(),
            synthetic: true,
          });
        }
        let warm_up = Window {
          kind: WindowKind::WarmUp,
          frames: vec![first.clone(); self.context],
          synthetic: self.context,
        };
        for _ in 0..self.warm_up_windows() {
          self.pending.push_back(warm_up.clone());
        }
        self.next_step_position = position;
      }
      WarmUpPolicy::Disabled => {
        // 第一个窗口落在攒满上下文后的第一个步长边界上
        let stride = self.stride as u64;
        let filled = position + self.context as u64 - 1;
        self.next_step_position = filled.div_ceil(stride) * stride;
      }
    }
  }

  fn emit(&mut self, kind: WindowKind) {
    let synthetic = self.ring.iter().filter(|slot| slot.synthetic).count();
    let frames = self.ring.iter().map(|slot| slot.frame.clone()).collect();
    self.pending.push_back(Window {
      kind,
      frames,
      synthetic,
    });
    if let WindowKind::Step(_) = kind {
      self.steps_emitted += 1;
    }
  }

  /// 输入结束。若从未输出过任何一步，用最后一帧向右填充到 `R` 帧并输出最后一个窗口
  pub fn finish(&mut self) {
    if self.steps_emitted > 0 {
      return;
    }
    let Some(last) = self.ring.back().map(|slot| slot.frame.clone()) else {
      return;
    };

    while self.ring.len() < self.context {
      self.ring.push_back(Slot {
        frame: last.clone(),
        synthetic: true,
      });
    }
    let step = self.next_step_position / self.stride as u64;
    debug!("输入在攒满 {} 帧之前结束，填充后输出第 {} 步", self.context, step);
    self.emit(WindowKind::Step(step));
  }

  /// 取出已经就绪的窗口
  pub fn pop_ready_windows(&mut self) -> impl Iterator<Item = Window<I>> + '_ {
    self.pending.drain(..)
  }

  /// 开始新的会话
  pub fn reset(&mut self) {
    self.ring.clear();
    self.pending.clear();
    self.next_step_position = 0;
    self.last_position = None;
    self.steps_emitted = 0;
  }
}
