// 该文件是 Yuedong （悦动） 项目的一部分。
// src/input/iter_source.rs - 迭代器输入源
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
  convert::Infallible,
  thread,
  time::{Duration, Instant},
};

use crate::{frame::Frame, input::FrameSource};

/// 把任意图像迭代器包装成帧输入源，按标称帧率分配索引和时间戳
///
/// 开启 `paced` 后按帧率节流，模拟实时摄像头。
pub struct IterSource<It> {
  inner: It,
  fps: f64,
  next_index: u64,
  paced: Option<Instant>,
}

impl<It: Iterator> IterSource<It> {
  pub fn new(inner: It, fps: f64) -> Self {
    Self {
      inner,
      fps,
      next_index: 0,
      paced: None,
    }
  }

  pub fn paced(mut self, paced: bool) -> Self {
    self.paced = paced.then(Instant::now);
    self
  }

  fn wait_for_slot(&self, index: u64) {
    if let Some(start) = self.paced {
      let due = start + Duration::from_secs_f64(index as f64 / self.fps);
      let now = Instant::now();
      if due > now {
        thread::sleep(due - now);
      }
    }
  }
}

impl<It: Iterator> FrameSource for IterSource<It> {
  type Image = It::Item;
  type Error = Infallible;

  fn read(&mut self) -> Result<Option<Frame<Self::Image>>, Self::Error> {
    let index = self.next_index;
    self.wait_for_slot(index);
    Ok(self.inner.next().map(|image| {
      self.next_index += 1;
      Frame::new(index, index as f64 / self.fps, image)
    }))
  }

  fn native_fps(&self) -> f64 {
    self.fps
  }

  fn is_live(&self) -> bool {
    self.paced.is_some()
  }
}
