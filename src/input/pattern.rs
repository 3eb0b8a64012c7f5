// 该文件是 Yuedong （悦动） 项目的一部分。
// src/input/pattern.rs - 测试图案输入
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

//! 生成灰度渐变帧的测试源，用于在没有摄像头和视频文件时跑通流水线。
//!
//! ```text
//! pattern://?fps=30&frames=300        # 300 帧后结束
//! pattern://?fps=30&live              # 按帧率节流、无限长的模拟摄像头
//! ```

use std::convert::Infallible;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, RgbNhwcFrame},
  input::{FrameSource, IterSource, fps_from_query},
};

#[derive(Error, Debug)]
pub enum PatternInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("查询参数无效: {0}")]
  InvalidQuery(String),
}

impl From<Infallible> for PatternInputError {
  fn from(err: Infallible) -> Self {
    match err {}
  }
}

type PatternIter<const W: u32, const H: u32> =
  std::iter::Map<std::ops::RangeInclusive<u64>, fn(u64) -> RgbNhwcFrame<W, H>>;

pub struct PatternInput<const W: u32, const H: u32> {
  inner: IterSource<PatternIter<W, H>>,
}

const PATTERN_DEFAULT_FPS: f64 = 30.0;

impl<const W: u32, const H: u32> FromUrlWithScheme for PatternInput<W, H> {
  const SCHEME: &'static str = "pattern";
}

impl<const W: u32, const H: u32> FromUrl for PatternInput<W, H> {
  type Error = PatternInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PatternInputError::SchemeMismatch);
    }

    let fps = fps_from_query(url, PATTERN_DEFAULT_FPS).map_err(PatternInputError::InvalidQuery)?;
    let frames = match url.query_pairs().find(|(k, _)| k == "frames") {
      Some((_, v)) => v
        .parse::<u64>()
        .map_err(|_| PatternInputError::InvalidQuery(format!("帧数参数无效: {}", v)))?,
      None => u64::MAX,
    };
    let live = url.query_pairs().any(|(k, _)| k == "live");

    info!("测试图案输入: {}x{} @ {} fps, 实时: {}", W, H, fps, live);

    let last = frames.saturating_sub(1);
    let generate: fn(u64) -> RgbNhwcFrame<W, H> = pattern_frame::<W, H>;
    // frames=0 时给出空区间
    let range = if frames == 0 { 1..=0 } else { 0..=last };

    Ok(PatternInput {
      inner: IterSource::new(range.map(generate), fps).paced(live),
    })
  }
}

fn pattern_frame<const W: u32, const H: u32>(index: u64) -> RgbNhwcFrame<W, H> {
  let mut frame = RgbNhwcFrame::<W, H>::default();
  let value = (index % 256) as u8;
  frame.as_mut().fill(value);
  frame
}

impl<const W: u32, const H: u32> FrameSource for PatternInput<W, H> {
  type Image = RgbNhwcFrame<W, H>;
  type Error = PatternInputError;

  fn read(&mut self) -> Result<Option<Frame<Self::Image>>, Self::Error> {
    Ok(self.inner.read()?)
  }

  fn native_fps(&self) -> f64 {
    self.inner.native_fps()
  }

  fn is_live(&self) -> bool {
    self.inner.is_live()
  }
}
