// 该文件是 Yuedong （悦动） 项目的一部分。
// src/frame.rs - 带时间戳的视频帧定义
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

use std::sync::Arc;

use thiserror::Error;

const RGB_CHANNELS: usize = 3;

pub trait AsNhwcFrame<const W: u32, const H: u32> {
  fn as_nhwc(&self) -> &[u8];
}

/// 输入源产生的一帧图像
///
/// 帧一旦产生便不可修改。图像数据通过 `Arc` 共享，窗口缓冲区在边缘填充
/// 以及相邻窗口重叠时只复制引用，不复制像素。
#[derive(Debug)]
pub struct Frame<I> {
  /// 帧索引，由输入源单调递增分配
  pub index: u64,
  /// 时间戳（秒）
  pub timestamp: f64,
  /// 图像数据
  pub image: Arc<I>,
}

impl<I> Clone for Frame<I> {
  fn clone(&self) -> Self {
    Self {
      index: self.index,
      timestamp: self.timestamp,
      image: Arc::clone(&self.image),
    }
  }
}

impl<I> Frame<I> {
  pub fn new(index: u64, timestamp: f64, image: I) -> Self {
    Self {
      index,
      timestamp,
      image: Arc::new(image),
    }
  }
}

#[derive(Error, Debug)]
#[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
pub struct FrameSizeMismatch {
  pub expected: usize,
  pub actual: usize,
}

/// 固定尺寸的 RGB 像素缓冲区（NHWC 排列）
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> RgbNhwcFrame<W, H> {
  pub const LEN: usize = RGB_CHANNELS * W as usize * H as usize;

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl<const W: u32, const H: u32> TryFrom<Vec<u8>> for RgbNhwcFrame<W, H> {
  type Error = FrameSizeMismatch;

  fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(FrameSizeMismatch {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for RgbNhwcFrame<W, H> {
  fn default() -> Self {
    Self {
      data: vec![0u8; Self::LEN].into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> AsMut<[u8]> for RgbNhwcFrame<W, H> {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for RgbNhwcFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_frame_clone_shares_image() {
    let frame = Frame::new(3, 0.1, vec![1u8, 2, 3]);
    let copy = frame.clone();
    assert_eq!(copy.index, 3);
    assert!(Arc::ptr_eq(&frame.image, &copy.image));
  }

  #[test]
  fn test_rgb_frame_rejects_wrong_length() {
    let err = RgbNhwcFrame::<2, 2>::try_from(vec![0u8; 5]).unwrap_err();
    assert_eq!(err.expected, 12);
    assert_eq!(err.actual, 5);

    let frame = RgbNhwcFrame::<2, 2>::try_from(vec![7u8; 12]).unwrap();
    assert_eq!(frame.as_nhwc().len(), 12);
    assert_eq!(frame.channels(), 3);
  }
}
