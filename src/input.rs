// 该文件是 Yuedong （悦动） 项目的一部分。
// src/input.rs - 视频帧输入源
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

use thiserror::Error;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, RgbNhwcFrame},
};

/// 帧输入源
///
/// 以原生帧率产生带时间戳的帧，帧索引从 0 开始单调递增且不跳号。
pub trait FrameSource {
  type Image;
  type Error: std::error::Error + Send + Sync + 'static;

  /// 读取下一帧，`Ok(None)` 表示输入已结束
  fn read(&mut self) -> Result<Option<Frame<Self::Image>>, Self::Error>;

  /// 标称帧率
  fn native_fps(&self) -> f64;

  /// 是否为实时源（摄像头等），实时源默认使用丢帧策略
  fn is_live(&self) -> bool {
    false
  }

  fn close(&mut self) {}
}

mod iter_source;
pub use self::iter_source::IterSource;

mod pattern;
pub use self::pattern::{PatternInput, PatternInputError};

#[cfg(feature = "read_image_file")]
mod image_sequence;
#[cfg(feature = "read_image_file")]
pub use self::image_sequence::{ImageSequenceInput, ImageSequenceInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像序列输入错误: {0}")]
  ImageSequenceInputError(#[from] ImageSequenceInputError),
  #[error("测试图案输入错误: {0}")]
  PatternInputError(#[from] PatternInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper<const W: u32, const H: u32> {
  Pattern(PatternInput<W, H>),
  #[cfg(feature = "read_image_file")]
  ImageSequence(ImageSequenceInput<W, H>),
}

impl<const W: u32, const H: u32> FromUrl for InputWrapper<W, H> {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() == PatternInput::<W, H>::SCHEME {
      let input = PatternInput::from_url(url)?;
      return Ok(InputWrapper::Pattern(input));
    }
    #[cfg(feature = "read_image_file")]
    {
      if url.scheme() == ImageSequenceInput::<W, H>::SCHEME {
        let input = ImageSequenceInput::from_url(url)?;
        return Ok(InputWrapper::ImageSequence(input));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl<const W: u32, const H: u32> FrameSource for InputWrapper<W, H> {
  type Image = RgbNhwcFrame<W, H>;
  type Error = InputError;

  fn read(&mut self) -> Result<Option<Frame<Self::Image>>, Self::Error> {
    match self {
      InputWrapper::Pattern(input) => input.read().map_err(InputError::from),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.read().map_err(InputError::from),
    }
  }

  fn native_fps(&self) -> f64 {
    match self {
      InputWrapper::Pattern(input) => input.native_fps(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.native_fps(),
    }
  }

  fn is_live(&self) -> bool {
    match self {
      InputWrapper::Pattern(input) => input.is_live(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.is_live(),
    }
  }

  fn close(&mut self) {
    match self {
      InputWrapper::Pattern(input) => input.close(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.close(),
    }
  }
}

/// 从 URL 查询参数中读取帧率
pub(crate) fn fps_from_query(url: &url::Url, default: f64) -> Result<f64, String> {
  match url.query_pairs().find(|(k, _)| k == "fps") {
    Some((_, v)) => match v.parse::<f64>() {
      Ok(fps) if fps.is_finite() && fps > 0.0 => Ok(fps),
      _ => Err(format!("帧率参数无效: {}", v)),
    },
    None => Ok(default),
  }
}
