// 该文件是 Yuedong （悦动） 项目的一部分。
// src/input/image_sequence.rs - 图像序列输入
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

use std::path::{Path, PathBuf};

use image::{ImageReader, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path,
  frame::{Frame, FrameSizeMismatch, RgbNhwcFrame},
  input::{FrameSource, fps_from_query},
};

#[derive(Error, Debug)]
pub enum ImageSequenceInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("查询参数无效: {0}")]
  InvalidQuery(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {path}: {source}")]
  ImageLoadError {
    path: PathBuf,
    source: image::ImageError,
  },
  #[error("帧尺寸错误: {0}")]
  FrameSize(#[from] FrameSizeMismatch),
}

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];
const IMAGE_SEQUENCE_DEFAULT_FPS: f64 = 30.0;

/// 按文件名顺序读取目录中的图像，作为一段固定帧率的视频
pub struct ImageSequenceInput<const W: u32, const H: u32> {
  files: Vec<PathBuf>,
  position: usize,
  fps: f64,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for ImageSequenceInput<W, H> {
  const SCHEME: &'static str = "frames";
}

impl<const W: u32, const H: u32> FromUrl for ImageSequenceInput<W, H> {
  type Error = ImageSequenceInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageSequenceInputError::SchemaMismatch);
    }

    let fps = fps_from_query(url, IMAGE_SEQUENCE_DEFAULT_FPS)
      .map_err(ImageSequenceInputError::InvalidQuery)?;
    Self::open(decoded_path(url), fps)
  }
}

impl<const W: u32, const H: u32> ImageSequenceInput<W, H> {
  pub fn open<P: AsRef<Path>>(directory: P, fps: f64) -> Result<Self, ImageSequenceInputError> {
    let directory = directory.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false);
      if is_image {
        files.push(path);
      }
    }
    files.sort();

    if files.is_empty() {
      warn!("目录中没有图像文件: {}", directory.display());
    }
    info!(
      "图像序列输入: {} 帧 @ {} fps, 来自 {}",
      files.len(),
      fps,
      directory.display()
    );

    Ok(Self {
      files,
      position: 0,
      fps,
    })
  }

  fn load(path: &Path) -> Result<RgbNhwcFrame<W, H>, ImageSequenceInputError> {
    let load_error = |source| ImageSequenceInputError::ImageLoadError {
      path: path.to_path_buf(),
      source,
    };
    let image = ImageReader::open(path)?
      .decode()
      .map_err(load_error)?
      .to_rgb8();

    let image = if image.dimensions() == (W, H) {
      image
    } else {
      debug!("缩放 {:?} 到 {}x{}", image.dimensions(), W, H);
      image::imageops::resize(&image, W, H, FilterType::Triangle)
    };

    // RgbImage 的内存排列就是 HWC
    Ok(RgbNhwcFrame::try_from(image.into_raw())?)
  }
}

impl<const W: u32, const H: u32> FrameSource for ImageSequenceInput<W, H> {
  type Image = RgbNhwcFrame<W, H>;
  type Error = ImageSequenceInputError;

  fn read(&mut self) -> Result<Option<Frame<Self::Image>>, Self::Error> {
    let Some(path) = self.files.get(self.position) else {
      return Ok(None);
    };
    let image = Self::load(path)?;
    let index = self.position as u64;
    self.position += 1;
    Ok(Some(Frame::new(index, index as f64 / self.fps, image)))
  }

  fn native_fps(&self) -> f64 {
    self.fps
  }

  fn close(&mut self) {
    self.position = self.files.len();
  }
}
