// 该文件是 Yuedong （悦动） 项目的一部分。
// src/model/replay.rs - 回放模型
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

use std::marker::PhantomData;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decoded_path, model::Model, window::Window};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("模型文件读取错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型文件解析错误: {0}")]
  ModelParseError(#[from] serde_json::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("第 {index} 步的向量维度为 {actual}, 期望 {expected}")]
  InconsistentDimension {
    index: usize,
    expected: usize,
    actual: usize,
  },
  #[error("录制的输出已用完，共 {0} 步")]
  Exhausted(usize),
}

/// 回放预先录制的逐步输出向量
///
/// 录制文件是 JSON 数组，每个元素是一步的输出向量。预热窗口输出零向量且不消耗录制；
/// 回放位置就是模型的内部状态。
pub struct ReplayModel<I> {
  steps: Vec<Box<[f32]>>,
  dimension: usize,
  _phantom: PhantomData<fn() -> I>,
}

impl<I> FromUrlWithScheme for ReplayModel<I> {
  const SCHEME: &'static str = "replay";
}

impl<I> FromUrl for ReplayModel<I> {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let path = decoded_path(url);
    info!("加载录制文件: {}", path);
    let content = std::fs::read_to_string(&path)?;
    let steps: Vec<Vec<f32>> = serde_json::from_str(&content)?;
    Self::new(steps)
  }
}

impl<I> ReplayModel<I> {
  pub fn new(steps: Vec<Vec<f32>>) -> Result<Self, ReplayModelError> {
    let dimension = steps.first().map_or(0, |s| s.len());
    for (index, step) in steps.iter().enumerate() {
      if step.len() != dimension {
        return Err(ReplayModelError::InconsistentDimension {
          index,
          expected: dimension,
          actual: step.len(),
        });
      }
    }
    debug!("录制共 {} 步，维度 {}", steps.len(), dimension);

    Ok(Self {
      steps: steps.into_iter().map(Vec::into_boxed_slice).collect(),
      dimension,
      _phantom: PhantomData,
    })
  }

  pub fn dimension(&self) -> usize {
    self.dimension
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }
}

impl<I> Model for ReplayModel<I> {
  type Input = I;
  type State = usize;
  type Error = ReplayModelError;

  fn initial_state(&self) -> Self::State {
    0
  }

  fn forward(
    &self,
    window: &Window<Self::Input>,
    state: Self::State,
  ) -> Result<(Box<[f32]>, Self::State), Self::Error> {
    if window.is_warm_up() {
      return Ok((vec![0.0; self.dimension].into_boxed_slice(), state));
    }
    let vector = self
      .steps
      .get(state)
      .cloned()
      .ok_or(ReplayModelError::Exhausted(self.steps.len()))?;
    Ok((vector, state + 1))
  }
}
