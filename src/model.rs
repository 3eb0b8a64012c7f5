// 该文件是 Yuedong （悦动） 项目的一部分。
// src/model.rs - 模型
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

use serde::{Deserialize, Serialize};

use crate::window::Window;

/// 时序模型
///
/// 模型本身不可变，跨调用的内部状态以值的形式显式传入和传出，
/// 由推理阶段独占持有并严格按步顺序串行调用。
pub trait Model {
  type Input;
  type State;
  type Error: std::error::Error + Send + Sync + 'static;

  /// 新会话的初始状态
  fn initial_state(&self) -> Self::State;

  fn forward(
    &self,
    window: &Window<Self::Input>,
    state: Self::State,
  ) -> Result<(Box<[f32]>, Self::State), Self::Error>;

  /// 一次处理多个窗口，输出顺序必须与输入顺序一致
  fn forward_batch(
    &self,
    windows: &[Window<Self::Input>],
    state: Self::State,
  ) -> Result<(Vec<Box<[f32]>>, Self::State), Self::Error> {
    let mut outputs = Vec::with_capacity(windows.len());
    let mut state = state;
    for window in windows {
      let (vector, next) = self.forward(window, state)?;
      outputs.push(vector);
      state = next;
    }
    Ok((outputs, state))
  }
}

/// 模型的一步输出
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStepOutput {
  pub step_index: u64,
  /// 窗口右边缘的真实帧索引
  pub frame_index: u64,
  /// 窗口右边缘的帧时间戳（秒）
  pub timestamp: f64,
  pub vector: Box<[f32]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
  pub label: String,
  pub probability: f32,
}

mod replay;
pub use self::replay::{ReplayModel, ReplayModelError};
