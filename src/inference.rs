// 该文件是 Yuedong （悦动） 项目的一部分。
// src/inference.rs - 推理阶段
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
use tracing::{debug, error, trace};

use crate::{
  error::BoxError,
  model::{Model, ModelStepOutput},
  window::Window,
};

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("模型执行失败: {0}")]
  ModelExecution(BoxError),
  #[error("步序号未严格递增: 上一步 {previous}, 当前 {current}")]
  StepOrder { previous: u64, current: u64 },
  #[error("模型输出 {actual} 个向量，期望 {expected} 个")]
  OutputCount { expected: usize, actual: usize },
  #[error("模型内部状态已在之前的错误中丢失")]
  StateLost,
}

/// 推理阶段
///
/// 独占模型及其内部状态，每次只处理一批窗口。模型出错后状态随之丢失，
/// 之后的调用都返回 [`InferenceError::StateLost`]，会话只能重新开始。
pub struct InferenceStage<M: Model> {
  model: M,
  state: Option<M::State>,
  last_step: Option<u64>,
  warm_up_windows: u64,
}

impl<M: Model> InferenceStage<M> {
  pub fn new(model: M) -> Self {
    let state = model.initial_state();
    Self {
      model,
      state: Some(state),
      last_step: None,
      warm_up_windows: 0,
    }
  }

  /// 已经送入模型的预热窗口数
  pub fn warm_up_windows(&self) -> u64 {
    self.warm_up_windows
  }

  pub fn last_step(&self) -> Option<u64> {
    self.last_step
  }

  /// 按顺序推理一批窗口
  ///
  /// 预热窗口照常经过模型以推进内部状态，但不产生输出；其余窗口各产生一个
  /// [`ModelStepOutput`]，顺序与输入一致。
  pub fn infer_batch(
    &mut self,
    windows: &[Window<M::Input>],
  ) -> Result<Vec<ModelStepOutput>, InferenceError> {
    if windows.is_empty() {
      return Ok(Vec::new());
    }

    let mut previous = self.last_step;
    for step in windows.iter().filter_map(Window::step_index) {
      if let Some(previous) = previous
        && step <= previous
      {
        return Err(InferenceError::StepOrder {
          previous,
          current: step,
        });
      }
      previous = Some(step);
    }

    let state = self.state.take().ok_or(InferenceError::StateLost)?;
    let (vectors, state) = self.model.forward_batch(windows, state).map_err(|e| {
      error!("模型推理失败: {}", e);
      InferenceError::ModelExecution(Box::new(e))
    })?;
    self.state = Some(state);

    if vectors.len() != windows.len() {
      self.state = None;
      return Err(InferenceError::OutputCount {
        expected: windows.len(),
        actual: vectors.len(),
      });
    }

    let mut outputs = Vec::with_capacity(windows.len());
    for (window, vector) in windows.iter().zip(vectors) {
      let Some(step_index) = window.step_index() else {
        self.warm_up_windows += 1;
        trace!("预热窗口 #{}", self.warm_up_windows);
        continue;
      };
      let (frame_index, timestamp) = window
        .right_edge()
        .map_or((0, 0.0), |frame| (frame.index, frame.timestamp));
      debug!("第 {} 步推理完成，右边缘帧 {}", step_index, frame_index);
      outputs.push(ModelStepOutput {
        step_index,
        frame_index,
        timestamp,
        vector,
      });
      self.last_step = Some(step_index);
    }
    Ok(outputs)
  }

  /// 开始新的会话，恢复模型的初始状态
  pub fn reset(&mut self) {
    self.state = Some(self.model.initial_state());
    self.last_step = None;
    self.warm_up_windows = 0;
  }
}
