// 该文件是 Yuedong （悦动） 项目的一部分。
// src/error.rs - 流水线错误定义
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

use std::{fmt, time::Duration};

use serde::Serialize;
use thiserror::Error;

use crate::{config::ConfigError, inference::InferenceError};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 终止会话的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
  SourceReadError,
  ModelExecutionError,
  QueueTimeout,
  ConfigurationError,
  SinkWriteError,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::SourceReadError => "SourceReadError",
      ErrorKind::ModelExecutionError => "ModelExecutionError",
      ErrorKind::QueueTimeout => "QueueTimeout",
      ErrorKind::ConfigurationError => "ConfigurationError",
      ErrorKind::SinkWriteError => "SinkWriteError",
    };
    f.write_str(name)
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("读取输入帧失败: {0}")]
  SourceRead(BoxError),
  #[error("模型推理失败: {0}")]
  ModelExecution(#[from] InferenceError),
  #[error("推理阶段超过 {0:.2?} 没有进展，队列中仍有待处理帧")]
  QueueTimeout(Duration),
  #[error("配置错误: {0}")]
  Configuration(#[from] ConfigError),
  #[error("写入输出失败: {0}")]
  SinkWrite(BoxError),
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::SourceRead(_) => ErrorKind::SourceReadError,
      PipelineError::ModelExecution(_) => ErrorKind::ModelExecutionError,
      PipelineError::QueueTimeout(_) => ErrorKind::QueueTimeout,
      PipelineError::Configuration(_) => ErrorKind::ConfigurationError,
      PipelineError::SinkWrite(_) => ErrorKind::SinkWriteError,
    }
  }
}
