// 该文件是 Yuedong （悦动） 项目的一部分。
// src/output.rs - 结果输出
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

use std::convert::Infallible;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, postprocess::ResultRecord};

/// 结果记录的去向
pub trait OutputSink {
  type Error: std::error::Error + Send + Sync + 'static;

  fn emit(&mut self, record: &ResultRecord) -> Result<(), Self::Error>;

  /// 会话结束，刷新缓冲
  fn finish(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}

mod json_lines;
pub use self::json_lines::{JsonLinesOutput, JsonLinesOutputError};

mod log_output;
pub use self::log_output::LogOutput;

mod memory;
pub use self::memory::MemoryOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON Lines 输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl From<Infallible> for OutputError {
  fn from(value: Infallible) -> Self {
    match value {}
  }
}

pub enum OutputWrapper {
  JsonLinesOutput(JsonLinesOutput),
  LogOutput(LogOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonLinesOutput::SCHEME => {
        let output = JsonLinesOutput::from_url(url)?;
        Ok(OutputWrapper::JsonLinesOutput(output))
      }
      LogOutput::SCHEME => {
        let output = LogOutput::from_url(url)?;
        Ok(OutputWrapper::LogOutput(output))
      }
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl OutputSink for OutputWrapper {
  type Error = OutputError;

  fn emit(&mut self, record: &ResultRecord) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonLinesOutput(output) => output.emit(record).map_err(OutputError::from),
      OutputWrapper::LogOutput(output) => output.emit(record).map_err(OutputError::from),
    }
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonLinesOutput(output) => output.finish().map_err(OutputError::from),
      OutputWrapper::LogOutput(output) => output.finish().map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(scheme)) if scheme == "rtsp"
    ));
    let url = Url::parse("log://").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::LogOutput(_))
    ));
  }
}
