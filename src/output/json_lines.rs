// 该文件是 Yuedong （悦动） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 文件输出
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
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use chrono::{Datelike, Local};
use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme, decoded_path, output::OutputSink, postprocess::ResultRecord,
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每条结果写一行 JSON
///
/// `jsonl:///path/out.jsonl` 写入指定文件；带 `daily` 参数时路径视为目录，
/// 文件按会话开始时间放在 `YYYY/MM/DD/HH-MM-SS.jsonl`。带 `append` 参数时追加写入。
pub struct JsonLinesOutput {
  path: PathBuf,
  writer: BufWriter<File>,
  flush_each: bool,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }

    let daily = url.query_pairs().any(|(k, _)| k == "daily");
    let append = url.query_pairs().any(|(k, _)| k == "append");
    let flush_each = url.query_pairs().any(|(k, _)| k == "flush");

    let base = PathBuf::from(decoded_path(url));
    let path = if daily { Self::daily_path(&base) } else { base };
    let output = Self::create(path, append)?;
    Ok(output.with_flush_each(flush_each))
  }
}

impl JsonLinesOutput {
  fn daily_path(directory: &Path) -> PathBuf {
    let now = Local::now();
    directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(format!("{}.jsonl", now.format("%H-%M-%S")))
  }

  pub fn create<P: Into<PathBuf>>(path: P, append: bool) -> Result<Self, JsonLinesOutputError> {
    let path = path.into();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
      && !parent.exists()
    {
      std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .append(append)
      .truncate(!append)
      .open(&path)?;
    info!("结果写入: {}", path.display());

    Ok(Self {
      path,
      writer: BufWriter::new(file),
      flush_each: false,
    })
  }

  /// 每条记录后立即刷新，便于其他进程实时读取
  pub fn with_flush_each(mut self, flush_each: bool) -> Self {
    self.flush_each = flush_each;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl OutputSink for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn emit(&mut self, record: &ResultRecord) -> Result<(), Self::Error> {
    serde_json::to_writer(&mut self.writer, record)?;
    self.writer.write_all(b"\n")?;
    if self.flush_each {
      self.writer.flush()?;
    }
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    self.writer.flush()?;
    Ok(())
  }
}
