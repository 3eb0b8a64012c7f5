// 该文件是 Yuedong （悦动） 项目的一部分。
// src/output/memory.rs - 内存输出
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
  convert::Infallible,
  sync::{Arc, Mutex, PoisonError},
};

use crate::{output::OutputSink, postprocess::ResultRecord};

/// 把结果收集在内存中，克隆出的句柄共享同一份记录
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
  records: Arc<Mutex<Vec<ResultRecord>>>,
  finished: Arc<Mutex<bool>>,
}

impl MemoryOutput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn records(&self) -> Vec<ResultRecord> {
    self
      .records
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn is_finished(&self) -> bool {
    *self.finished.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl OutputSink for MemoryOutput {
  type Error = Infallible;

  fn emit(&mut self, record: &ResultRecord) -> Result<(), Self::Error> {
    self
      .records
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(record.clone());
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = true;
    Ok(())
  }
}
