// 该文件是 Yuedong （悦动） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use tracing::info;

use crate::{FromUrl, FromUrlWithScheme, output::OutputSink, postprocess::ResultRecord};

/// 把每条结果写进日志
#[derive(Debug, Default)]
pub struct LogOutput {
  emitted: u64,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(_url: &url::Url) -> Result<Self, Self::Error> {
    Ok(Self::default())
  }
}

impl OutputSink for LogOutput {
  type Error = Infallible;

  fn emit(&mut self, record: &ResultRecord) -> Result<(), Self::Error> {
    self.emitted += 1;
    let label = record
      .classification
      .as_ref()
      .map(|c| format!("{} ({:.2})", c.label, c.probability));
    let calories = record.energy.map(|e| e.total_kcal);
    info!(
      "步 {} 帧 {} @ {:.2}s 类别: {:?} 计数: {:?} 热量: {:?}",
      record.step_index, record.frame_index, record.timestamp, label, record.rep_counts, calories
    );
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    info!("共输出 {} 条结果", self.emitted);
    Ok(())
  }
}
