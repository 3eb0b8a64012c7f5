// 该文件是 Yuedong （悦动） 项目的一部分。
// src/task.rs - 任务定义
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
  sync::atomic::{AtomicUsize, Ordering},
  thread,
  time::Duration,
};

use tracing::{info, warn};

use crate::{
  config::{PipelineConfig, PostprocessConfig, SessionConfig},
  input::FrameSource,
  labels::LabelMap,
  model::Model,
  output::OutputSink,
  pipeline::{Pipeline, PipelineReport, StopToken},
  postprocess::PostprocessChain,
};

// 收到中断信号后等待有序退出的最长时间
const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 流式任务：从输入源持续读帧，推理并输出每一步的结果
pub struct StreamingTask {
  pipeline: PipelineConfig,
  postprocess: PostprocessConfig,
  labels: LabelMap,
  signal_handler: bool,
}

impl StreamingTask {
  pub fn new(pipeline: PipelineConfig, postprocess: PostprocessConfig) -> Self {
    Self {
      pipeline,
      postprocess,
      labels: LabelMap::fitness_rep_counting(),
      signal_handler: false,
    }
  }

  /// 校验会话配置并创建任务
  pub fn from_session(config: &SessionConfig) -> Result<Self, crate::config::ConfigError> {
    let (pipeline, postprocess) = config.validate()?;
    Ok(Self::new(pipeline, postprocess))
  }

  pub fn with_labels(mut self, labels: LabelMap) -> Self {
    self.labels = labels;
    self
  }

  /// 安装 Ctrl-C 处理：第一次有序停止，第二次强制停止
  pub fn with_signal_handler(mut self, enabled: bool) -> Self {
    self.signal_handler = enabled;
    self
  }
}

fn install_signal_handler(stop: StopToken) -> Result<(), ctrlc::Error> {
  let interrupts = AtomicUsize::new(0);
  ctrlc::set_handler(move || {
    if interrupts.fetch_add(1, Ordering::SeqCst) == 0 {
      info!("收到中断信号，停止采集并处理完剩余帧...");
      stop.request_stop();
      thread::spawn(|| {
        thread::sleep(FORCE_EXIT_AFTER);
        warn!("强制退出程序");
        std::process::exit(1);
      });
    } else {
      warn!("再次收到中断信号，强制停止");
      stop.abort();
    }
  })
}

impl<S, M, O> Task<S, M, O> for StreamingTask
where
  S: FrameSource + Send + 'static,
  S::Image: Send + Sync + 'static,
  M: Model<Input = S::Image> + Send + 'static,
  O: OutputSink + Send + 'static,
{
  type Output = PipelineReport;
  type Error = anyhow::Error;

  fn run_task(self, input: S, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let chain = PostprocessChain::from_config(&self.postprocess, self.labels);
    let pipeline = Pipeline::new(self.pipeline);
    if self.signal_handler {
      install_signal_handler(pipeline.stop_token())?;
    }

    let mut report = pipeline.run(input, model, chain, output);
    if let Some(error) = report.error.take() {
      return Err(anyhow::Error::new(error).context(format!("会话失败: {}", report.status)));
    }

    info!(
      "任务完成: {}, 共 {} 条结果，丢弃 {} 帧",
      report.status, report.stats.records, report.stats.dropped
    );
    Ok(report)
  }
}
