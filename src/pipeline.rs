// 该文件是 Yuedong （悦动） 项目的一部分。
// src/pipeline.rs - 流水线调度
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

//! # 流水线调度
//!
//! 采集、推理、输出三个阶段各占一个线程，由两个有界队列相连：
//!
//! ```text
//! FrameSource ─▶ [采集] ─▶ 帧队列 ─▶ [推理] ─▶ 步队列 ─▶ [输出] ─▶ OutputSink
//!                          窗口缓冲区 + 模型        后处理链
//! ```
//!
//! 帧队列按背压策略阻塞或丢弃最早的帧，步队列总是阻塞。停止信号逐级传递：
//! 采集阶段停止后关闭帧队列，推理阶段处理完剩余帧后关闭步队列，输出阶段随后结束。
//! 调用线程负责看门狗：帧队列非空而推理阶段超过期限没有进展时，强制停止会话。

use std::{
  fmt,
  sync::{Arc, Mutex, PoisonError, atomic::Ordering},
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use tracing::{debug, error, info, warn};

use crate::{
  config::PipelineConfig,
  error::{BoxError, ErrorKind, PipelineError},
  frame::Frame,
  inference::{InferenceError, InferenceStage},
  input::FrameSource,
  model::{Model, ModelStepOutput},
  output::OutputSink,
  postprocess::PostprocessChain,
  window::{FrameResampler, TemporalWindowBuffer},
};

mod queue;
mod stats;
mod stop;

pub use self::queue::{PushOutcome, QueueProducer, bounded_queue};
pub use self::stats::{PipelineStats, StatsSnapshot};
pub use self::stop::StopToken;

use self::stats::Progress;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const WATCH_INTERVAL: Duration = Duration::from_millis(10);
const DROP_WARN_EVERY: u64 = 100;

/// 会话的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
  /// 收到停止请求或达到帧数上限
  Completed,
  /// 输入源正常结束
  SourceEnded,
  Failed(ErrorKind),
}

impl fmt::Display for PipelineStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PipelineStatus::Completed => f.write_str("completed"),
      PipelineStatus::SourceEnded => f.write_str("source-ended"),
      PipelineStatus::Failed(kind) => write!(f, "failed: {}", kind),
    }
  }
}

#[derive(Debug)]
pub struct PipelineReport {
  pub status: PipelineStatus,
  pub stats: StatsSnapshot,
  pub error: Option<PipelineError>,
}

impl PipelineReport {
  pub fn is_success(&self) -> bool {
    !matches!(self.status, PipelineStatus::Failed(_))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureEnd {
  SourceEnded,
  FrameLimit,
  Stopped,
  Failed,
}

/// 各阶段共享的状态
#[derive(Clone)]
struct Shared {
  stop: StopToken,
  stats: Arc<PipelineStats>,
  progress: Arc<Progress>,
  failure: Arc<Mutex<Option<PipelineError>>>,
}

impl Shared {
  /// 记录第一个致命错误，之后的错误只写日志
  fn fail(&self, error: PipelineError) {
    error!("致命错误 [{}]: {}", error.kind(), error);
    let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
    if failure.is_none() {
      *failure = Some(error);
    }
  }

  fn take_failure(&self) -> Option<PipelineError> {
    self
      .failure
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
  }
}

pub struct Pipeline {
  config: PipelineConfig,
  stop: StopToken,
  stats: Arc<PipelineStats>,
}

impl Pipeline {
  pub fn new(config: PipelineConfig) -> Self {
    Self {
      config,
      stop: StopToken::new(),
      stats: Arc::new(PipelineStats::default()),
    }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// 用于从其他线程（例如信号处理）停止会话
  pub fn stop_token(&self) -> StopToken {
    self.stop.clone()
  }

  /// 运行中的统计，可在其他线程读取
  pub fn stats(&self) -> Arc<PipelineStats> {
    Arc::clone(&self.stats)
  }

  /// 运行一次会话，直到输入结束、收到停止请求或出现致命错误
  pub fn run<S, M, O>(
    self,
    source: S,
    model: M,
    chain: PostprocessChain,
    sink: O,
  ) -> PipelineReport
  where
    S: FrameSource + Send + 'static,
    S::Image: Send + Sync + 'static,
    M: Model<Input = S::Image> + Send + 'static,
    O: OutputSink + Send + 'static,
  {
    let Pipeline {
      config,
      stop,
      stats,
    } = self;
    let shared = Shared {
      stop,
      stats,
      progress: Arc::new(Progress::new()),
      failure: Arc::new(Mutex::new(None)),
    };

    if let Err(e) = config.check() {
      let error = PipelineError::from(e);
      shared.fail(error);
      return finish_report(&shared, CaptureEnd::Failed);
    }

    let policy = config.effective_drop_policy(source.is_live());
    info!(
      "会话开始: 步长 {}, 时间上下文 {}, 队列容量 {}, 背压策略 {:?}",
      config.stride, config.temporal_context, config.queue_capacity, policy
    );

    let (frame_queue, frame_rx) = bounded_queue(config.queue_capacity, policy, POLL_INTERVAL);
    let (step_tx, step_rx) = bounded(config.queue_capacity);
    let watched = frame_rx.clone();

    let capture = {
      let shared = shared.clone();
      let config = config.clone();
      thread::spawn(move || capture_stage(source, frame_queue, &config, &shared))
    };
    let inference = {
      let shared = shared.clone();
      let config = config.clone();
      thread::spawn(move || inference_stage(model, frame_rx, step_tx, &config, &shared))
    };
    let output = {
      let shared = shared.clone();
      thread::spawn(move || output_stage(chain, sink, step_rx, &shared))
    };

    let stuck = watch(&config, &shared, &watched, &capture, &inference, &output);

    let capture_end = match capture.join() {
      Ok(end) => end,
      Err(panic) => {
        shared.fail(PipelineError::SourceRead(panic_message(panic)));
        shared.stop.abort();
        CaptureEnd::Failed
      }
    };
    if stuck {
      warn!("推理线程没有响应，已放弃等待");
    } else if let Err(panic) = inference.join() {
      shared.fail(PipelineError::ModelExecution(InferenceError::ModelExecution(
        panic_message(panic),
      )));
    }
    if let Err(panic) = output.join() {
      shared.fail(PipelineError::SinkWrite(panic_message(panic)));
    }

    // 阶段都已退出，队列中剩下的帧不会再被处理
    let leftover = watched.try_iter().count() as u64;
    if leftover > 0 {
      PipelineStats::add(&shared.stats.abandoned, leftover);
    }

    finish_report(&shared, capture_end)
  }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> BoxError {
  let message = panic
    .downcast_ref::<&str>()
    .map(|s| s.to_string())
    .or_else(|| panic.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "未知错误".to_string());
  format!("线程崩溃: {}", message).into()
}

fn finish_report(shared: &Shared, capture_end: CaptureEnd) -> PipelineReport {
  let error = shared.take_failure();
  let status = match (&error, capture_end) {
    (Some(error), _) => PipelineStatus::Failed(error.kind()),
    (None, CaptureEnd::SourceEnded) => PipelineStatus::SourceEnded,
    (None, _) => PipelineStatus::Completed,
  };
  let stats = shared.stats.snapshot();

  match status {
    PipelineStatus::Failed(_) => error!("会话结束: {}, 统计: {:?}", status, stats),
    _ => info!("会话结束: {}, 统计: {:?}", status, stats),
  }
  if !stats.is_balanced() {
    warn!("帧计数不平衡: {:?}", stats);
  }

  PipelineReport {
    status,
    stats,
    error,
  }
}

/// 看门狗，返回推理阶段是否卡死
fn watch<T, A, B, C>(
  config: &PipelineConfig,
  shared: &Shared,
  frames: &Receiver<T>,
  capture: &JoinHandle<A>,
  inference: &JoinHandle<B>,
  output: &JoinHandle<C>,
) -> bool {
  loop {
    if capture.is_finished() && inference.is_finished() && output.is_finished() {
      return false;
    }
    thread::sleep(WATCH_INTERVAL);

    // 推理阶段先于采集阶段退出只可能是崩溃，帧队列不会再被消费
    if inference.is_finished() && !capture.is_finished() && !shared.stop.is_aborted() {
      warn!("推理线程已退出，停止采集");
      shared.stop.abort();
    }

    if let Some(deadline) = config.inference_timeout
      && !inference.is_finished()
      && !frames.is_empty()
      && shared.progress.idle() > deadline
    {
      shared.fail(PipelineError::QueueTimeout(deadline));
      shared.stop.abort();
      return true;
    }
  }
}

fn capture_stage<S: FrameSource>(
  mut source: S,
  queue: QueueProducer<(u64, Frame<S::Image>)>,
  config: &PipelineConfig,
  shared: &Shared,
) -> CaptureEnd {
  let stats = &shared.stats;
  let fps = source.native_fps();
  let mut resampler = if fps.is_finite() && fps > 0.0 {
    FrameResampler::new(fps, config.model_fps)
  } else {
    warn!("输入源帧率 {} 无效，不做重采样", fps);
    FrameResampler::passthrough()
  };
  info!("采集开始: 输入帧率 {:.2}", fps);

  let end = loop {
    if shared.stop.is_stop_requested() {
      break CaptureEnd::Stopped;
    }
    if let Some(limit) = config.frame_number
      && stats.captured.load(Ordering::Relaxed) >= limit
    {
      info!("已达到帧数上限 {}", limit);
      break CaptureEnd::FrameLimit;
    }

    let frame = match source.read() {
      Ok(Some(frame)) => frame,
      Ok(None) => break CaptureEnd::SourceEnded,
      Err(e) => {
        shared.fail(PipelineError::SourceRead(Box::new(e)));
        break CaptureEnd::Failed;
      }
    };
    PipelineStats::inc(&stats.captured);

    let Some(position) = resampler.accept(frame.index) else {
      PipelineStats::inc(&stats.resampled_out);
      continue;
    };

    PipelineStats::inc(&stats.enqueued);
    match queue.push((position, frame), &shared.stop) {
      PushOutcome::Delivered { evicted: 0 } => {}
      PushOutcome::Delivered { evicted } => {
        let before = stats.dropped.load(Ordering::Relaxed);
        let total = PipelineStats::add(&stats.dropped, evicted);
        debug!("帧队列已满，丢弃最早的 {} 帧", evicted);
        if total / DROP_WARN_EVERY > before / DROP_WARN_EVERY {
          warn!("推理跟不上输入，累计丢弃 {} 帧", total);
        }
      }
      PushOutcome::Stopped | PushOutcome::Disconnected => {
        PipelineStats::inc(&stats.abandoned);
        break CaptureEnd::Stopped;
      }
    }
  };

  source.close();
  info!("采集结束: {:?}", end);
  end
}

fn inference_stage<M: Model>(
  model: M,
  frames: Receiver<(u64, Frame<M::Input>)>,
  steps: Sender<ModelStepOutput>,
  config: &PipelineConfig,
  shared: &Shared,
) {
  let mut buffer = TemporalWindowBuffer::new(config.temporal_context, config.stride, config.warm_up);
  let mut stage = InferenceStage::new(model);
  info!("推理开始");

  loop {
    shared.progress.touch();
    if shared.stop.is_aborted() {
      break;
    }
    match frames.recv_timeout(POLL_INTERVAL) {
      Ok((position, frame)) => {
        PipelineStats::inc(&shared.stats.processed);
        buffer.push_at(position, frame);
        if !run_windows(&mut buffer, &mut stage, &steps, config, shared) {
          break;
        }
      }
      Err(RecvTimeoutError::Timeout) => continue,
      Err(RecvTimeoutError::Disconnected) => {
        buffer.finish();
        run_windows(&mut buffer, &mut stage, &steps, config, shared);
        break;
      }
    }
  }
  drop(steps);

  if shared.stop.is_aborted() {
    // 等采集阶段退出，放弃剩余的帧
    let abandoned = frames.iter().count() as u64;
    if abandoned > 0 {
      PipelineStats::add(&shared.stats.abandoned, abandoned);
      info!("强制停止，放弃队列中的 {} 帧", abandoned);
    }
  }
  info!("推理结束，共 {} 步", shared.stats.steps.load(Ordering::Relaxed));
}

/// 推理所有就绪的窗口，返回是否可以继续
fn run_windows<M: Model>(
  buffer: &mut TemporalWindowBuffer<M::Input>,
  stage: &mut InferenceStage<M>,
  steps: &Sender<ModelStepOutput>,
  config: &PipelineConfig,
  shared: &Shared,
) -> bool {
  let windows: Vec<_> = buffer.pop_ready_windows().collect();
  for batch in windows.chunks(config.batch_size) {
    let started = Instant::now();
    let outputs = match stage.infer_batch(batch) {
      Ok(outputs) => outputs,
      Err(e) => {
        shared.fail(PipelineError::ModelExecution(e));
        shared.stop.abort();
        return false;
      }
    };
    shared.progress.touch();
    PipelineStats::add(
      &shared.stats.warm_up_windows,
      (batch.len() - outputs.len()) as u64,
    );
    debug!("推理 {} 个窗口耗时 {:.2?}", batch.len(), started.elapsed());

    let mut outputs = outputs.into_iter();
    while let Some(output) = outputs.next() {
      PipelineStats::inc(&shared.stats.steps);
      if !send_step(steps, output, shared) {
        PipelineStats::add(&shared.stats.steps_abandoned, 1 + outputs.len() as u64);
        return false;
      }
    }
  }
  true
}

fn send_step(steps: &Sender<ModelStepOutput>, output: ModelStepOutput, shared: &Shared) -> bool {
  let mut output = output;
  loop {
    match steps.send_timeout(output, POLL_INTERVAL) {
      Ok(()) => return true,
      Err(SendTimeoutError::Timeout(back)) => {
        // 等待下游不算卡死
        shared.progress.touch();
        if shared.stop.is_aborted() {
          return false;
        }
        output = back;
      }
      Err(SendTimeoutError::Disconnected(_)) => {
        shared.stop.abort();
        return false;
      }
    }
  }
}

fn output_stage<O: OutputSink>(
  mut chain: PostprocessChain,
  mut sink: O,
  steps: Receiver<ModelStepOutput>,
  shared: &Shared,
) {
  info!("输出开始");
  let mut last_step = None;

  loop {
    let pending: Vec<ModelStepOutput> = match steps.recv_timeout(POLL_INTERVAL) {
      Ok(output) => vec![output],
      // 强制停止时输出已经推理完的步，然后退出
      Err(RecvTimeoutError::Timeout) if shared.stop.is_aborted() => {
        let pending = steps.try_iter().collect();
        emit_all(pending, &mut chain, &mut sink, &mut last_step, &steps, shared);
        break;
      }
      Err(RecvTimeoutError::Timeout) => continue,
      Err(RecvTimeoutError::Disconnected) => break,
    };
    if !emit_all(pending, &mut chain, &mut sink, &mut last_step, &steps, shared) {
      break;
    }
  }

  if let Err(e) = sink.finish() {
    shared.fail(PipelineError::SinkWrite(Box::new(e)));
  }
  info!("输出结束，共 {} 条结果", shared.stats.records.load(Ordering::Relaxed));
}

fn emit_all<O: OutputSink>(
  pending: Vec<ModelStepOutput>,
  chain: &mut PostprocessChain,
  sink: &mut O,
  last_step: &mut Option<u64>,
  steps: &Receiver<ModelStepOutput>,
  shared: &Shared,
) -> bool {
  for output in pending {
    if let Some(last) = *last_step
      && output.step_index <= last
    {
      warn!("步序号 {} 不大于上一步 {}，已忽略", output.step_index, last);
      continue;
    }
    *last_step = Some(output.step_index);

    let record = chain.process(&output);
    if let Err(e) = sink.emit(&record) {
      shared.fail(PipelineError::SinkWrite(Box::new(e)));
      shared.stop.abort();
      let abandoned = steps.try_iter().count() as u64;
      PipelineStats::add(&shared.stats.steps_abandoned, abandoned);
      return false;
    }
    PipelineStats::inc(&shared.stats.records);
  }
  true
}
