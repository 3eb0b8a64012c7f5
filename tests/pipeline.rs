// 该文件是 Yuedong （悦动） 项目的一部分。
// tests/pipeline.rs - 流水线端到端测试
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
  io,
  sync::{Arc, Mutex},
  thread,
  time::Duration,
};

use thiserror::Error;
use yuedong::{
  config::{DropPolicy, PipelineConfig, WarmUpPolicy},
  error::ErrorKind,
  frame::Frame,
  input::{FrameSource, IterSource},
  model::{Model, ModelStepOutput},
  output::{MemoryOutput, OutputSink},
  pipeline::{Pipeline, PipelineStatus},
  postprocess::{PostProcessor, PostprocessChain, ResultFragment, ResultRecord},
  window::Window,
};

#[derive(Error, Debug)]
#[error("第 {0} 步推理失败")]
struct TagError(u64);

/// 输出窗口内最大和最小的帧索引，可选地模拟慢模型或在某一步失败
#[derive(Default)]
struct TagModel {
  delay: Duration,
  fail_at: Option<u64>,
}

impl Model for TagModel {
  type Input = u64;
  type State = u64;
  type Error = TagError;

  fn initial_state(&self) -> u64 {
    0
  }

  fn forward(&self, window: &Window<u64>, calls: u64) -> Result<(Box<[f32]>, u64), TagError> {
    if !self.delay.is_zero() {
      thread::sleep(self.delay);
    }
    if let Some(step) = window.step_index()
      && Some(step) == self.fail_at
    {
      return Err(TagError(step));
    }
    let max = window.frames.iter().map(|f| *f.image).max().unwrap_or(0);
    let min = window.frames.iter().map(|f| *f.image).min().unwrap_or(0);
    Ok((vec![max as f32, min as f32].into_boxed_slice(), calls + 1))
  }
}

/// 把模型输出的向量记下来
struct VectorTap(Arc<Mutex<Vec<(u64, Box<[f32]>)>>>);

impl PostProcessor for VectorTap {
  fn name(&self) -> &'static str {
    "tap"
  }

  fn process(&mut self, output: &ModelStepOutput) -> ResultFragment {
    self
      .0
      .lock()
      .unwrap()
      .push((output.step_index, output.vector.clone()));
    ResultFragment::Empty
  }

  fn reset(&mut self) {}
}

/// 读到第 `fail_after` 帧时报错
struct FlakySource {
  next: u64,
  fail_after: u64,
}

impl FrameSource for FlakySource {
  type Image = u64;
  type Error = io::Error;

  fn read(&mut self) -> Result<Option<Frame<u64>>, io::Error> {
    if self.next == self.fail_after {
      return Err(io::Error::other("相机断开"));
    }
    let index = self.next;
    self.next += 1;
    Ok(Some(Frame::new(index, index as f64 / 16.0, index)))
  }

  fn native_fps(&self) -> f64 {
    16.0
  }
}

#[derive(Error, Debug)]
#[error("磁盘已满")]
struct DiskFull;

/// 写入若干条后失败
struct FullDisk {
  remaining: usize,
}

impl OutputSink for FullDisk {
  type Error = DiskFull;

  fn emit(&mut self, _record: &ResultRecord) -> Result<(), DiskFull> {
    if self.remaining == 0 {
      return Err(DiskFull);
    }
    self.remaining -= 1;
    Ok(())
  }
}

fn config(stride: usize, context: usize) -> PipelineConfig {
  PipelineConfig {
    stride,
    temporal_context: context,
    queue_capacity: 4,
    drop_policy: None,
    model_fps: 16.0,
    batch_size: 1,
    inference_timeout: Some(Duration::from_secs(10)),
    warm_up: WarmUpPolicy::EdgePad,
    frame_number: None,
  }
}

fn frames(count: u64) -> IterSource<std::ops::Range<u64>> {
  IterSource::new(0..count, 16.0)
}

fn assert_increasing(records: &[ResultRecord]) {
  assert!(
    records.windows(2).all(|w| w[0].step_index < w[1].step_index),
    "步序号不是严格递增"
  );
}

#[test]
fn test_warm_up_never_sees_future_frames() {
  let vectors = Arc::new(Mutex::new(Vec::new()));
  let chain = PostprocessChain::new().with_stage(VectorTap(Arc::clone(&vectors)));
  let output = MemoryOutput::new();

  let report = Pipeline::new(config(4, 45)).run(frames(20), TagModel::default(), chain, output.clone());

  assert_eq!(report.status, PipelineStatus::SourceEnded);
  assert_eq!(report.stats.warm_up_windows, 11);
  let records = output.records();
  assert_eq!(records.len(), 5);
  assert_eq!(records[0].step_index, 0);
  assert_eq!(records[0].frame_index, 0);

  let vectors = vectors.lock().unwrap();
  for (step, vector) in vectors.iter() {
    let right = (*step * 4) as f32;
    assert_eq!(vector[0], right);
    assert_eq!(vector[1], (right - 44.0).max(0.0));
  }
}

#[test]
fn test_single_frame_stream_produces_a_record() {
  for warm_up in [WarmUpPolicy::EdgePad, WarmUpPolicy::Disabled] {
    let output = MemoryOutput::new();
    let report = Pipeline::new(PipelineConfig {
      warm_up,
      ..config(4, 45)
    })
    .run(frames(1), TagModel::default(), PostprocessChain::new(), output.clone());

    assert_eq!(report.status, PipelineStatus::SourceEnded);
    let records = output.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].frame_index, 0);
    assert!(output.is_finished());
  }
}

#[test]
fn test_block_policy_keeps_every_step() {
  let output = MemoryOutput::new();
  let report = Pipeline::new(PipelineConfig {
    drop_policy: Some(DropPolicy::Block),
    queue_capacity: 1,
    batch_size: 4,
    ..config(2, 8)
  })
  .run(
    frames(100),
    TagModel {
      delay: Duration::from_millis(1),
      ..Default::default()
    },
    PostprocessChain::new(),
    output.clone(),
  );

  assert_eq!(report.status, PipelineStatus::SourceEnded);
  assert_eq!(report.stats.dropped, 0);
  assert!(report.stats.is_balanced());
  let records = output.records();
  assert_eq!(records.len(), 50);
  for (step, record) in records.iter().enumerate() {
    assert_eq!(record.step_index, step as u64);
    assert_eq!(record.frame_index, 2 * step as u64);
  }
}

#[test]
fn test_drop_oldest_keeps_up_with_slow_model() {
  let output = MemoryOutput::new();
  let report = Pipeline::new(PipelineConfig {
    drop_policy: Some(DropPolicy::DropOldest),
    queue_capacity: 2,
    ..config(1, 2)
  })
  .run(
    frames(300),
    TagModel {
      delay: Duration::from_millis(2),
      ..Default::default()
    },
    PostprocessChain::new(),
    output.clone(),
  );

  assert_eq!(report.status, PipelineStatus::SourceEnded);
  assert!(report.stats.dropped > 0);
  assert!(report.stats.is_balanced());

  let records = output.records();
  assert!(records.len() < 300);
  assert_eq!(records.len() as u64, report.stats.records);
  assert_increasing(&records);
  // 丢帧后位置不连续，步序号随之跳跃
  assert!(records.windows(2).any(|w| w[1].step_index > w[0].step_index + 1));
  assert_eq!(records.last().unwrap().frame_index, 299);
}

#[test]
fn test_resampling_counts_skipped_frames() {
  let output = MemoryOutput::new();
  let report = Pipeline::new(config(1, 1)).run(
    IterSource::new(0..64u64, 32.0),
    TagModel::default(),
    PostprocessChain::new(),
    output.clone(),
  );

  assert_eq!(report.status, PipelineStatus::SourceEnded);
  assert_eq!(report.stats.captured, 64);
  assert_eq!(report.stats.resampled_out, 32);
  assert!(report.stats.is_balanced());
  let records = output.records();
  assert_eq!(records.len(), 32);
  assert_increasing(&records);
}

#[test]
fn test_frame_limit_completes_session() {
  let output = MemoryOutput::new();
  let report = Pipeline::new(PipelineConfig {
    frame_number: Some(10),
    ..config(1, 1)
  })
  .run(frames(100), TagModel::default(), PostprocessChain::new(), output.clone());

  assert_eq!(report.status, PipelineStatus::Completed);
  assert!(report.is_success());
  assert_eq!(report.stats.captured, 10);
  assert_eq!(output.records().len(), 10);
}

#[test]
fn test_stop_request_drains_queued_frames() {
  let pipeline = Pipeline::new(config(1, 2));
  let stop = pipeline.stop_token();
  thread::spawn(move || {
    thread::sleep(Duration::from_millis(100));
    stop.request_stop();
  });

  let output = MemoryOutput::new();
  let source = IterSource::new(0u64.., 200.0).paced(true);
  let report = pipeline.run(source, TagModel::default(), PostprocessChain::new(), output.clone());

  assert_eq!(report.status, PipelineStatus::Completed);
  assert!(report.stats.captured > 0);
  assert_eq!(report.stats.abandoned, 0);
  assert!(report.stats.is_balanced());
  assert_increasing(&output.records());
  assert!(output.is_finished());
}

#[test]
fn test_abort_mid_run_keeps_counts_balanced() {
  let pipeline = Pipeline::new(PipelineConfig {
    drop_policy: Some(DropPolicy::Block),
    ..config(1, 2)
  });
  let stop = pipeline.stop_token();
  thread::spawn(move || {
    thread::sleep(Duration::from_millis(50));
    stop.abort();
  });

  let output = MemoryOutput::new();
  let report = pipeline.run(
    frames(10_000),
    TagModel {
      delay: Duration::from_millis(2),
      ..Default::default()
    },
    PostprocessChain::new(),
    output.clone(),
  );

  assert_eq!(report.status, PipelineStatus::Completed);
  assert!(report.stats.captured < 10_000);
  assert!(report.stats.is_balanced());
  assert_increasing(&output.records());
}

#[test]
fn test_stuck_model_trips_watchdog() {
  let output = MemoryOutput::new();
  let report = Pipeline::new(PipelineConfig {
    drop_policy: Some(DropPolicy::Block),
    queue_capacity: 2,
    inference_timeout: Some(Duration::from_millis(100)),
    ..config(1, 1)
  })
  .run(
    frames(50),
    TagModel {
      delay: Duration::from_millis(300),
      ..Default::default()
    },
    PostprocessChain::new(),
    output.clone(),
  );

  assert_eq!(report.status, PipelineStatus::Failed(ErrorKind::QueueTimeout));
  assert_eq!(report.error.map(|e| e.kind()), Some(ErrorKind::QueueTimeout));
  assert!(output.is_finished());
}

#[test]
fn test_source_error_finishes_queued_frames() {
  let output = MemoryOutput::new();
  let report = Pipeline::new(config(1, 2)).run(
    FlakySource {
      next: 0,
      fail_after: 3,
    },
    TagModel::default(),
    PostprocessChain::new(),
    output.clone(),
  );

  assert_eq!(report.status, PipelineStatus::Failed(ErrorKind::SourceReadError));
  assert!(!report.is_success());
  let steps: Vec<_> = output.records().iter().map(|r| r.step_index).collect();
  assert_eq!(steps, vec![0, 1, 2]);
}

#[test]
fn test_model_error_stops_session() {
  let output = MemoryOutput::new();
  let report = Pipeline::new(config(1, 2)).run(
    frames(100),
    TagModel {
      fail_at: Some(5),
      ..Default::default()
    },
    PostprocessChain::new(),
    output.clone(),
  );

  assert_eq!(report.status, PipelineStatus::Failed(ErrorKind::ModelExecutionError));
  assert!(report.stats.is_balanced());
  let records = output.records();
  assert!(records.len() <= 5);
  assert!(records.iter().all(|r| r.step_index < 5));
}

#[test]
fn test_sink_error_stops_session() {
  let report = Pipeline::new(config(1, 2)).run(
    frames(100),
    TagModel::default(),
    PostprocessChain::new(),
    FullDisk { remaining: 3 },
  );

  assert_eq!(report.status, PipelineStatus::Failed(ErrorKind::SinkWriteError));
  assert_eq!(report.stats.records, 3);
  assert!(report.stats.is_balanced());
}

#[test]
fn test_invalid_config_fails_before_start() {
  let report = Pipeline::new(config(8, 4)).run(
    frames(10),
    TagModel::default(),
    PostprocessChain::new(),
    MemoryOutput::new(),
  );

  assert_eq!(report.status, PipelineStatus::Failed(ErrorKind::ConfigurationError));
  assert_eq!(report.stats.captured, 0);
}
