// 该文件是 Yuedong （悦动） 项目的一部分。
// src/postprocess/rep_counter.rs - 动作计数状态机
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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
  labels::{
    COUNTING_BACKGROUND, JUMPING_JACKS_ARMS_DOWN, JUMPING_JACKS_ARMS_UP, LabelMap, SQUAT_HIGH,
    SQUAT_LOW,
  },
  model::ModelStepOutput,
  postprocess::{LabelSmoother, PostProcessor, ResultFragment},
};

/// 一个可计数的动作：在两个姿态之间往返一次计一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseSpec {
  pub name: String,
  /// 起始姿态
  pub position_1: String,
  /// 峰值姿态
  pub position_2: String,
  /// 出现即把计数器复位的标签
  #[serde(default)]
  pub background: Vec<String>,
}

impl ExerciseSpec {
  pub fn new(name: &str, position_1: &str, position_2: &str) -> Self {
    Self {
      name: name.to_string(),
      position_1: position_1.to_string(),
      position_2: position_2.to_string(),
      background: Vec::new(),
    }
  }

  pub fn with_background(mut self, label: &str) -> Self {
    self.background.push(label.to_string());
    self
  }

  /// 开合跳和深蹲
  pub fn fitness_defaults() -> Vec<Self> {
    vec![
      Self::new("jumping_jacks", JUMPING_JACKS_ARMS_DOWN, JUMPING_JACKS_ARMS_UP)
        .with_background(COUNTING_BACKGROUND),
      Self::new("squats", SQUAT_HIGH, SQUAT_LOW).with_background(COUNTING_BACKGROUND),
    ]
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepPhase {
  /// 空闲，尚未进入起始姿态
  #[default]
  NotStarted,
  Position1,
  Position2,
  /// 因背景标签复位后的空闲
  Background,
}

impl RepPhase {
  pub fn is_idle(&self) -> bool {
    matches!(self, RepPhase::NotStarted | RepPhase::Background)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepCountState {
  pub current_label: Option<String>,
  pub count: u32,
  pub position_in_rep: RepPhase,
}

/// 单个动作的计数状态机
///
/// 标签必须连续出现至少 `debounce` 步才会触发状态转移。完成一次
/// 起始姿态、峰值姿态、离开峰值姿态的往返后计数加一，计数只增不减。
pub struct RepCounter {
  exercise: ExerciseSpec,
  debounce: u32,
  state: RepCountState,
  run_length: u32,
}

impl RepCounter {
  pub fn new(exercise: ExerciseSpec, debounce: u32) -> Self {
    Self {
      exercise,
      debounce: debounce.max(1),
      state: RepCountState::default(),
      run_length: 0,
    }
  }

  pub fn name(&self) -> &str {
    &self.exercise.name
  }

  pub fn state(&self) -> &RepCountState {
    &self.state
  }

  pub fn count(&self) -> u32 {
    self.state.count
  }

  /// 输入一步平滑后的标签，`None` 表示没有可信的检测。计数增加时返回 `true`
  pub fn update(&mut self, label: Option<&str>) -> bool {
    if self.state.current_label.as_deref() == label {
      self.run_length = self.run_length.saturating_add(1);
    } else {
      self.state.current_label = label.map(str::to_string);
      self.run_length = 1;
    }
    let sustained = self.run_length >= self.debounce;

    if let Some(label) = label
      && self.exercise.background.iter().any(|b| b == label)
    {
      if self.state.position_in_rep != RepPhase::Background {
        debug!("[{}] 背景标签，复位", self.exercise.name);
      }
      self.state.position_in_rep = RepPhase::Background;
      return false;
    }

    let is_position_1 = label == Some(self.exercise.position_1.as_str());
    let is_position_2 = label == Some(self.exercise.position_2.as_str());

    // 离开峰值姿态需要一个可信的其他标签
    let mut incremented = false;
    if self.state.position_in_rep == RepPhase::Position2
      && label.is_some()
      && !is_position_2
      && sustained
    {
      self.state.count += 1;
      self.state.position_in_rep = RepPhase::NotStarted;
      incremented = true;
    }
    match self.state.position_in_rep {
      phase if phase.is_idle() && is_position_1 && sustained => {
        self.state.position_in_rep = RepPhase::Position1;
      }
      RepPhase::Position1 if is_position_2 && sustained => {
        self.state.position_in_rep = RepPhase::Position2;
      }
      _ => {}
    }
    incremented
  }

  pub fn reset(&mut self) {
    self.state = RepCountState::default();
    self.run_length = 0;
  }
}

/// 对同一条平滑后的标签流运行多个动作计数器
pub struct RepCountPostprocessor {
  labels: LabelMap,
  smoother: LabelSmoother,
  threshold: f32,
  counters: Vec<RepCounter>,
}

impl RepCountPostprocessor {
  pub fn new(
    labels: LabelMap,
    smoother: LabelSmoother,
    threshold: f32,
    debounce: u32,
    exercises: &[ExerciseSpec],
  ) -> Self {
    Self {
      labels,
      smoother,
      threshold,
      counters: exercises
        .iter()
        .map(|exercise| RepCounter::new(exercise.clone(), debounce))
        .collect(),
    }
  }

  pub fn counters(&self) -> &[RepCounter] {
    &self.counters
  }
}

impl PostProcessor for RepCountPostprocessor {
  fn name(&self) -> &'static str {
    "rep-count"
  }

  fn process(&mut self, output: &ModelStepOutput) -> ResultFragment {
    self.smoother.push(&output.vector);
    let label = self
      .smoother
      .top()
      .filter(|(_, probability)| *probability >= self.threshold)
      .and_then(|(id, _)| self.labels.label(id));

    let mut counts = BTreeMap::new();
    for counter in &mut self.counters {
      if counter.update(label) {
        info!(
          "[{}] 第 {} 次，步 {}",
          counter.name(),
          counter.count(),
          output.step_index
        );
      }
      counts.insert(counter.name().to_string(), counter.count());
    }
    ResultFragment::RepCounts(counts)
  }

  fn reset(&mut self) {
    self.smoother.reset();
    self.counters.iter_mut().for_each(RepCounter::reset);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::SmoothingMode;

  const DEBOUNCE: u32 = 3;

  fn counter() -> RepCounter {
    RepCounter::new(
      ExerciseSpec::new("squats", "high", "low").with_background("background"),
      DEBOUNCE,
    )
  }

  fn feed(counter: &mut RepCounter, label: Option<&str>, times: u32) -> u32 {
    (0..times).filter(|_| counter.update(label)).count() as u32
  }

  #[test]
  fn test_full_rep_increments_exactly_once() {
    let mut counter = counter();
    let mut increments = 0;
    increments += feed(&mut counter, Some("idle"), 5);
    increments += feed(&mut counter, Some("high"), DEBOUNCE + 1);
    assert_eq!(counter.state().position_in_rep, RepPhase::Position1);
    increments += feed(&mut counter, Some("low"), DEBOUNCE + 1);
    assert_eq!(counter.state().position_in_rep, RepPhase::Position2);
    increments += feed(&mut counter, Some("idle"), 5);

    assert_eq!(increments, 1);
    assert_eq!(counter.count(), 1);
    assert!(counter.state().position_in_rep.is_idle());
  }

  #[test]
  fn test_short_position_run_never_counts() {
    let mut counter = counter();
    feed(&mut counter, Some("idle"), 5);
    feed(&mut counter, Some("high"), DEBOUNCE - 1);
    feed(&mut counter, Some("low"), DEBOUNCE + 1);
    feed(&mut counter, Some("idle"), 5);
    assert_eq!(counter.count(), 0);
    assert_eq!(counter.state().position_in_rep, RepPhase::NotStarted);
  }

  #[test]
  fn test_return_to_position_one_counts_and_rearms() {
    let mut counter = counter();
    for _ in 0..3 {
      feed(&mut counter, Some("high"), DEBOUNCE);
      feed(&mut counter, Some("low"), DEBOUNCE);
    }
    feed(&mut counter, Some("high"), DEBOUNCE);
    assert_eq!(counter.count(), 3);
    assert_eq!(counter.state().position_in_rep, RepPhase::Position1);
  }

  #[test]
  fn test_background_resets_without_counting() {
    let mut counter = counter();
    feed(&mut counter, Some("high"), DEBOUNCE);
    feed(&mut counter, Some("low"), DEBOUNCE);
    feed(&mut counter, Some("background"), 1);
    assert_eq!(counter.state().position_in_rep, RepPhase::Background);
    feed(&mut counter, None, 10);
    assert_eq!(counter.count(), 0);

    feed(&mut counter, Some("high"), DEBOUNCE);
    assert_eq!(counter.state().position_in_rep, RepPhase::Position1);
  }

  #[test]
  fn test_low_confidence_is_not_a_detection() {
    let labels = LabelMap::new(["high", "low", "other"]);
    let exercises = [ExerciseSpec::new("squats", "high", "low")];
    let mut processor = RepCountPostprocessor::new(
      labels,
      LabelSmoother::new(1, SmoothingMode::Average),
      0.5,
      1,
      &exercises,
    );
    let step = |vector: &[f32]| ModelStepOutput {
      step_index: 0,
      frame_index: 0,
      timestamp: 0.0,
      vector: vector.into(),
    };

    processor.process(&step(&[0.9, 0.05, 0.05]));
    processor.process(&step(&[0.05, 0.9, 0.05]));
    // 低于阈值：不算离开峰值姿态
    processor.process(&step(&[0.4, 0.3, 0.3]));
    assert_eq!(processor.counters()[0].count(), 0);

    let fragment = processor.process(&step(&[0.9, 0.05, 0.05]));
    let ResultFragment::RepCounts(counts) = fragment else {
      panic!("expected rep counts");
    };
    assert_eq!(counts.get("squats"), Some(&1));
  }
}
