// 该文件是 Yuedong （悦动） 项目的一部分。
// src/postprocess.rs - 后处理链
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
  config::{PostprocessConfig, PostprocessKind},
  labels::LabelMap,
  model::{ClassificationResult, ModelStepOutput},
};

pub mod calorie;
pub mod classification;
pub mod rep_counter;

pub use self::calorie::{
  Accumulator, AccumulatorState, CaloriePostprocessor, CorrectedMetConverter, MetConverter,
  Smoothing,
};
pub use self::classification::{ClassificationPostprocessor, LabelSmoother};
pub use self::rep_counter::{
  ExerciseSpec, RepCountPostprocessor, RepCountState, RepCounter, RepPhase,
};

/// 有状态的后处理器
///
/// 每一步模型输出恰好调用一次 `process`，调用顺序即步序。
pub trait PostProcessor {
  fn name(&self) -> &'static str;
  fn process(&mut self, output: &ModelStepOutput) -> ResultFragment;
  /// 开始新的会话
  fn reset(&mut self);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationFragment {
  pub label: String,
  pub probability: f32,
  /// 按概率从高到低排列
  pub top_k: Vec<ClassificationResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyFragment {
  /// 平滑后的 MET 值
  pub met: f64,
  pub kcal_per_hour: f64,
  pub total_kcal: f64,
}

/// 单个后处理器对一步输出的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ResultFragment {
  Classification(ClassificationFragment),
  /// 动作名到累计次数
  RepCounts(BTreeMap<String, u32>),
  Energy(EnergyFragment),
  Empty,
}

/// 每一步输出一条的结果记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
  pub frame_index: u64,
  pub step_index: u64,
  pub timestamp: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub classification: Option<ClassificationFragment>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub rep_counts: BTreeMap<String, u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub energy: Option<EnergyFragment>,
}

impl ResultRecord {
  pub fn new(output: &ModelStepOutput) -> Self {
    Self {
      frame_index: output.frame_index,
      step_index: output.step_index,
      timestamp: output.timestamp,
      classification: None,
      rep_counts: BTreeMap::new(),
      energy: None,
    }
  }

  pub fn merge(&mut self, fragment: ResultFragment) {
    match fragment {
      ResultFragment::Classification(classification) => self.classification = Some(classification),
      ResultFragment::RepCounts(counts) => self.rep_counts.extend(counts),
      ResultFragment::Energy(energy) => self.energy = Some(energy),
      ResultFragment::Empty => {}
    }
  }
}

/// 按顺序执行的一组后处理器，把各自的片段合成一条记录
#[derive(Default)]
pub struct PostprocessChain {
  stages: Vec<Box<dyn PostProcessor + Send>>,
}

impl PostprocessChain {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_stage<P: PostProcessor + Send + 'static>(mut self, stage: P) -> Self {
    self.stages.push(Box::new(stage));
    self
  }

  pub fn push(&mut self, stage: Box<dyn PostProcessor + Send>) {
    self.stages.push(stage);
  }

  pub fn from_config(config: &PostprocessConfig, labels: LabelMap) -> Self {
    let mut chain = Self::new();
    for kind in &config.kinds {
      match kind {
        PostprocessKind::Classification => chain.push(Box::new(ClassificationPostprocessor::new(
          labels.clone(),
          LabelSmoother::new(config.smoothing_window, config.smoothing_mode),
          config.top_k,
        ))),
        PostprocessKind::RepCount => chain.push(Box::new(RepCountPostprocessor::new(
          labels.clone(),
          LabelSmoother::new(config.smoothing_window, config.smoothing_mode),
          config.label_threshold,
          config.debounce_frames,
          &config.exercises,
        ))),
        PostprocessKind::Calories => chain.push(Box::new(CaloriePostprocessor::new(
          Smoothing::Window(config.calorie_smoothing),
          CorrectedMetConverter::new(config.subject),
        ))),
      }
    }
    info!("后处理链: {:?}", chain.names());
    chain
  }

  pub fn names(&self) -> Vec<&'static str> {
    self.stages.iter().map(|stage| stage.name()).collect()
  }

  pub fn len(&self) -> usize {
    self.stages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.stages.is_empty()
  }

  pub fn process(&mut self, output: &ModelStepOutput) -> ResultRecord {
    let mut record = ResultRecord::new(output);
    for stage in &mut self.stages {
      let fragment = stage.process(output);
      debug!("第 {} 步 [{}]: {:?}", output.step_index, stage.name(), fragment);
      record.merge(fragment);
    }
    record
  }

  pub fn reset(&mut self) {
    for stage in &mut self.stages {
      stage.reset();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::SessionConfig;

  fn output(step_index: u64, vector: Vec<f32>) -> ModelStepOutput {
    ModelStepOutput {
      step_index,
      frame_index: step_index * 4,
      timestamp: step_index as f64 * 0.25,
      vector: vector.into_boxed_slice(),
    }
  }

  #[test]
  fn test_chain_composes_one_record_per_step() {
    let config = SessionConfig {
      postprocessors: vec![
        PostprocessKind::Classification,
        PostprocessKind::RepCount,
        PostprocessKind::Calories,
      ],
      ..Default::default()
    };
    let (_, postprocess) = config.validate().unwrap();
    let mut chain = PostprocessChain::from_config(&postprocess, LabelMap::fitness_rep_counting());
    assert_eq!(chain.names(), vec!["classification", "rep-count", "calories"]);

    let record = chain.process(&output(2, vec![0.1, 0.7, 0.1, 0.05, 0.05]));
    assert_eq!(record.step_index, 2);
    assert_eq!(record.frame_index, 8);
    let classification = record.classification.unwrap();
    assert_eq!(classification.label, crate::labels::JUMPING_JACKS_ARMS_UP);
    assert_eq!(record.rep_counts.get("jumping_jacks"), Some(&0));
    assert_eq!(record.rep_counts.get("squats"), Some(&0));
    assert!(record.energy.is_some());
  }

  #[test]
  fn test_record_serializes_without_absent_fragments() {
    let record = ResultRecord::new(&output(0, vec![1.0]));
    let json = serde_json::to_string(&record).unwrap();
    assert_eq!(json, r#"{"frame_index":0,"step_index":0,"timestamp":0.0}"#);
    let back: ResultRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
  }
}
