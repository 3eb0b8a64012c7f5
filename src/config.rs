// 该文件是 Yuedong （悦动） 项目的一部分。
// src/config.rs - 会话配置
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

use std::{path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::postprocess::rep_counter::ExerciseSpec;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("配置项 `{field}` 无效: {reason}")]
  InvalidValue { field: &'static str, reason: String },
  #[error("无法识别的取值 `{value}`, 可选: {expected}")]
  UnknownVariant {
    value: String,
    expected: &'static str,
  },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

impl ConfigError {
  fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
    ConfigError::InvalidValue {
      field,
      reason: reason.into(),
    }
  }
}

/// 队列满时的背压策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropPolicy {
  /// 阻塞上游，保证不丢帧（文件回放）
  Block,
  /// 丢弃最早的未处理帧，保证实时性（摄像头）
  DropOldest,
}

impl FromStr for DropPolicy {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "block" => Ok(DropPolicy::Block),
      "drop-oldest" => Ok(DropPolicy::DropOldest),
      _ => Err(ConfigError::UnknownVariant {
        value: s.to_string(),
        expected: "block, drop-oldest",
      }),
    }
  }
}

/// 会话开始时的预热方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarmUpPolicy {
  /// 用第一帧重复填充，第一帧真实图像即输出第 0 步
  #[default]
  EdgePad,
  /// 不填充，攒够时间上下文后才输出
  Disabled,
}

/// 分类平滑方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmoothingMode {
  /// 概率平均后取最大
  #[default]
  Average,
  /// 窗口内多数投票
  Majority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sex {
  Male,
  Female,
  #[default]
  Other,
}

impl FromStr for Sex {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "male" => Ok(Sex::Male),
      "female" => Ok(Sex::Female),
      "other" => Ok(Sex::Other),
      _ => Err(ConfigError::UnknownVariant {
        value: s.to_string(),
        expected: "male, female, other",
      }),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostprocessKind {
  Classification,
  RepCount,
  Calories,
}

impl FromStr for PostprocessKind {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "classification" => Ok(PostprocessKind::Classification),
      "rep-count" => Ok(PostprocessKind::RepCount),
      "calories" => Ok(PostprocessKind::Calories),
      _ => Err(ConfigError::UnknownVariant {
        value: s.to_string(),
        expected: "classification, rep-count, calories",
      }),
    }
  }
}

/// 受试者的身体参数，用于 MET 到千卡的换算
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubjectProfile {
  pub mass_kg: f64,
  pub height_cm: f64,
  pub age_years: f64,
  pub sex: Sex,
}

impl Default for SubjectProfile {
  fn default() -> Self {
    Self {
      mass_kg: 70.0,
      height_cm: 170.0,
      age_years: 30.0,
      sex: Sex::Other,
    }
  }
}

/// 会话配置，可从 JSON 文件读取，未给出的字段取默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  pub stride: usize,
  pub temporal_context: usize,
  pub queue_capacity: usize,
  /// 未指定时按输入源类型选择：实时源丢旧帧，文件源阻塞
  pub drop_policy: Option<DropPolicy>,
  pub model_fps: f64,
  pub batch_size: usize,
  pub inference_timeout_ms: Option<u64>,
  pub warm_up: WarmUpPolicy,
  pub frame_number: Option<u64>,

  pub postprocessors: Vec<PostprocessKind>,
  pub debounce_frames: u32,
  pub smoothing_window: usize,
  pub smoothing_mode: SmoothingMode,
  pub label_threshold: f32,
  pub top_k: usize,
  pub calorie_smoothing: usize,
  pub exercises: Vec<ExerciseSpec>,

  pub subject_mass_kg: f64,
  pub subject_height_cm: f64,
  pub subject_age_years: f64,
  pub subject_sex: Sex,
}

impl Default for SessionConfig {
  fn default() -> Self {
    let subject = SubjectProfile::default();
    Self {
      stride: 4,
      temporal_context: 45,
      queue_capacity: 16,
      drop_policy: None,
      model_fps: 16.0,
      batch_size: 1,
      inference_timeout_ms: Some(10_000),
      warm_up: WarmUpPolicy::EdgePad,
      frame_number: None,
      postprocessors: vec![PostprocessKind::Classification],
      debounce_frames: 2,
      smoothing_window: 4,
      smoothing_mode: SmoothingMode::Average,
      label_threshold: 0.4,
      top_k: 3,
      calorie_smoothing: 12,
      exercises: ExerciseSpec::fitness_defaults(),
      subject_mass_kg: subject.mass_kg,
      subject_height_cm: subject.height_cm,
      subject_age_years: subject.age_years,
      subject_sex: subject.sex,
    }
  }
}

/// 调度器使用的不可变配置
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub stride: usize,
  pub temporal_context: usize,
  pub queue_capacity: usize,
  pub drop_policy: Option<DropPolicy>,
  pub model_fps: f64,
  pub batch_size: usize,
  pub inference_timeout: Option<Duration>,
  pub warm_up: WarmUpPolicy,
  pub frame_number: Option<u64>,
}

impl PipelineConfig {
  /// 实际生效的背压策略
  pub fn effective_drop_policy(&self, live: bool) -> DropPolicy {
    match self.drop_policy {
      Some(policy) => policy,
      None if live => DropPolicy::DropOldest,
      None => DropPolicy::Block,
    }
  }

  /// 校验调度器参数
  pub fn check(&self) -> Result<(), ConfigError> {
    if self.stride == 0 {
      return Err(ConfigError::invalid("stride", "步长必须为正整数"));
    }
    if self.temporal_context == 0 {
      return Err(ConfigError::invalid("temporal_context", "时间上下文必须为正整数"));
    }
    if self.stride > self.temporal_context {
      return Err(ConfigError::invalid(
        "stride",
        format!(
          "步长 {} 大于时间上下文 {}，部分帧永远不会进入模型",
          self.stride, self.temporal_context
        ),
      ));
    }
    if self.queue_capacity == 0 {
      return Err(ConfigError::invalid("queue_capacity", "队列容量必须为正整数"));
    }
    if self.batch_size == 0 {
      return Err(ConfigError::invalid("batch_size", "批大小必须为正整数"));
    }
    if !(self.model_fps.is_finite() && self.model_fps > 0.0) {
      return Err(ConfigError::invalid("model_fps", "模型帧率必须为正数"));
    }
    if self.inference_timeout == Some(Duration::ZERO) {
      return Err(ConfigError::invalid("inference_timeout_ms", "超时时间必须大于 0"));
    }
    Ok(())
  }
}

/// 后处理链使用的不可变配置
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
  pub kinds: Vec<PostprocessKind>,
  pub debounce_frames: u32,
  pub smoothing_window: usize,
  pub smoothing_mode: SmoothingMode,
  pub label_threshold: f32,
  pub top_k: usize,
  pub calorie_smoothing: usize,
  pub exercises: Vec<ExerciseSpec>,
  pub subject: SubjectProfile,
}

impl SessionConfig {
  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("读取配置文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let config = serde_json::from_str(&content)?;
    debug!("配置内容: {:?}", config);
    Ok(config)
  }

  /// 校验配置组合，任何阶段启动前调用
  pub fn validate(&self) -> Result<(PipelineConfig, PostprocessConfig), ConfigError> {
    if self.debounce_frames == 0 {
      return Err(ConfigError::invalid("debounce_frames", "去抖长度至少为 1"));
    }
    if self.smoothing_window == 0 {
      return Err(ConfigError::invalid("smoothing_window", "平滑窗口至少为 1"));
    }
    if self.calorie_smoothing == 0 {
      return Err(ConfigError::invalid("calorie_smoothing", "平滑窗口至少为 1"));
    }
    if !(0.0..=1.0).contains(&self.label_threshold) {
      return Err(ConfigError::invalid("label_threshold", "阈值必须位于 [0, 1]"));
    }
    if self.top_k == 0 {
      return Err(ConfigError::invalid("top_k", "top_k 至少为 1"));
    }
    if !(self.subject_mass_kg.is_finite() && self.subject_mass_kg > 0.0) {
      return Err(ConfigError::invalid("subject_mass_kg", "体重必须为正数"));
    }
    if !(self.subject_height_cm.is_finite() && self.subject_height_cm > 0.0) {
      return Err(ConfigError::invalid("subject_height_cm", "身高必须为正数"));
    }
    if !(self.subject_age_years.is_finite() && self.subject_age_years >= 0.0) {
      return Err(ConfigError::invalid("subject_age_years", "年龄不能为负数"));
    }
    if self.postprocessors.contains(&PostprocessKind::RepCount) && self.exercises.is_empty() {
      return Err(ConfigError::invalid("exercises", "计数任务至少需要一个动作"));
    }

    let pipeline = PipelineConfig {
      stride: self.stride,
      temporal_context: self.temporal_context,
      queue_capacity: self.queue_capacity,
      drop_policy: self.drop_policy,
      model_fps: self.model_fps,
      batch_size: self.batch_size,
      inference_timeout: self.inference_timeout_ms.map(Duration::from_millis),
      warm_up: self.warm_up,
      frame_number: self.frame_number,
    };
    pipeline.check()?;

    let postprocess = PostprocessConfig {
      kinds: self.postprocessors.clone(),
      debounce_frames: self.debounce_frames,
      smoothing_window: self.smoothing_window,
      smoothing_mode: self.smoothing_mode,
      label_threshold: self.label_threshold,
      top_k: self.top_k,
      calorie_smoothing: self.calorie_smoothing,
      exercises: self.exercises.clone(),
      subject: SubjectProfile {
        mass_kg: self.subject_mass_kg,
        height_cm: self.subject_height_cm,
        age_years: self.subject_age_years,
        sex: self.subject_sex,
      },
    };

    Ok((pipeline, postprocess))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config_is_valid() {
    let (pipeline, postprocess) = SessionConfig::default().validate().unwrap();
    assert_eq!(pipeline.stride, 4);
    assert_eq!(pipeline.temporal_context, 45);
    assert_eq!(pipeline.inference_timeout, Some(Duration::from_secs(10)));
    assert_eq!(postprocess.subject, SubjectProfile::default());
  }

  #[test]
  fn test_stride_larger_than_context_is_rejected() {
    let config = SessionConfig {
      stride: 8,
      temporal_context: 4,
      ..Default::default()
    };
    match config.validate() {
      Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, "stride"),
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[test]
  fn test_zero_sizes_are_rejected() {
    for config in [
      SessionConfig {
        queue_capacity: 0,
        ..Default::default()
      },
      SessionConfig {
        stride: 0,
        ..Default::default()
      },
      SessionConfig {
        smoothing_window: 0,
        ..Default::default()
      },
      SessionConfig {
        debounce_frames: 0,
        ..Default::default()
      },
    ] {
      assert!(config.validate().is_err());
    }
  }

  #[test]
  fn test_partial_json_uses_defaults() {
    let json = r#"{ "stride": 2, "drop_policy": "drop-oldest", "subject_sex": "female",
                    "postprocessors": ["rep-count", "calories"] }"#;
    let config: SessionConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.stride, 2);
    assert_eq!(config.temporal_context, 45);
    assert_eq!(config.drop_policy, Some(DropPolicy::DropOldest));
    assert_eq!(config.subject_sex, Sex::Female);
    assert_eq!(
      config.postprocessors,
      vec![PostprocessKind::RepCount, PostprocessKind::Calories]
    );
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_drop_policy_follows_source_kind() {
    let (pipeline, _) = SessionConfig::default().validate().unwrap();
    assert_eq!(pipeline.effective_drop_policy(true), DropPolicy::DropOldest);
    assert_eq!(pipeline.effective_drop_policy(false), DropPolicy::Block);

    let (pipeline, _) = SessionConfig {
      drop_policy: Some(DropPolicy::Block),
      ..Default::default()
    }
    .validate()
    .unwrap();
    assert_eq!(pipeline.effective_drop_policy(true), DropPolicy::Block);
  }

  #[test]
  fn test_parse_enums_from_str() {
    assert_eq!("drop-oldest".parse::<DropPolicy>().unwrap(), DropPolicy::DropOldest);
    assert_eq!("MALE".parse::<Sex>().unwrap(), Sex::Male);
    assert!("sideways".parse::<DropPolicy>().is_err());
  }
}
