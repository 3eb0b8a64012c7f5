// 该文件是 Yuedong （悦动） 项目的一部分。
// src/labels.rs - 类别标签映射
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

use std::{collections::BTreeMap, path::Path};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LabelMapError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("类别编号 {0} 重复")]
  DuplicateId(usize),
  #[error("类别编号不连续，缺少 {0}")]
  MissingId(usize),
}

pub const JUMPING_JACKS_ARMS_DOWN: &str = "counting - jumping_jacks_position=arms_down";
pub const JUMPING_JACKS_ARMS_UP: &str = "counting - jumping_jacks_position=arms_up";
pub const SQUAT_HIGH: &str = "counting - squat_position=high";
pub const SQUAT_LOW: &str = "counting - squat_position=low";
pub const COUNTING_BACKGROUND: &str = "counting - background";

/// 类别编号到标签名的映射，编号即模型输出向量的下标
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
  labels: Vec<String>,
}

impl LabelMap {
  pub fn new<S: Into<String>>(labels: impl IntoIterator<Item = S>) -> Self {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  /// 从 `{标签: 编号}` 形式的 label2int 映射构造
  pub fn from_label2int(mapping: BTreeMap<String, usize>) -> Result<Self, LabelMapError> {
    let mut by_id = BTreeMap::new();
    for (label, id) in mapping {
      if by_id.insert(id, label).is_some() {
        return Err(LabelMapError::DuplicateId(id));
      }
    }
    let mut labels = Vec::with_capacity(by_id.len());
    for (expected, (id, label)) in by_id.into_iter().enumerate() {
      if id != expected {
        return Err(LabelMapError::MissingId(expected));
      }
      labels.push(label);
    }
    Ok(Self { labels })
  }

  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, LabelMapError> {
    let path = path.as_ref();
    info!("读取标签文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let mapping: BTreeMap<String, usize> = serde_json::from_str(&content)?;
    Self::from_label2int(mapping)
  }

  /// 健身计数分类器的默认标签
  pub fn fitness_rep_counting() -> Self {
    Self::new([
      JUMPING_JACKS_ARMS_DOWN,
      JUMPING_JACKS_ARMS_UP,
      SQUAT_HIGH,
      SQUAT_LOW,
      COUNTING_BACKGROUND,
    ])
  }

  pub fn label(&self, id: usize) -> Option<&str> {
    self.labels.get(id).map(String::as_str)
  }

  pub fn id(&self, label: &str) -> Option<usize> {
    self.labels.iter().position(|l| l == label)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_label2int_is_inverted() {
    let mapping: BTreeMap<String, usize> =
      serde_json::from_str(r#"{"swipe_left": 1, "no_gesture": 0, "swipe_right": 2}"#).unwrap();
    let labels = LabelMap::from_label2int(mapping).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.label(0), Some("no_gesture"));
    assert_eq!(labels.id("swipe_right"), Some(2));
    assert_eq!(labels.label(3), None);
  }

  #[test]
  fn test_label2int_with_gap_is_rejected() {
    let mapping: BTreeMap<String, usize> =
      serde_json::from_str(r#"{"a": 0, "b": 2}"#).unwrap();
    assert!(matches!(
      LabelMap::from_label2int(mapping),
      Err(LabelMapError::MissingId(1))
    ));
  }

  #[test]
  fn test_fitness_defaults() {
    let labels = LabelMap::fitness_rep_counting();
    assert_eq!(labels.len(), 5);
    assert_eq!(labels.id(COUNTING_BACKGROUND), Some(4));
  }
}
