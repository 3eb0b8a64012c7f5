// 该文件是 Yuedong （悦动） 项目的一部分。
// src/postprocess/classification.rs - 标签平滑与分类结果
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

use std::{cmp::Ordering, collections::VecDeque};

use tracing::warn;

use crate::{
  config::SmoothingMode,
  labels::LabelMap,
  model::{ClassificationResult, ModelStepOutput},
  postprocess::{ClassificationFragment, PostProcessor, ResultFragment},
};

fn argmax(values: &[f32]) -> Option<usize> {
  values
    .iter()
    .enumerate()
    .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
      Some((_, b)) if v.partial_cmp(&b) != Some(Ordering::Greater) => best,
      _ => Some((i, v)),
    })
    .map(|(i, _)| i)
}

/// 最近 N 步类别概率的滑动窗口
pub struct LabelSmoother {
  window_size: usize,
  mode: SmoothingMode,
  history: VecDeque<Box<[f32]>>,
}

impl LabelSmoother {
  pub fn new(window_size: usize, mode: SmoothingMode) -> Self {
    let window_size = window_size.max(1);
    Self {
      window_size,
      mode,
      history: VecDeque::with_capacity(window_size),
    }
  }

  pub fn push(&mut self, probabilities: &[f32]) {
    if let Some(front) = self.history.front()
      && front.len() != probabilities.len()
    {
      warn!(
        "类别数从 {} 变为 {}，清空平滑窗口",
        front.len(),
        probabilities.len()
      );
      self.history.clear();
    }
    self.history.push_back(probabilities.into());
    while self.history.len() > self.window_size {
      self.history.pop_front();
    }
  }

  /// 窗口内的平均概率
  pub fn averaged(&self) -> Vec<f32> {
    let Some(dimension) = self.history.front().map(|v| v.len()) else {
      return Vec::new();
    };
    let mut sum = vec![0.0f32; dimension];
    for probabilities in &self.history {
      for (acc, p) in sum.iter_mut().zip(probabilities.iter()) {
        *acc += p;
      }
    }
    let n = self.history.len() as f32;
    sum.iter_mut().for_each(|v| *v /= n);
    sum
  }

  /// 平滑后的类别及其平均概率
  pub fn top(&self) -> Option<(usize, f32)> {
    let averaged = self.averaged();
    let id = match self.mode {
      SmoothingMode::Average => argmax(&averaged)?,
      SmoothingMode::Majority => {
        let mut votes = vec![0usize; averaged.len()];
        for probabilities in &self.history {
          if let Some(id) = argmax(probabilities) {
            votes[id] += 1;
          }
        }
        // 票数相同时取平均概率较高者
        (0..votes.len()).fold(None, |best: Option<usize>, id| match best {
          Some(b)
            if votes[b] > votes[id] || (votes[b] == votes[id] && averaged[b] >= averaged[id]) =>
          {
            Some(b)
          }
          _ => Some(id),
        })?
      }
    };
    Some((id, averaged[id]))
  }

  pub fn history_size(&self) -> usize {
    self.history.len()
  }

  pub fn reset(&mut self) {
    self.history.clear();
  }
}

/// 输出平滑后的类别和前 k 个候选
pub struct ClassificationPostprocessor {
  labels: LabelMap,
  smoother: LabelSmoother,
  top_k: usize,
}

impl ClassificationPostprocessor {
  pub fn new(labels: LabelMap, smoother: LabelSmoother, top_k: usize) -> Self {
    Self {
      labels,
      smoother,
      top_k,
    }
  }

  fn label_name(&self, id: usize) -> String {
    self
      .labels
      .label(id)
      .map(str::to_string)
      .unwrap_or_else(|| format!("#{}", id))
  }
}

impl PostProcessor for ClassificationPostprocessor {
  fn name(&self) -> &'static str {
    "classification"
  }

  fn process(&mut self, output: &ModelStepOutput) -> ResultFragment {
    self.smoother.push(&output.vector);
    let Some((id, probability)) = self.smoother.top() else {
      return ResultFragment::Empty;
    };

    let mut ranked: Vec<(usize, f32)> = self.smoother.averaged().into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    let top_k = ranked
      .into_iter()
      .take(self.top_k)
      .map(|(id, probability)| ClassificationResult {
        label: self.label_name(id),
        probability,
      })
      .collect();

    ResultFragment::Classification(ClassificationFragment {
      label: self.label_name(id),
      probability,
      top_k,
    })
  }

  fn reset(&mut self) {
    self.smoother.reset();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn output(vector: &[f32]) -> ModelStepOutput {
    ModelStepOutput {
      step_index: 0,
      frame_index: 0,
      timestamp: 0.0,
      vector: vector.into(),
    }
  }

  #[test]
  fn test_average_over_latest_window() {
    let mut smoother = LabelSmoother::new(2, SmoothingMode::Average);
    smoother.push(&[0.9, 0.1]);
    smoother.push(&[0.2, 0.8]);
    smoother.push(&[0.3, 0.7]);
    assert_eq!(smoother.history_size(), 2);

    let (id, probability) = smoother.top().unwrap();
    assert_eq!(id, 1);
    assert!((probability - 0.75).abs() < 1e-6);
  }

  #[test]
  fn test_majority_differs_from_average() {
    let steps: [&[f32]; 3] = [&[0.9, 0.1], &[0.4, 0.6], &[0.45, 0.55]];

    let mut average = LabelSmoother::new(3, SmoothingMode::Average);
    let mut majority = LabelSmoother::new(3, SmoothingMode::Majority);
    for step in steps {
      average.push(step);
      majority.push(step);
    }

    assert_eq!(average.top().map(|(id, _)| id), Some(0));
    let (id, probability) = majority.top().unwrap();
    assert_eq!(id, 1);
    assert!((probability - 1.25 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn test_dimension_change_clears_history() {
    let mut smoother = LabelSmoother::new(4, SmoothingMode::Average);
    smoother.push(&[0.5, 0.5]);
    smoother.push(&[0.1, 0.2, 0.7]);
    assert_eq!(smoother.history_size(), 1);
    assert_eq!(smoother.top().map(|(id, _)| id), Some(2));
  }

  #[test]
  fn test_fragment_reports_sorted_top_k() {
    let labels = LabelMap::new(["a", "b", "c"]);
    let mut classifier =
      ClassificationPostprocessor::new(labels, LabelSmoother::new(1, SmoothingMode::Average), 2);
    let ResultFragment::Classification(fragment) = classifier.process(&output(&[0.2, 0.5, 0.3]))
    else {
      panic!("expected a classification fragment");
    };
    assert_eq!(fragment.label, "b");
    let names: Vec<_> = fragment.top_k.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(names, vec!["b", "c"]);

    assert_eq!(classifier.process(&output(&[])), ResultFragment::Empty);
  }
}
