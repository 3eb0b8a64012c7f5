// 该文件是 Yuedong （悦动） 项目的一部分。
// src/postprocess/calorie.rs - 数值累计与热量估算
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

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{trace, warn};

use crate::{
  config::{Sex, SubjectProfile},
  model::ModelStepOutput,
  postprocess::{EnergyFragment, PostProcessor, ResultFragment},
};

// 静息耗氧量 ml/kg/min
const RESTING_VO2: f64 = 3.5;
const MINUTES_PER_DAY: f64 = 1440.0;
// 每升氧气约 5 千卡
const KCAL_PER_LITRE_O2: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
  /// 最近 n 个样本的平均
  Window(usize),
  /// 指数滑动平均，参数为新样本的权重
  Exponential(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AccumulatorState {
  pub smoothed_value: f64,
  pub running_total: f64,
  pub sample_count: u64,
}

/// 对速率做平滑并按时间积分
///
/// 负值按 0 处理，时间戳不递增的样本只参与平滑不参与积分，
/// 因此累计值单调不减。
pub struct Accumulator {
  smoothing: Smoothing,
  recent: VecDeque<f64>,
  state: AccumulatorState,
  last_timestamp: Option<f64>,
}

impl Accumulator {
  pub fn new(smoothing: Smoothing) -> Self {
    Self {
      smoothing,
      recent: VecDeque::new(),
      state: AccumulatorState::default(),
      last_timestamp: None,
    }
  }

  pub fn state(&self) -> &AccumulatorState {
    &self.state
  }

  /// 输入时间戳（秒）处的一个速率样本（每秒）
  pub fn update(&mut self, value: f64, timestamp: f64) -> AccumulatorState {
    let value = if value.is_finite() { value.max(0.0) } else { 0.0 };

    let smoothed = match self.smoothing {
      Smoothing::Window(n) => {
        self.recent.push_back(value);
        while self.recent.len() > n.max(1) {
          self.recent.pop_front();
        }
        self.recent.iter().sum::<f64>() / self.recent.len() as f64
      }
      Smoothing::Exponential(alpha) if self.state.sample_count > 0 => {
        alpha * value + (1.0 - alpha) * self.state.smoothed_value
      }
      Smoothing::Exponential(_) => value,
    };
    self.state.smoothed_value = smoothed;

    match self.last_timestamp {
      Some(last) if timestamp > last => {
        self.state.running_total += smoothed * (timestamp - last);
        self.last_timestamp = Some(timestamp);
      }
      Some(last) => warn!("时间戳 {} 不晚于 {}，跳过积分", timestamp, last),
      None => self.last_timestamp = Some(timestamp),
    }
    self.state.sample_count += 1;
    self.state
  }

  pub fn reset(&mut self) {
    self.recent.clear();
    self.state = AccumulatorState::default();
    self.last_timestamp = None;
  }
}

pub trait MetConverter {
  fn kcal_per_hour(&self, met: f64) -> f64;
}

/// 按个人基础代谢修正的 MET 换算
///
/// 基础代谢用 Mifflin-St Jeor 公式估计，以此修正标准的 3.5 ml/kg/min 静息耗氧量。
#[derive(Debug, Clone, Copy)]
pub struct CorrectedMetConverter {
  subject: SubjectProfile,
}

impl CorrectedMetConverter {
  pub fn new(subject: SubjectProfile) -> Self {
    Self { subject }
  }

  /// 基础代谢（千卡/天）
  pub fn basal_metabolic_rate(&self) -> f64 {
    let SubjectProfile {
      mass_kg,
      height_cm,
      age_years,
      sex,
    } = self.subject;
    let sex_offset = match sex {
      Sex::Male => 5.0,
      Sex::Female => -161.0,
      Sex::Other => -78.0,
    };
    10.0 * mass_kg + 6.25 * height_cm - 5.0 * age_years + sex_offset
  }

  fn resting_vo2(&self) -> f64 {
    let bmr = self.basal_metabolic_rate();
    if bmr <= 0.0 {
      return RESTING_VO2;
    }
    bmr / MINUTES_PER_DAY / KCAL_PER_LITRE_O2 / self.subject.mass_kg * 1000.0
  }
}

impl MetConverter for CorrectedMetConverter {
  fn kcal_per_hour(&self, met: f64) -> f64 {
    let corrected = met * RESTING_VO2 / self.resting_vo2();
    let kcal_per_minute = corrected * RESTING_VO2 * self.subject.mass_kg / 200.0;
    kcal_per_minute * 60.0
  }
}

/// 模型输出向量的第一个分量视为当前 MET 值
pub struct CaloriePostprocessor<C = CorrectedMetConverter> {
  met: Accumulator,
  energy: Accumulator,
  converter: C,
}

impl<C: MetConverter> CaloriePostprocessor<C> {
  pub fn new(smoothing: Smoothing, converter: C) -> Self {
    Self {
      met: Accumulator::new(smoothing),
      energy: Accumulator::new(Smoothing::Window(1)),
      converter,
    }
  }
}

impl<C: MetConverter> PostProcessor for CaloriePostprocessor<C> {
  fn name(&self) -> &'static str {
    "calories"
  }

  fn process(&mut self, output: &ModelStepOutput) -> ResultFragment {
    let Some(&raw) = output.vector.first() else {
      return ResultFragment::Empty;
    };
    let met = self.met.update(raw as f64, output.timestamp).smoothed_value;
    let kcal_per_hour = self.converter.kcal_per_hour(met);
    let energy = self.energy.update(kcal_per_hour / 3600.0, output.timestamp);
    trace!("MET {:.2}, {:.1} 千卡/小时", met, kcal_per_hour);

    ResultFragment::Energy(EnergyFragment {
      met,
      kcal_per_hour,
      total_kcal: energy.running_total,
    })
  }

  fn reset(&mut self) {
    self.met.reset();
    self.energy.reset();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_constant_rate_over_one_second() {
    let rate = 2.5;
    let mut accumulator = Accumulator::new(Smoothing::Window(12));
    accumulator.update(rate, 0.0);
    let state = accumulator.update(rate, 1.0);
    assert!((state.running_total - rate * 1.0).abs() < 1e-9);
    assert_eq!(state.sample_count, 2);
  }

  #[test]
  fn test_running_total_never_decreases() {
    let mut accumulator = Accumulator::new(Smoothing::Window(3));
    let samples = [
      (1.0, 0.0),
      (4.0, 0.25),
      (-3.0, 0.5),
      (f64::NAN, 0.75),
      (2.0, 0.75),
      (0.5, 0.6),
      (3.0, 1.5),
    ];
    let mut previous = 0.0;
    for (value, timestamp) in samples {
      let total = accumulator.update(value, timestamp).running_total;
      assert!(total >= previous, "{} < {}", total, previous);
      previous = total;
    }
    assert!(previous > 0.0);
  }

  #[test]
  fn test_exponential_smoothing() {
    let mut accumulator = Accumulator::new(Smoothing::Exponential(0.5));
    assert_eq!(accumulator.update(4.0, 0.0).smoothed_value, 4.0);
    assert_eq!(accumulator.update(0.0, 1.0).smoothed_value, 2.0);
    assert_eq!(accumulator.state().running_total, 2.0);
  }

  #[test]
  fn test_corrected_met_conversion() {
    let converter = CorrectedMetConverter::new(SubjectProfile {
      mass_kg: 70.0,
      height_cm: 180.0,
      age_years: 30.0,
      sex: Sex::Male,
    });
    // 700 + 1125 - 150 + 5
    assert_eq!(converter.basal_metabolic_rate(), 1680.0);
    assert_eq!(converter.kcal_per_hour(0.0), 0.0);

    let light = converter.kcal_per_hour(3.0);
    let heavy = converter.kcal_per_hour(6.0);
    assert!((heavy - 2.0 * light).abs() < 1e-9);
    // 修正后的静息耗氧量约为 3.33 ml/kg/min，与标准值 3.5 相差不大
    let standard = 3.0 * RESTING_VO2 * 70.0 / 200.0 * 60.0;
    assert!((light / standard - 1.05).abs() < 0.01);
  }

  #[test]
  fn test_calorie_fragment() {
    let mut calories = CaloriePostprocessor::new(
      Smoothing::Window(1),
      CorrectedMetConverter::new(SubjectProfile::default()),
    );
    let step = |timestamp: f64| ModelStepOutput {
      step_index: 0,
      frame_index: 0,
      timestamp,
      vector: vec![4.0].into_boxed_slice(),
    };
    calories.process(&step(0.0));
    let ResultFragment::Energy(energy) = calories.process(&step(3600.0)) else {
      panic!("expected an energy fragment");
    };
    assert_eq!(energy.met, 4.0);
    assert!((energy.total_kcal - energy.kcal_per_hour).abs() < 1e-6);
  }
}
