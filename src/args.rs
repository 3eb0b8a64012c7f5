// 该文件是 Yuedong （悦动） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use yuedong::config::{DropPolicy, PostprocessKind, SessionConfig, Sex};

/// Yuedong 实时动作识别
///
/// 命令行参数覆盖配置文件中的同名项。
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// - 图像序列: frames:///path/to/dir?fps=30
  /// - 测试图案: pattern://?fps=30&frames=300&live
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 模型
  /// - 录制回放: replay:///path/to/features.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输出
  /// - JSON Lines: jsonl:///path/to/out.jsonl 或 jsonl:///path/to/dir?daily
  /// - 日志: log://
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 会话配置文件 (JSON)
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 类别映射文件 label2int.json
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 模型步长（帧）
  #[arg(long, value_name = "S")]
  pub stride: Option<usize>,

  /// 模型需要的时间上下文（帧）
  #[arg(long, value_name = "R")]
  pub temporal_context: Option<usize>,

  /// 队列容量
  #[arg(long, value_name = "Q")]
  pub queue_capacity: Option<usize>,

  /// 帧队列满时的策略: block, drop-oldest
  #[arg(long, value_name = "POLICY")]
  pub drop_policy: Option<DropPolicy>,

  /// 计数状态转移所需的连续步数
  #[arg(long, value_name = "D")]
  pub debounce_frames: Option<u32>,

  /// 标签平滑窗口（步）
  #[arg(long, value_name = "N")]
  pub smoothing_window: Option<usize>,

  /// 体重（千克）
  #[arg(long, value_name = "KG")]
  pub weight: Option<f64>,

  /// 身高（厘米）
  #[arg(long, value_name = "CM")]
  pub height: Option<f64>,

  /// 年龄
  #[arg(long, value_name = "YEARS")]
  pub age: Option<f64>,

  /// 性别: male, female, other
  #[arg(long, value_name = "SEX")]
  pub sex: Option<Sex>,

  /// 后处理器，逗号分隔: classification, rep-count, calories
  #[arg(long, value_name = "LIST", value_delimiter = ',')]
  pub postprocess: Option<Vec<PostprocessKind>>,

  /// 最大采集帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<u64>,
}

impl Args {
  pub fn apply(&self, config: &mut SessionConfig) {
    if let Some(stride) = self.stride {
      config.stride = stride;
    }
    if let Some(context) = self.temporal_context {
      config.temporal_context = context;
    }
    if let Some(capacity) = self.queue_capacity {
      config.queue_capacity = capacity;
    }
    if let Some(policy) = self.drop_policy {
      config.drop_policy = Some(policy);
    }
    if let Some(debounce) = self.debounce_frames {
      config.debounce_frames = debounce;
    }
    if let Some(window) = self.smoothing_window {
      config.smoothing_window = window;
    }
    if let Some(weight) = self.weight {
      config.subject_mass_kg = weight;
    }
    if let Some(height) = self.height {
      config.subject_height_cm = height;
    }
    if let Some(age) = self.age {
      config.subject_age_years = age;
    }
    if let Some(sex) = self.sex {
      config.subject_sex = sex;
    }
    if let Some(kinds) = &self.postprocess {
      config.postprocessors = kinds.clone();
    }
    if let Some(frame_number) = self.frame_number {
      config.frame_number = Some(frame_number);
    }
  }
}
