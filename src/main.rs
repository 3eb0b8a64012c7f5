// 该文件是 Yuedong （悦动） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use yuedong::{
  FromUrl,
  config::SessionConfig,
  frame::RgbNhwcFrame,
  input::InputWrapper,
  labels::LabelMap,
  model::ReplayModel,
  output::OutputWrapper,
  task::{StreamingTask, Task},
};

const WIDTH: u32 = 224;
const HEIGHT: u32 = 224;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("输入来源: {}", args.input);
  info!("模型: {}", args.model);
  info!("输出路径: {}", args.output);

  let mut config = match &args.config {
    Some(path) => SessionConfig::from_json_file(path)?,
    None => SessionConfig::default(),
  };
  args.apply(&mut config);
  let task = StreamingTask::from_session(&config)?;

  let labels = match &args.labels {
    Some(path) => LabelMap::from_json_file(path)?,
    None => LabelMap::fitness_rep_counting(),
  };

  let input = InputWrapper::<WIDTH, HEIGHT>::from_url(&args.input)?;
  let model: ReplayModel<RgbNhwcFrame<WIDTH, HEIGHT>> = ReplayModel::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let report = task
    .with_labels(labels)
    .with_signal_handler(true)
    .run_task(input, model, output)?;

  info!("{}", serde_json::to_string(&report.stats)?);
  Ok(())
}
