// 该文件是 Planitorium 项目的一部分。
// src/bin/classify_oneshot.rs - 单张图像分类
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use url::Url;

use planitorium::{
  FromUrl,
  config::{ModelLoading, PipelineArgs},
  input::ImageFileInput,
  model::ModelSource,
  output::OutputWrapper,
  pipeline::Pipeline,
  task::{OneShotTask, Task},
};
use tracing::info;

/// 对单张图像分类并输出结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出: stdout: 或 folder:///dir?plant=Name
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,
  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

fn main() -> Result<()> {
  planitorium::init_tracing();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = args.pipeline.pipeline_config(ModelLoading::Eager)?;
  let labels = Arc::new(args.pipeline.label_table()?);
  let input = ImageFileInput::from_url(&args.input)?;
  let model = ModelSource::from_url(&args.model)?.build()?;
  let pipeline = Pipeline::new(model, labels, &config)?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input, &pipeline, output)?;

  Ok(())
}
