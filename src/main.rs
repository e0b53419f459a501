// 该文件是 Planitorium 项目的一部分。
// src/main.rs - 服务主程序
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

mod args;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use planitorium::{
  FromUrl,
  server::{self, AppState},
  service::ClassifierService,
  store::Stores,
};

#[tokio::main]
async fn main() -> Result<()> {
  planitorium::init_tracing();

  let args = args::Args::parse();
  let config = args.pipeline_config()?;

  info!("模型路径: {}", args.model);
  info!("存储位置: {}", args.store);
  info!(
    "置信度阈值: {}%, 缩放: {:?}, 归一化: {:?}, 温度: {}",
    config.confidence_threshold, config.resize_filter, config.normalization, config.temperature
  );

  let labels = Arc::new(args.pipeline.label_table()?);
  info!("标签表: {} 个类别", labels.len());

  // 预加载模式下加载失败直接退出，不绑定端口
  let service = ClassifierService::from_model_url(args.model.clone(), labels, config)
    .start()
    .await?;
  let stores = Stores::from_url(&args.store)?;

  let listener = TcpListener::bind((args.bind, args.port)).await?;
  let state = AppState::new(service, stores, args.public_base_url());
  server::serve(listener, server::router(state, args.max_upload_bytes)).await?;

  Ok(())
}
