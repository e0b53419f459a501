// 该文件是 Planitorium 项目的一部分。
// src/args.rs - 服务参数配置
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

use std::net::IpAddr;

use clap::Parser;
use url::Url;

use planitorium::{
  config::{ConfigError, ModelLoading, PipelineArgs, PipelineConfig},
  server::DEFAULT_MAX_UPLOAD_BYTES,
};

/// Planitorium 植物病害识别服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，例如 onnx:///models/corn.onnx?size=224
  #[arg(long, env = "MODEL_URL", value_name = "MODEL")]
  pub model: Url,

  /// 存储位置: memory: 或 folder:///var/lib/planitorium
  #[arg(long, env = "STORE_URL", value_name = "STORE", default_value = "memory:")]
  pub store: Url,

  /// 监听地址
  #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
  pub bind: IpAddr,

  /// 监听端口
  #[arg(long, env = "PORT", default_value_t = 3000)]
  pub port: u16,

  /// 首次请求时才加载模型，加载失败时返回 503 并在下次请求重试
  #[arg(long, env = "LAZY_MODEL")]
  pub lazy_model: bool,

  /// 上传大小上限（字节）
  #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
  pub max_upload_bytes: usize,

  /// 生成照片链接使用的外部地址，缺省为 http://<bind>:<port>
  #[arg(long, env = "PUBLIC_BASE_URL")]
  pub public_base_url: Option<String>,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

impl Args {
  pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
    let loading = if self.lazy_model {
      ModelLoading::Lazy
    } else {
      ModelLoading::Eager
    };
    self.pipeline.pipeline_config(loading)
  }

  pub fn public_base_url(&self) -> String {
    self
      .public_base_url
      .clone()
      .unwrap_or_else(|| format!("http://{}:{}", self.bind, self.port))
  }
}
