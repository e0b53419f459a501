// 该文件是 Planitorium 项目的一部分。
// src/config.rs - 流水线配置
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

use std::{path::PathBuf, time::Duration};

use clap::ValueEnum;
use image::imageops::FilterType;
use serde::Serialize;
use thiserror::Error;

use crate::labels::{LabelTable, LabelTableError};

/// 默认置信度阈值（百分比）
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 50.0;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

/// 缩放算法，会影响模型输出和置信度，必须在部署时固定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
  Nearest,
  #[default]
  Bilinear,
}

impl ResizeFilter {
  pub fn filter_type(self) -> FilterType {
    match self {
      ResizeFilter::Nearest => FilterType::Nearest,
      ResizeFilter::Bilinear => FilterType::Triangle,
    }
  }
}

/// 像素归一化方式，取决于模型训练时的输入范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
  /// 原始像素值 [0, 255]
  #[default]
  Raw,
  /// 除以 255 到 [0, 1]
  Unit,
}

impl Normalization {
  #[inline]
  pub fn apply(self, value: u8) -> f32 {
    match self {
      Normalization::Raw => value as f32,
      Normalization::Unit => value as f32 / 255.0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelLoading {
  /// 启动时加载，失败则进程不可用
  #[default]
  Eager,
  /// 首次调用时加载，失败后下次调用重试
  Lazy,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值必须在 [0, 100] 范围内, 实际为 {0}")]
  Threshold(f64),
  #[error("softmax 温度必须为正的有限数, 实际为 {0}")]
  Temperature(f64),
  #[error("推理超时不能为 0")]
  Timeout,
}

/// 部署时固定的流水线配置，启动时读取一次
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
  pub confidence_threshold: f64,
  pub resize_filter: ResizeFilter,
  pub normalization: Normalization,
  pub temperature: f64,
  #[serde(with = "duration_secs")]
  pub inference_timeout: Duration,
  pub model_loading: ModelLoading,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      resize_filter: ResizeFilter::default(),
      normalization: Normalization::default(),
      temperature: DEFAULT_TEMPERATURE,
      inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
      model_loading: ModelLoading::default(),
    }
  }
}

impl PipelineConfig {
  pub fn validate(self) -> Result<Self, ConfigError> {
    if !(0.0..=100.0).contains(&self.confidence_threshold) {
      return Err(ConfigError::Threshold(self.confidence_threshold));
    }
    if !self.temperature.is_finite() || self.temperature <= 0.0 {
      return Err(ConfigError::Temperature(self.temperature));
    }
    if self.inference_timeout.is_zero() {
      return Err(ConfigError::Timeout);
    }
    Ok(self)
  }
}

/// 各可执行程序共用的流水线命令行参数
#[derive(clap::Args, Debug, Clone)]
pub struct PipelineArgs {
  /// 标签表 JSON 文件（按类别下标排列），缺省使用内置玉米病害表
  #[arg(long, env = "LABELS_FILE", value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 置信度阈值（百分比 0 - 100），低于该值判定为 not-a-plant
  #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
  pub confidence_threshold: f64,

  /// 缩放算法
  #[arg(long, env = "RESIZE_FILTER", value_enum, default_value_t = ResizeFilter::Bilinear)]
  pub resize_filter: ResizeFilter,

  /// 像素归一化方式
  #[arg(long, env = "NORMALIZATION", value_enum, default_value_t = Normalization::Raw)]
  pub normalization: Normalization,

  /// softmax 温度
  #[arg(long, env = "SOFTMAX_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
  pub temperature: f64,

  /// 单次推理超时（秒）
  #[arg(long, env = "INFERENCE_TIMEOUT_SECS", default_value_t = DEFAULT_INFERENCE_TIMEOUT.as_secs())]
  pub inference_timeout_secs: u64,
}

impl PipelineArgs {
  pub fn pipeline_config(&self, model_loading: ModelLoading) -> Result<PipelineConfig, ConfigError> {
    PipelineConfig {
      confidence_threshold: self.confidence_threshold,
      resize_filter: self.resize_filter,
      normalization: self.normalization,
      temperature: self.temperature,
      inference_timeout: Duration::from_secs(self.inference_timeout_secs),
      model_loading,
    }
    .validate()
  }

  pub fn label_table(&self) -> Result<LabelTable, LabelTableError> {
    match &self.labels {
      Some(path) => LabelTable::from_json_file(path),
      None => Ok(LabelTable::corn()),
    }
  }
}

mod duration_secs {
  use std::time::Duration;

  pub fn serialize<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
  }
}
