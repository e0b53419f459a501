// 该文件是 Planitorium 项目的一部分。
// src/error.rs - 分类流水线错误定义
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

use thiserror::Error;

use crate::frame::InputShape;

/// 错误归属：调用方输入问题（4xx）或系统/后端问题（5xx）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  BadInput,
  System,
}

/// 一次分类请求可能出现的全部错误，均为终止性错误，不会自动重试
#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("不支持的媒体类型: {0}")]
  UnsupportedMediaType(String),
  #[error("无效图像: {0}")]
  InvalidImage(String),
  #[error("图像解码错误: {0}")]
  DecodeError(#[source] image::ImageError),
  #[error("张量形状不匹配: 期望 {expected}, 实际 {actual}")]
  ShapeMismatch { expected: String, actual: String },
  #[error("未知类别索引: {0}")]
  UnknownClass(usize),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("模型不可用: {0}")]
  ModelUnavailable(String),
}

impl ClassifyError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ClassifyError::UnsupportedMediaType(_)
      | ClassifyError::InvalidImage(_)
      | ClassifyError::DecodeError(_)
      | ClassifyError::ShapeMismatch { .. } => ErrorKind::BadInput,
      ClassifyError::UnknownClass(_)
      | ClassifyError::InferenceError(_)
      | ClassifyError::ModelUnavailable(_) => ErrorKind::System,
    }
  }

  pub fn shape_mismatch(expected: InputShape, actual: impl std::fmt::Display) -> Self {
    ClassifyError::ShapeMismatch {
      expected: expected.to_string(),
      actual: actual.to_string(),
    }
  }

  pub fn inference(msg: impl std::fmt::Display) -> Self {
    ClassifyError::InferenceError(msg.to_string())
  }
}
