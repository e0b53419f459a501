// 该文件是 Planitorium 项目的一部分。
// src/server/error.rs - HTTP 错误映射
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

use axum::{
  Json,
  extract::multipart::MultipartError,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::{
  error::{ClassifyError, ErrorKind},
  server::Envelope,
  store::StoreError,
};

#[derive(Error, Debug)]
pub enum ApiError {
  #[error(transparent)]
  Classify(#[from] ClassifyError),
  #[error("存储错误: {0}")]
  Store(#[from] StoreError),
  #[error("表单解析失败: {0}")]
  Multipart(#[from] MultipartError),
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  NotFound(String),
  #[error("内部错误: {0}")]
  Internal(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Classify(e) => match e {
        ClassifyError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ClassifyError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ if e.kind() == ErrorKind::BadInput => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
      },
      ApiError::Multipart(e) => e.status(),
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

/// 返回给客户端的分类错误说明，详细原因只写入日志
fn client_message(err: &ClassifyError) -> String {
  match err {
    ClassifyError::UnsupportedMediaType(mime) => {
      format!("Unsupported media type: {mime}. Only JPEG and PNG photos are accepted")
    }
    ClassifyError::InvalidImage(_) => "Invalid image".to_string(),
    ClassifyError::DecodeError(_) => "Image could not be decoded".to_string(),
    ClassifyError::ShapeMismatch { .. } => "Image does not match the model input".to_string(),
    ClassifyError::UnknownClass(_) | ClassifyError::InferenceError(_) => {
      "Classification failed".to_string()
    }
    ClassifyError::ModelUnavailable(_) => "Model is not available, try again later".to_string(),
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      ApiError::Store(_) | ApiError::Internal(_) => {
        error!("请求处理失败: {}", self);
        "An internal error occurred".to_string()
      }
      ApiError::Multipart(e) => {
        warn!("表单解析失败: {}", e);
        e.body_text()
      }
      ApiError::Classify(e) => {
        if status.is_server_error() {
          error!("分类失败: {}", e);
        } else {
          warn!("分类请求被拒绝: {}", e);
        }
        client_message(e)
      }
      ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg.clone(),
    };

    (status, Json(Envelope::<()>::failure(message))).into_response()
  }
}
