// 该文件是 Planitorium 项目的一部分。
// src/model.rs - 分类模型
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

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl,
  error::ClassifyError,
  frame::{InputShape, NhwcTensor},
  labels::LabelTableError,
};

/// 图像分类模型。推理只借用 `&self`，模型在进程内只读共享
pub trait Model: Send + Sync {
  /// 模型声明的输入形状
  fn input_shape(&self) -> InputShape;

  /// 前向推理，返回每个类别的原始分数（logits 或概率，取决于模型）
  fn infer(&self, input: &NhwcTensor) -> Result<Vec<f32>, ClassifyError>;
}

pub type SharedModel = Arc<dyn Model>;

/// 分类模型接受的正方形输入边长
pub const SUPPORTED_INPUT_SIZES: [u32; 2] = [224, 256];

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("推理后端错误: {0}")]
  BackendError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("标签表与模型不匹配: {0}")]
  LabelMismatch(#[from] LabelTableError),
  #[error("模型预热推理失败: {0}")]
  WarmupFailed(#[source] ClassifyError),
}

impl ModelError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    ModelError::ModelInvalid(msg.into())
  }
}

mod mock;
pub use self::mock::MockModel;

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxClassifier, OnnxClassifierBuilder};

/// 按 URL 方案选择模型后端
pub enum ModelSource {
  Mock(MockModel),
  #[cfg(feature = "model_onnx")]
  Onnx(OnnxClassifierBuilder),
}

impl FromUrl for ModelSource {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    if url.scheme() == MockModel::SCHEME {
      return Ok(ModelSource::Mock(MockModel::from_url(url)?));
    }
    #[cfg(feature = "model_onnx")]
    {
      if url.scheme() == OnnxClassifierBuilder::SCHEME {
        return Ok(ModelSource::Onnx(OnnxClassifierBuilder::from_url(url)?));
      }
    }
    Err(ModelError::ModelPathError(format!(
      "不支持的模型方案: {}",
      url.scheme()
    )))
  }
}

impl ModelSource {
  pub fn build(self) -> Result<SharedModel, ModelError> {
    match self {
      ModelSource::Mock(model) => Ok(Arc::new(model)),
      #[cfg(feature = "model_onnx")]
      ModelSource::Onnx(builder) => Ok(Arc::new(builder.build()?)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rknn:///models/corn.rknn").unwrap();
    assert!(matches!(
      ModelSource::from_url(&url),
      Err(ModelError::ModelPathError(_))
    ));
  }

  #[test]
  fn mock_scheme_builds_shared_model() {
    let url = Url::parse("mock:?classes=7&winner=1").unwrap();
    let model = ModelSource::from_url(&url).unwrap().build().unwrap();
    assert_eq!(model.input_shape(), InputShape::square(224));
  }
}
