// 该文件是 Planitorium 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 分类模型
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

use std::{
  path::PathBuf,
  sync::{
    Mutex, TryLockError,
    atomic::{AtomicUsize, Ordering},
  },
};

use ort::{session::Session, value::Tensor};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::ClassifyError,
  frame::{InputShape, NhwcTensor},
  model::{Model, ModelError, SUPPORTED_INPUT_SIZES},
};

const ONNX_DEFAULT_INPUT_SIZE: u32 = 224;
const ONNX_DEFAULT_SESSIONS: usize = 2;
const ONNX_DEFAULT_INTRA_THREADS: usize = 2;

impl From<ort::Error> for ModelError {
  fn from(err: ort::Error) -> Self {
    ModelError::BackendError(err.to_string())
  }
}

/// ONNX Runtime 的 `run` 需要独占会话，因此持有一个小型会话池
pub struct OnnxClassifier {
  sessions: Box<[Mutex<Session>]>,
  next: AtomicUsize,
  shape: InputShape,
}

/// 模型 URL: `onnx:///path/model.onnx?size=224&sessions=2&threads=2`
#[derive(Debug, Clone)]
pub struct OnnxClassifierBuilder {
  model_path: PathBuf,
  input_size: u32,
  sessions: usize,
  intra_threads: usize,
}

impl FromUrlWithScheme for OnnxClassifierBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxClassifierBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = OnnxClassifierBuilder {
      model_path: PathBuf::from(url.path()),
      input_size: ONNX_DEFAULT_INPUT_SIZE,
      sessions: ONNX_DEFAULT_SESSIONS,
      intra_threads: ONNX_DEFAULT_INTRA_THREADS,
    };

    for (k, v) in url.query_pairs() {
      let parse = |v: &str| {
        v.parse::<usize>()
          .map_err(|_| ModelError::ModelPathError(format!("参数 {} 的值无效: {}", k, v)))
      };
      match k.as_ref() {
        "size" => builder = builder.input_size(parse(v.as_ref())? as u32),
        "sessions" => builder = builder.sessions(parse(v.as_ref())?),
        "threads" => builder = builder.intra_threads(parse(v.as_ref())?),
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl OnnxClassifierBuilder {
  pub fn input_size(mut self, size: u32) -> Self {
    self.input_size = size;
    self
  }

  pub fn sessions(mut self, sessions: usize) -> Self {
    self.sessions = sessions.max(1);
    self
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = threads.max(1);
    self
  }

  pub fn build(self) -> Result<OnnxClassifier, ModelError> {
    if !SUPPORTED_INPUT_SIZES.contains(&self.input_size) {
      return Err(ModelError::invalid(format!(
        "输入尺寸必须为 {:?} 之一, 实际为 {}",
        SUPPORTED_INPUT_SIZES, self.input_size
      )));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let size = std::fs::metadata(&self.model_path)?.len();
    debug!("模型文件大小: {:.2} MB", size as f64 / (1024.0 * 1024.0));

    let mut sessions = Vec::with_capacity(self.sessions);
    for idx in 0..self.sessions {
      debug!("创建第 {} 个推理会话", idx);
      let session = Session::builder()?
        .with_intra_threads(self.intra_threads)?
        .commit_from_file(&self.model_path)?;
      sessions.push(Mutex::new(session));
    }
    info!(
      "模型加载完成: {} 个会话, 输入形状 {}",
      sessions.len(),
      InputShape::square(self.input_size)
    );

    Ok(OnnxClassifier {
      sessions: sessions.into_boxed_slice(),
      next: AtomicUsize::new(0),
      shape: InputShape::square(self.input_size),
    })
  }
}

impl OnnxClassifier {
  fn run_session(session: &mut Session, input: &NhwcTensor) -> Result<Vec<f32>, ClassifyError> {
    let dims: Vec<i64> = input.shape().dims().iter().map(|&d| d as i64).collect();
    let tensor = Tensor::from_array((dims, input.as_nhwc().to_vec()))
      .map_err(|e| ClassifyError::inference(format!("创建输入张量失败: {}", e)))?;

    let outputs = session
      .run(ort::inputs![tensor])
      .map_err(|e| ClassifyError::inference(format!("ONNX 推理失败: {}", e)))?;

    let (shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(|e| ClassifyError::inference(format!("读取输出张量失败: {}", e)))?;
    debug!("模型输出形状: {:?}", shape);

    Ok(data.to_vec())
  }
}

impl Model for OnnxClassifier {
  fn input_shape(&self) -> InputShape {
    self.shape
  }

  fn infer(&self, input: &NhwcTensor) -> Result<Vec<f32>, ClassifyError> {
    input.ensure_shape(self.shape)?;

    let start = self.next.fetch_add(1, Ordering::Relaxed);
    let count = self.sessions.len();

    // 先找空闲会话，全部繁忙时在起始会话上等待
    for offset in 0..count {
      match self.sessions[(start + offset) % count].try_lock() {
        Ok(mut session) => return Self::run_session(&mut session, input),
        Err(TryLockError::WouldBlock) => continue,
        Err(TryLockError::Poisoned(_)) => {
          return Err(ClassifyError::inference("推理会话锁已中毒"));
        }
      }
    }

    let mut session = self.sessions[start % count]
      .lock()
      .map_err(|_| ClassifyError::inference("推理会话锁已中毒"))?;
    Self::run_session(&mut session, input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_model_url() {
    let url = Url::parse("onnx:///models/corn.onnx?size=256&sessions=4").unwrap();
    let builder = OnnxClassifierBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, PathBuf::from("/models/corn.onnx"));
    assert_eq!(builder.input_size, 256);
    assert_eq!(builder.sessions, 4);
    assert_eq!(builder.intra_threads, ONNX_DEFAULT_INTRA_THREADS);
  }

  #[test]
  fn rejects_bad_parameters() {
    let url = Url::parse("onnx:///models/corn.onnx?size=big").unwrap();
    assert!(matches!(
      OnnxClassifierBuilder::from_url(&url),
      Err(ModelError::ModelPathError(_))
    ));
  }

  #[test]
  fn rejects_unsupported_input_size() {
    let url = Url::parse("onnx:///models/corn.onnx?size=640").unwrap();
    let builder = OnnxClassifierBuilder::from_url(&url).unwrap();
    assert!(matches!(builder.build(), Err(ModelError::ModelInvalid(_))));
  }

  #[test]
  fn missing_model_file_is_load_error() {
    let url = Url::parse("onnx:///nonexistent/corn.onnx").unwrap();
    let builder = OnnxClassifierBuilder::from_url(&url).unwrap();
    assert!(matches!(builder.build(), Err(ModelError::ModelLoadError(_))));
  }
}
