// 该文件是 Planitorium 项目的一部分。
// src/model/mock.rs - 固定输出的模拟模型
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
  sync::atomic::{AtomicUsize, Ordering},
  time::Duration,
};

use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::ClassifyError,
  frame::{InputShape, NhwcTensor},
  model::{Model, ModelError, SUPPORTED_INPUT_SIZES},
};

const MOCK_DEFAULT_INPUT_SIZE: u32 = 224;
const MOCK_DEFAULT_CLASSES: usize = 7;

/// 返回固定分数的模型，用于测试与无模型文件时的演示
#[derive(Debug)]
pub struct MockModel {
  shape: InputShape,
  logits: Vec<f32>,
  delay: Option<Duration>,
  failure: Option<Failure>,
  calls: AtomicUsize,
}

/// 从第 `after` 次调用（从 0 计）起返回推理错误
#[derive(Debug)]
struct Failure {
  after: usize,
  msg: String,
}

impl MockModel {
  pub fn new(shape: InputShape, logits: Vec<f32>) -> Self {
    Self {
      shape,
      logits,
      delay: None,
      failure: None,
      calls: AtomicUsize::new(0),
    }
  }

  /// 某个类别占绝对优势的输出
  pub fn confident(shape: InputShape, classes: usize, winner: usize) -> Self {
    let mut logits = vec![0.0; classes];
    if let Some(v) = logits.get_mut(winner) {
      *v = 12.0;
    }
    Self::new(shape, logits)
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn failing(self, msg: impl Into<String>) -> Self {
    self.failing_after(0, msg)
  }

  /// 前 `calls` 次推理正常，之后每次都失败。预热推理也计入次数
  pub fn failing_after(mut self, calls: usize, msg: impl Into<String>) -> Self {
    self.failure = Some(Failure {
      after: calls,
      msg: msg.into(),
    });
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl FromUrlWithScheme for MockModel {
  const SCHEME: &'static str = "mock";
}

/// `mock:?size=224&classes=7&winner=4`，不指定 winner 时输出均匀分数
impl FromUrl for MockModel {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut size = MOCK_DEFAULT_INPUT_SIZE;
    let mut classes = MOCK_DEFAULT_CLASSES;
    let mut winner = None;
    for (k, v) in url.query_pairs() {
      let invalid = || ModelError::ModelPathError(format!("参数 {} 的值无效: {}", k, v));
      match k.as_ref() {
        "size" => size = v.parse::<u32>().map_err(|_| invalid())?,
        "classes" => classes = v.parse::<usize>().map_err(|_| invalid())?,
        "winner" => winner = Some(v.parse::<usize>().map_err(|_| invalid())?),
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }

    if !SUPPORTED_INPUT_SIZES.contains(&size) {
      return Err(ModelError::ModelPathError(format!(
        "输入尺寸必须为 {:?} 之一, 实际为 {}",
        SUPPORTED_INPUT_SIZES, size
      )));
    }
    if classes == 0 {
      return Err(ModelError::ModelPathError("类别数必须大于 0".to_string()));
    }
    if let Some(winner) = winner
      && winner >= classes
    {
      return Err(ModelError::ModelPathError(format!(
        "winner 必须小于类别数 {}, 实际为 {}",
        classes, winner
      )));
    }

    let shape = InputShape::square(size);
    Ok(match winner {
      Some(winner) => MockModel::confident(shape, classes, winner),
      None => MockModel::new(shape, vec![0.0; classes]),
    })
  }
}

impl Model for MockModel {
  fn input_shape(&self) -> InputShape {
    self.shape
  }

  fn infer(&self, input: &NhwcTensor) -> Result<Vec<f32>, ClassifyError> {
    input.ensure_shape(self.shape)?;
    let call = self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      std::thread::sleep(delay);
    }
    if let Some(failure) = &self.failure
      && call >= failure.after
    {
      return Err(ClassifyError::inference(&failure.msg));
    }
    Ok(self.logits.clone())
  }
}
