// 该文件是 Planitorium 项目的一部分。
// src/output.rs - 分类结果输出
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

use std::io::Write;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  decision::ClassificationResult,
  input::RawImage,
  store::StoreError,
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

#[cfg(feature = "directory_record")]
mod record;
#[cfg(feature = "directory_record")]
pub use self::record::RecordOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  SerdeError(#[from] serde_json::Error),
  #[error("存储错误: {0}")]
  StoreError(#[from] StoreError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 以一行 JSON 打印分类结果到标准输出
#[derive(Debug, Default)]
pub struct JsonOutput {
  pretty: bool,
}

impl FromUrlWithScheme for JsonOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for JsonOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(JsonOutput {
      pretty: url.query_pairs().any(|(k, _)| k == "pretty"),
    })
  }
}

impl JsonOutput {
  fn write_to(&self, mut out: impl Write, result: &ClassificationResult) -> Result<(), OutputError> {
    if self.pretty {
      serde_json::to_writer_pretty(&mut out, result)?;
    } else {
      serde_json::to_writer(&mut out, result)?;
    }
    writeln!(out)?;
    Ok(())
  }
}

impl Render<RawImage, ClassificationResult> for JsonOutput {
  type Error = OutputError;

  fn render_result(&self, _frame: &RawImage, result: &ClassificationResult) -> Result<(), Self::Error> {
    self.write_to(std::io::stdout().lock(), result)
  }
}

pub enum OutputWrapper {
  JsonOutput(JsonOutput),
  #[cfg(feature = "directory_record")]
  RecordOutput(RecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonOutput::SCHEME => Ok(OutputWrapper::JsonOutput(JsonOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      RecordOutput::SCHEME => Ok(OutputWrapper::RecordOutput(RecordOutput::from_url(url)?)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<RawImage, ClassificationResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &RawImage, result: &ClassificationResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonOutput(output) => output.render_result(frame, result),
      #[cfg(feature = "directory_record")]
      OutputWrapper::RecordOutput(output) => output.render_result(frame, result),
    }
  }
}
