// 该文件是 Planitorium 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::ClassifyError,
  input::{MediaType, RawImage},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("无法从扩展名判断图像类型: {0}")]
  UnknownExtension(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像校验失败: {0}")]
  Rejected(#[from] ClassifyError),
}

/// 从本地文件读取的单张图像，迭代一次后耗尽
pub struct ImageFileInput {
  path: PathBuf,
  image: Option<RawImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let path = PathBuf::from(url.path());
    let media_type = MediaType::from_extension(&path)
      .ok_or_else(|| ImageFileInputError::UnknownExtension(path.clone()))?;
    let bytes = std::fs::read(&path)?;
    let image = RawImage::with_media_type(bytes, media_type)?;

    Ok(ImageFileInput {
      path,
      image: Some(image),
    })
  }
}

impl ImageFileInput {
  pub fn path(&self) -> &std::path::Path {
    &self.path
  }
}

impl Iterator for ImageFileInput {
  type Item = RawImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}
