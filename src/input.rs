// 该文件是 Planitorium 项目的一部分。
// src/input.rs - 上传图像接收与校验
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

use std::{fmt, path::Path, sync::Arc};

use image::ImageFormat;
use tracing::debug;

use crate::error::ClassifyError;

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 支持的图像媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
  Jpeg,
  Png,
}

impl MediaType {
  /// 解析声明的 MIME 类型，忽略参数部分与大小写
  pub fn from_mime(mime: &str) -> Result<Self, ClassifyError> {
    let essence = mime
      .split(';')
      .next()
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase();
    match essence.as_str() {
      "image/jpeg" | "image/jpg" => Ok(MediaType::Jpeg),
      "image/png" => Ok(MediaType::Png),
      _ => Err(ClassifyError::UnsupportedMediaType(mime.to_string())),
    }
  }

  pub fn from_extension(path: &Path) -> Option<Self> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
      "jpg" | "jpeg" => Some(MediaType::Jpeg),
      "png" => Some(MediaType::Png),
      _ => None,
    }
  }

  pub fn from_image_format(format: ImageFormat) -> Option<Self> {
    match format {
      ImageFormat::Jpeg => Some(MediaType::Jpeg),
      ImageFormat::Png => Some(MediaType::Png),
      _ => None,
    }
  }

  pub fn mime(&self) -> &'static str {
    match self {
      MediaType::Jpeg => "image/jpeg",
      MediaType::Png => "image/png",
    }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      MediaType::Jpeg => "jpg",
      MediaType::Png => "png",
    }
  }

  pub fn image_format(&self) -> ImageFormat {
    match self {
      MediaType::Jpeg => ImageFormat::Jpeg,
      MediaType::Png => ImageFormat::Png,
    }
  }
}

impl fmt::Display for MediaType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.mime())
  }
}

/// 通过校验的上传图像：非空，且声明类型为 JPEG 或 PNG
#[derive(Debug, Clone)]
pub struct RawImage {
  bytes: Arc<[u8]>,
  media_type: MediaType,
  sniffed: Option<MediaType>,
}

impl RawImage {
  /// 校验上传数据。媒体类型检查先于任何字节检查；
  /// 无法识别的字节在此处放行，留给解码阶段报告 `DecodeError`
  pub fn new(bytes: impl Into<Arc<[u8]>>, declared_mime: &str) -> Result<Self, ClassifyError> {
    let media_type = MediaType::from_mime(declared_mime)?;
    let bytes = bytes.into();
    if bytes.is_empty() {
      return Err(ClassifyError::InvalidImage("上传内容为空".to_string()));
    }

    let sniffed = match image::guess_format(&bytes) {
      Ok(format) => match MediaType::from_image_format(format) {
        Some(kind) => Some(kind),
        None => {
          return Err(ClassifyError::InvalidImage(format!(
            "内容为 {:?} 格式, 仅支持 JPEG/PNG",
            format
          )));
        }
      },
      Err(_) => None,
    };

    if let Some(kind) = sniffed
      && kind != media_type
    {
      debug!("声明类型 {} 与实际内容 {} 不一致, 按实际内容解码", media_type, kind);
    }

    Ok(Self {
      bytes,
      media_type,
      sniffed,
    })
  }

  pub fn with_media_type(bytes: impl Into<Arc<[u8]>>, media_type: MediaType) -> Result<Self, ClassifyError> {
    Self::new(bytes, media_type.mime())
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  /// 调用方声明的类型
  pub fn media_type(&self) -> MediaType {
    self.media_type
  }

  /// 解码时使用的格式：优先采用内容嗅探结果
  pub fn decode_format(&self) -> ImageFormat {
    self.sniffed.unwrap_or(self.media_type).image_format()
  }
}
