// 该文件是 Planitorium 项目的一部分。
// src/preprocess.rs - 图像预处理：解码、缩放、归一化
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

use image::{
  ImageError, ImageFormat, RgbImage,
  error::{DecodingError, ImageFormatHint},
  imageops,
};
use tracing::debug;

use crate::{
  config::{Normalization, ResizeFilter},
  error::ClassifyError,
  frame::{InputShape, NhwcTensor, RGB_CHANNELS},
  input::RawImage,
};

/// 预处理参数，来自部署配置
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
  pub shape: InputShape,
  pub filter: ResizeFilter,
  pub normalization: Normalization,
}

impl Preprocessor {
  pub fn new(shape: InputShape, filter: ResizeFilter, normalization: Normalization) -> Self {
    Self {
      shape,
      filter,
      normalization,
    }
  }

  pub fn run(&self, raw: &RawImage) -> Result<NhwcTensor, ClassifyError> {
    let image = decode(raw)?;
    debug!(
      "解码完成: {}x{}, 缩放到 {}x{} ({:?})",
      image.width(),
      image.height(),
      self.shape.width,
      self.shape.height,
      self.filter
    );
    let resized = self.resize(&image);
    to_tensor(&resized, self.shape, self.normalization)
  }

  fn resize(&self, image: &RgbImage) -> RgbImage {
    if image.dimensions() == (self.shape.width, self.shape.height) {
      return image.clone();
    }
    imageops::resize(
      image,
      self.shape.width,
      self.shape.height,
      self.filter.filter_type(),
    )
  }
}

/// JPEG 结束标记 EOI
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// 解码为 8 位 RGB，灰度与带 alpha 通道的图像一律转换
pub fn decode(raw: &RawImage) -> Result<RgbImage, ClassifyError> {
  let format = raw.decode_format();
  if format == ImageFormat::Jpeg {
    ensure_jpeg_complete(raw.bytes())?;
  }
  let image =
    image::load_from_memory_with_format(raw.bytes(), format).map_err(ClassifyError::DecodeError)?;
  Ok(image.to_rgb8())
}

/// JPEG 解码器会把缺失的扫描行补齐后照常返回，截断的文件必须在解码前拒绝
fn ensure_jpeg_complete(bytes: &[u8]) -> Result<(), ClassifyError> {
  // 允许结尾的填充字节
  let end = bytes
    .iter()
    .rposition(|b| *b != 0x00 && !b.is_ascii_whitespace())
    .map_or(0, |i| i + 1);
  if bytes[..end].ends_with(&JPEG_EOI) {
    return Ok(());
  }
  Err(ClassifyError::DecodeError(ImageError::Decoding(
    DecodingError::new(
      ImageFormatHint::Exact(ImageFormat::Jpeg),
      "JPEG 数据不完整, 缺少结束标记",
    ),
  )))
}

/// 按 NHWC 排列写入张量
pub fn to_tensor(
  image: &RgbImage,
  shape: InputShape,
  normalization: Normalization,
) -> Result<NhwcTensor, ClassifyError> {
  let (width, height) = image.dimensions();
  if (width, height) != (shape.width, shape.height) {
    return Err(ClassifyError::shape_mismatch(
      shape,
      InputShape { height, width },
    ));
  }

  let mut data = Vec::with_capacity(shape.len());
  for pixel in image.pixels() {
    for c in 0..RGB_CHANNELS {
      data.push(normalization.apply(pixel[c]));
    }
  }

  NhwcTensor::new(shape, data)
}
