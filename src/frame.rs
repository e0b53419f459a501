// 该文件是 Planitorium 项目的一部分。
// src/frame.rs - NHWC 张量定义
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

use std::fmt;

use crate::error::ClassifyError;

pub const RGB_CHANNELS: usize = 3;
pub const BATCH_SIZE: usize = 1;

/// 模型声明的输入形状 `[1, H, W, 3]`，在模型加载时确定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputShape {
  pub height: u32,
  pub width: u32,
}

impl InputShape {
  pub const fn square(size: u32) -> Self {
    Self {
      height: size,
      width: size,
    }
  }

  pub fn dims(&self) -> [usize; 4] {
    [
      BATCH_SIZE,
      self.height as usize,
      self.width as usize,
      RGB_CHANNELS,
    ]
  }

  pub fn len(&self) -> usize {
    self.dims().iter().product()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl fmt::Display for InputShape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let [n, h, w, c] = self.dims();
    write!(f, "[{}, {}, {}, {}]", n, h, w, c)
  }
}

/// 批大小为 1 的 RGB NHWC 浮点张量
#[derive(Debug, Clone, PartialEq)]
pub struct NhwcTensor {
  shape: InputShape,
  data: Box<[f32]>,
}

impl NhwcTensor {
  pub fn new(shape: InputShape, data: Vec<f32>) -> Result<Self, ClassifyError> {
    if data.len() != shape.len() {
      return Err(ClassifyError::shape_mismatch(
        shape,
        format!("{} 个元素", data.len()),
      ));
    }

    Ok(Self {
      shape,
      data: data.into_boxed_slice(),
    })
  }

  /// 全零张量，用于加载模型后的预热校验
  pub fn zeros(shape: InputShape) -> Self {
    Self {
      shape,
      data: vec![0.0; shape.len()].into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> InputShape {
    self.shape
  }

  pub fn height(&self) -> usize {
    self.shape.height as usize
  }

  pub fn width(&self) -> usize {
    self.shape.width as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_nhwc(&self) -> &[f32] {
    &self.data
  }

  /// 要求张量与模型声明的形状完全一致，不做任何隐式转换
  pub fn ensure_shape(&self, expected: InputShape) -> Result<(), ClassifyError> {
    if self.shape != expected {
      return Err(ClassifyError::shape_mismatch(expected, self.shape));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shape_display_and_len() {
    let shape = InputShape::square(224);
    assert_eq!(shape.to_string(), "[1, 224, 224, 3]");
    assert_eq!(shape.len(), 224 * 224 * 3);
  }

  #[test]
  fn rejects_wrong_data_length() {
    let err = NhwcTensor::new(InputShape::square(4), vec![0.0; 10]).unwrap_err();
    assert!(matches!(err, ClassifyError::ShapeMismatch { .. }));
  }

  #[test]
  fn ensure_shape_is_strict() {
    let tensor = NhwcTensor::zeros(InputShape::square(224));
    assert!(tensor.ensure_shape(InputShape::square(224)).is_ok());
    assert!(matches!(
      tensor.ensure_shape(InputShape::square(256)),
      Err(ClassifyError::ShapeMismatch { .. })
    ));
  }
}
