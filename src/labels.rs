// 该文件是 Planitorium 项目的一部分。
// src/labels.rs - 类别标签与处理建议表
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ClassifyError;

/// 置信度不足时使用的哨兵标签
pub const NOT_A_PLANT_LABEL: &str = "not-a-plant";
pub const NOT_A_PLANT_SUGGESTION: &str = "The photo could not be recognized as a corn plant or a known corn disease. \
   Retake the photo with the affected leaf or stalk filling the frame in good light.";

/// 玉米病害模型的 7 个类别，按模型输出索引排列
const CORN_CLASSES: [(&str, &str); 7] = [
  (
    "Anthracnose",
    "Inspect the infected leaves and apply a fungicide to treat anthracnose.",
  ),
  (
    "Healthy Stalk",
    "Your corn stalk is healthy. Keep caring for it the same way.",
  ),
  (
    "Gray Leaf Spot",
    "Inspect the plant carefully and apply a fungicide to stop gray leaf spot from spreading.",
  ),
  (
    "Stalk Rot",
    "Deal with stalk rot quickly: cut away the infected parts and keep them away from other plants.",
  ),
  (
    "Healthy Leaf",
    "Your corn leaves are healthy. Keep up the good care and make sure watering is sufficient.",
  ),
  (
    "Leaf Blight",
    "Leaf blight can be treated with fungicide and by clearing debris around the plants.",
  ),
  (
    "Common Rust",
    "Use a copper-based fungicide or a triazole product to control common rust on corn leaves.",
  ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
  pub label: String,
  pub suggestion: String,
}

#[derive(Error, Debug)]
pub enum LabelTableError {
  #[error("标签表读取失败: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签表格式错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("标签表为空")]
  Empty,
  #[error("标签 '{0}' 与哨兵标签冲突")]
  ReservedLabel(String),
  #[error("模型输出 {model} 个类别, 标签表只有 {table} 项")]
  ClassCountMismatch { model: usize, table: usize },
}

/// 以类别索引为键的静态标签表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTable {
  entries: Vec<LabelEntry>,
}

impl LabelTable {
  pub fn new(entries: Vec<LabelEntry>) -> Result<Self, LabelTableError> {
    if entries.is_empty() {
      return Err(LabelTableError::Empty);
    }
    if let Some(entry) = entries.iter().find(|e| e.label == NOT_A_PLANT_LABEL) {
      return Err(LabelTableError::ReservedLabel(entry.label.clone()));
    }
    Ok(Self { entries })
  }

  /// 内置的玉米病害标签表
  pub fn corn() -> Self {
    Self {
      entries: CORN_CLASSES
        .iter()
        .map(|(label, suggestion)| LabelEntry {
          label: label.to_string(),
          suggestion: suggestion.to_string(),
        })
        .collect(),
    }
  }

  /// 从 JSON 文件读取，格式为 `[{"label": ..., "suggestion": ...}, ...]`
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LabelTableError> {
    let data = std::fs::read(path)?;
    let entries: Vec<LabelEntry> = serde_json::from_slice(&data)?;
    Self::new(entries)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, class_index: usize) -> Result<&LabelEntry, ClassifyError> {
    self
      .entries
      .get(class_index)
      .ok_or(ClassifyError::UnknownClass(class_index))
  }

  /// 模型加载时校验类别数量，避免静默错位
  pub fn ensure_class_count(&self, model_classes: usize) -> Result<(), LabelTableError> {
    if model_classes != self.entries.len() {
      return Err(LabelTableError::ClassCountMismatch {
        model: model_classes,
        table: self.entries.len(),
      });
    }
    Ok(())
  }

  pub fn iter(&self) -> impl Iterator<Item = &LabelEntry> {
    self.entries.iter()
  }
}

impl Default for LabelTable {
  fn default() -> Self {
    Self::corn()
  }
}
