// 该文件是 Planitorium 项目的一部分。
// src/store.rs - 检测记录与照片存储
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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, decision::ClassificationResult, input::MediaType};

mod memory;
pub use self::memory::{MemoryDetectionStore, MemoryPhotoStore};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryDetectionStore, DirectoryPhotoStore};

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  SerdeError(#[from] serde_json::Error),
  #[error("存储锁已中毒")]
  Poisoned,
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 待持久化的检测：分类结果加调用方提供的元数据，id 与时间由存储分配
#[derive(Debug, Clone)]
pub struct NewDetection {
  pub plant_name: String,
  pub result: ClassificationResult,
  pub photo: Option<String>,
  pub photo_url: Option<String>,
}

/// 已持久化的检测记录，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
  pub id: String,
  pub plant_name: String,
  pub result: String,
  pub confidence: f64,
  pub suggestion: String,
  pub photo: Option<String>,
  pub photo_url: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl Detection {
  fn assign(new: NewDetection) -> Self {
    Detection {
      id: uuid::Uuid::new_v4().to_string(),
      plant_name: new.plant_name,
      result: new.result.label,
      confidence: new.result.confidence,
      suggestion: new.result.suggestion,
      photo: new.photo,
      photo_url: new.photo_url,
      created_at: Utc::now(),
    }
  }
}

/// 按创建时间倒序排列
fn newest_first(detections: &mut [Detection]) {
  detections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

pub trait DetectionStore: Send + Sync {
  fn insert(&self, detection: NewDetection) -> Result<Detection, StoreError>;
  fn get(&self, id: &str) -> Result<Option<Detection>, StoreError>;
  /// 全部记录，最新的在前
  fn list(&self) -> Result<Vec<Detection>, StoreError>;
  /// 按分类结果标签精确过滤
  fn list_by_result(&self, result: &str) -> Result<Vec<Detection>, StoreError> {
    Ok(
      self
        .list()?
        .into_iter()
        .filter(|d| d.result == result)
        .collect(),
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhoto {
  pub bytes: Vec<u8>,
  pub media_type: MediaType,
}

pub trait PhotoStore: Send + Sync {
  /// 保存照片并返回引用名
  fn put(&self, bytes: &[u8], media_type: MediaType) -> Result<String, StoreError>;
  fn get(&self, reference: &str) -> Result<Option<StoredPhoto>, StoreError>;
}

/// 检测记录与照片存储的组合，按 URL 方案选择
#[derive(Clone)]
pub struct Stores {
  pub detections: Arc<dyn DetectionStore>,
  pub photos: Arc<dyn PhotoStore>,
}

impl Stores {
  pub fn memory() -> Self {
    Self {
      detections: Arc::new(MemoryDetectionStore::default()),
      photos: Arc::new(MemoryPhotoStore::default()),
    }
  }
}

impl FromUrl for Stores {
  type Error = StoreError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    if url.scheme() == MemoryDetectionStore::SCHEME {
      return Ok(Stores::memory());
    }
    #[cfg(feature = "directory_record")]
    if url.scheme() == DirectoryDetectionStore::SCHEME {
      return Ok(Stores {
        detections: Arc::new(DirectoryDetectionStore::from_url(url)?),
        photos: Arc::new(DirectoryPhotoStore::from_url(url)?),
      });
    }
    Err(StoreError::SchemeMismatch(url.scheme().to_string()))
  }
}
