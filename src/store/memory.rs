// 该文件是 Planitorium 项目的一部分。
// src/store/memory.rs - 进程内存储
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

use std::{collections::HashMap, sync::RwLock};

use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::MediaType,
  store::{
    Detection, DetectionStore, NewDetection, PhotoStore, StoreError, StoredPhoto, newest_first,
  },
};

#[derive(Default)]
pub struct MemoryDetectionStore {
  records: RwLock<Vec<Detection>>,
}

impl FromUrlWithScheme for MemoryDetectionStore {
  const SCHEME: &'static str = "memory";
}

impl FromUrl for MemoryDetectionStore {
  type Error = StoreError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StoreError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::default())
  }
}

impl DetectionStore for MemoryDetectionStore {
  fn insert(&self, detection: NewDetection) -> Result<Detection, StoreError> {
    let detection = Detection::assign(detection);
    self
      .records
      .write()
      .map_err(|_| StoreError::Poisoned)?
      .push(detection.clone());
    debug!("保存检测记录: {}", detection.id);
    Ok(detection)
  }

  fn get(&self, id: &str) -> Result<Option<Detection>, StoreError> {
    let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
    Ok(records.iter().find(|d| d.id == id).cloned())
  }

  fn list(&self) -> Result<Vec<Detection>, StoreError> {
    let mut records = self
      .records
      .read()
      .map_err(|_| StoreError::Poisoned)?
      .clone();
    newest_first(&mut records);
    Ok(records)
  }
}

#[derive(Default)]
pub struct MemoryPhotoStore {
  photos: RwLock<HashMap<String, StoredPhoto>>,
}

impl PhotoStore for MemoryPhotoStore {
  fn put(&self, bytes: &[u8], media_type: MediaType) -> Result<String, StoreError> {
    let reference = format!("{}.{}", uuid::Uuid::new_v4().simple(), media_type.extension());
    self.photos.write().map_err(|_| StoreError::Poisoned)?.insert(
      reference.clone(),
      StoredPhoto {
        bytes: bytes.to_vec(),
        media_type,
      },
    );
    Ok(reference)
  }

  fn get(&self, reference: &str) -> Result<Option<StoredPhoto>, StoreError> {
    let photos = self.photos.read().map_err(|_| StoreError::Poisoned)?;
    Ok(photos.get(reference).cloned())
  }
}
