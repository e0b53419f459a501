// 该文件是 Planitorium 项目的一部分。
// src/store/directory_record.rs - 目录存储
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
  path::{Component, Path, PathBuf},
  sync::Mutex,
};

use chrono::{Datelike, Utc};
use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::MediaType,
  store::{
    Detection, DetectionStore, NewDetection, PhotoStore, StoreError, StoredPhoto, newest_first,
  },
};

const DETECTIONS_DIR: &str = "detections";
const PHOTOS_DIR: &str = "photos";

fn root_from_url(url: &url::Url, scheme: &str) -> Result<PathBuf, StoreError> {
  if url.scheme() != scheme {
    return Err(StoreError::SchemeMismatch(url.scheme().to_string()));
  }
  Ok(PathBuf::from(url.path()))
}

/// 每条检测记录一个 JSON 文件: `<root>/detections/<id>.json`
pub struct DirectoryDetectionStore {
  directory: PathBuf,
}

impl FromUrlWithScheme for DirectoryDetectionStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryDetectionStore {
  type Error = StoreError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    Self::open(root_from_url(url, Self::SCHEME)?)
  }
}

impl DirectoryDetectionStore {
  pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
    let directory = root.as_ref().join(DETECTIONS_DIR);
    std::fs::create_dir_all(&directory)?;
    Ok(Self { directory })
  }

  fn record_path(&self, id: &str) -> Option<PathBuf> {
    // id 只能是 uuid 形式，避免被拼接成任意路径
    uuid::Uuid::parse_str(id)
      .ok()
      .map(|_| self.directory.join(format!("{}.json", id)))
  }
}

impl DetectionStore for DirectoryDetectionStore {
  fn insert(&self, detection: NewDetection) -> Result<Detection, StoreError> {
    let detection = Detection::assign(detection);
    let path = self.directory.join(format!("{}.json", detection.id));
    std::fs::write(&path, serde_json::to_vec_pretty(&detection)?)?;
    debug!("保存检测记录: {}", path.display());
    Ok(detection)
  }

  fn get(&self, id: &str) -> Result<Option<Detection>, StoreError> {
    let Some(path) = self.record_path(id) else {
      return Ok(None);
    };
    match std::fs::read(&path) {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  fn list(&self) -> Result<Vec<Detection>, StoreError> {
    let mut detections = Vec::new();
    for entry in std::fs::read_dir(&self.directory)? {
      let path = entry?.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      match serde_json::from_slice(&std::fs::read(&path)?) {
        Ok(detection) => detections.push(detection),
        Err(e) => warn!("跳过无法解析的记录 {}: {}", path.display(), e),
      }
    }
    newest_first(&mut detections);
    Ok(detections)
  }
}

/// 照片按日期分目录保存: `<root>/photos/YYYY/MM/DD/HH-MM-SS-XXXX-<uuid>.<ext>`，
/// 引用名为相对 `photos/` 的路径
pub struct DirectoryPhotoStore {
  directory: PathBuf,
  photo_counter: Mutex<u16>,
}

impl FromUrlWithScheme for DirectoryPhotoStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryPhotoStore {
  type Error = StoreError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    Self::open(root_from_url(url, Self::SCHEME)?)
  }
}

impl DirectoryPhotoStore {
  pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
    let directory = root.as_ref().join(PHOTOS_DIR);
    std::fs::create_dir_all(&directory)?;
    Ok(Self {
      directory,
      photo_counter: Mutex::new(0),
    })
  }

  fn photo_id(&self) -> Result<u16, StoreError> {
    let mut counter = self.photo_counter.lock().map_err(|_| StoreError::Poisoned)?;
    *counter = counter.wrapping_add(1);
    Ok(*counter)
  }

  fn photo_reference(&self, media_type: MediaType) -> Result<PathBuf, StoreError> {
    let now = Utc::now();
    let day = PathBuf::from(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(self.directory.join(&day))?;

    Ok(day.join(format!(
      "{}-{:04X}-{}.{}",
      now.format("%H-%M-%S"),
      self.photo_id()?,
      uuid::Uuid::new_v4().simple(),
      media_type.extension()
    )))
  }

  /// 引用名只允许普通路径分量，拒绝 `..`、绝对路径等
  fn resolve(&self, reference: &str) -> Option<PathBuf> {
    let relative = Path::new(reference);
    let normal = relative.components().count() > 0
      && relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    normal.then(|| self.directory.join(relative))
  }
}

impl PhotoStore for DirectoryPhotoStore {
  fn put(&self, bytes: &[u8], media_type: MediaType) -> Result<String, StoreError> {
    let reference = self.photo_reference(media_type)?;
    std::fs::write(self.directory.join(&reference), bytes)?;
    let reference = reference
      .components()
      .filter_map(|c| c.as_os_str().to_str())
      .collect::<Vec<_>>()
      .join("/");
    debug!("保存照片: {}", reference);
    Ok(reference)
  }

  fn get(&self, reference: &str) -> Result<Option<StoredPhoto>, StoreError> {
    let Some(path) = self.resolve(reference) else {
      warn!("拒绝非法照片引用: {}", reference);
      return Ok(None);
    };
    let Some(media_type) = MediaType::from_extension(&path) else {
      return Ok(None);
    };
    match std::fs::read(&path) {
      Ok(bytes) => Ok(Some(StoredPhoto { bytes, media_type })),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decision::ClassificationResult;

  fn new_detection(label: &str) -> NewDetection {
    NewDetection {
      plant_name: "Jagung".to_string(),
      result: ClassificationResult {
        label: label.to_string(),
        confidence: 91.37,
        suggestion: "ok".to_string(),
      },
      photo: Some("2026/10/19/x.jpg".to_string()),
      photo_url: Some("http://localhost/api/detection/photo/2026/10/19/x.jpg".to_string()),
    }
  }

  #[test]
  fn detections_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryDetectionStore::open(dir.path()).unwrap();
    let first = store.insert(new_detection("Common Rust")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = store.insert(new_detection("Leaf Blight")).unwrap();

    let reopened = DirectoryDetectionStore::open(dir.path()).unwrap();
    assert_eq!(reopened.get(&first.id).unwrap(), Some(first.clone()));
    let all = reopened.list().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second.id);
    assert_eq!(reopened.list_by_result("Leaf Blight").unwrap().len(), 1);
  }

  #[test]
  fn non_uuid_id_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryDetectionStore::open(dir.path()).unwrap();
    assert!(store.get("../../etc/passwd").unwrap().is_none());
    assert!(
      store
        .get("6f1c1e2a-8a7b-4c59-9d3e-2b1b0b7f0c11")
        .unwrap()
        .is_none()
    );
  }

  #[test]
  fn photos_are_stored_by_date() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryPhotoStore::open(dir.path()).unwrap();
    let reference = store.put(b"jpeg bytes", MediaType::Jpeg).unwrap();

    let now = Utc::now();
    assert!(reference.starts_with(&format!("{}/{:02}/", now.year(), now.month())));
    assert!(reference.ends_with(".jpg"));
    assert!(dir.path().join(PHOTOS_DIR).join(&reference).is_file());

    let photo = store.get(&reference).unwrap().unwrap();
    assert_eq!(photo.bytes, b"jpeg bytes");
    assert_eq!(photo.media_type, MediaType::Jpeg);
  }

  #[test]
  fn traversal_references_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("secret.png"), b"x").unwrap();
    let store = DirectoryPhotoStore::open(dir.path()).unwrap();
    assert!(store.get("../secret.png").unwrap().is_none());
    assert!(store.get("/etc/hosts.png").unwrap().is_none());
    assert!(store.get("").unwrap().is_none());
  }

  #[test]
  fn opens_from_folder_url() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::from_directory_path(dir.path()).unwrap();
    let url = url::Url::parse(&url.as_str().replacen("file:", "folder:", 1)).unwrap();
    assert!(DirectoryPhotoStore::from_url(&url).is_ok());
    assert!(dir.path().join(PHOTOS_DIR).is_dir());
  }
}
