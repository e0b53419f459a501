// 该文件是 Planitorium 项目的一部分。
// src/output/record.rs - 目录记录输出
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

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  decision::ClassificationResult,
  input::RawImage,
  output::{OutputError, Render},
  store::{DetectionStore, DirectoryDetectionStore, DirectoryPhotoStore, NewDetection, PhotoStore},
};

const DEFAULT_PLANT_NAME: &str = "unnamed";

/// 把照片与检测记录写入目录存储: `folder:///dir?plant=Name&always`
///
/// 默认只记录识别成功的结果，带 `always` 时 not-a-plant 也会记录
pub struct RecordOutput {
  detections: DirectoryDetectionStore,
  photos: DirectoryPhotoStore,
  plant_name: String,
  always: bool,
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for RecordOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }

    let plant_name = url
      .query_pairs()
      .find(|(k, _)| k == "plant")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_PLANT_NAME.to_string());
    let always = url.query_pairs().any(|(k, _)| k == "always");

    Ok(RecordOutput {
      detections: DirectoryDetectionStore::from_url(url)?,
      photos: DirectoryPhotoStore::from_url(url)?,
      plant_name,
      always,
    })
  }
}

impl Render<RawImage, ClassificationResult> for RecordOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &RawImage, result: &ClassificationResult) -> Result<(), Self::Error> {
    if !self.always && !result.is_recognized() {
      return Ok(());
    }
    let photo = self.photos.put(frame.bytes(), frame.media_type())?;
    let detection = self.detections.insert(NewDetection {
      plant_name: self.plant_name.clone(),
      result: result.clone(),
      photo: Some(photo),
      photo_url: None,
    })?;
    info!(
      "记录检测 {}: {} → {} ({}%)",
      detection.id, detection.plant_name, detection.result, detection.confidence
    );
    Ok(())
  }
}
