// 该文件是 Planitorium 项目的一部分。
// src/server/detection.rs - 检测接口
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

use axum::{
  Json,
  extract::{Multipart, Path, Query, State},
  http::{StatusCode, header},
  response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
  input::RawImage,
  server::{AppState, Envelope, error::ApiError},
  store::{Detection, NewDetection, StoreError},
};

const PLANT_NAME_FIELD: &str = "plantName";
const PHOTO_FIELD: &str = "photo";

/// 在阻塞线程池上执行存储操作
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| ApiError::Internal(format!("存储任务异常: {}", e)))?
    .map_err(ApiError::from)
}

struct Upload {
  plant_name: String,
  photo: RawImage,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
  let mut plant_name = None;
  let mut photo = None;

  while let Some(field) = multipart.next_field().await? {
    let name = field.name().map(str::to_string);
    match name.as_deref() {
      Some(PLANT_NAME_FIELD) => plant_name = Some(field.text().await?),
      Some(PHOTO_FIELD) => {
        // 未声明类型的文件按不支持的媒体类型处理
        let mime = field
          .content_type()
          .unwrap_or("application/octet-stream")
          .to_string();
        let bytes = field.bytes().await?;
        debug!("收到照片: {} 字节, {}", bytes.len(), mime);
        photo = Some((bytes, mime));
      }
      other => debug!("忽略表单字段: {:?}", other),
    }
  }

  let plant_name = plant_name
    .map(|name| name.trim().to_string())
    .filter(|name| !name.is_empty())
    .ok_or_else(|| ApiError::BadRequest("Plant name is required".to_string()))?;
  let (bytes, mime) =
    photo.ok_or_else(|| ApiError::BadRequest("Photo is required".to_string()))?;

  Ok(Upload {
    plant_name,
    photo: RawImage::new(bytes.to_vec(), &mime)?,
  })
}

/// `POST /api/detection/add`
pub async fn add(
  State(state): State<AppState>,
  multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
  let Upload { plant_name, photo } = read_upload(multipart).await?;

  // 先分类后存照片，分类失败不会留下孤立的照片
  let result = state.service.classify(photo.clone()).await?;

  let photos = state.stores.photos.clone();
  let reference = blocking(move || photos.put(photo.bytes(), photo.media_type())).await?;
  let photo_url = state.photo_url(&reference);

  let detections = state.stores.detections.clone();
  let detection = blocking(move || {
    detections.insert(NewDetection {
      plant_name,
      result,
      photo: Some(reference),
      photo_url: Some(photo_url),
    })
  })
  .await?;
  info!(
    "新增检测 {}: {} → {} ({}%)",
    detection.id, detection.plant_name, detection.result, detection.confidence
  );

  Ok((
    StatusCode::CREATED,
    Json(Envelope::success("Detection added successfully", detection)),
  ))
}

/// `GET /api/detection/list`
pub async fn list(State(state): State<AppState>) -> Result<Json<Envelope<Vec<Detection>>>, ApiError> {
  let detections = state.stores.detections.clone();
  let all = blocking(move || detections.list()).await?;
  Ok(Json(Envelope::success("Detections retrieved successfully", all)))
}

#[derive(Debug, Deserialize)]
pub struct FilterQuery {
  result: Option<String>,
}

/// `GET /api/detection/list/filter?result=<label>`
pub async fn filter(
  State(state): State<AppState>,
  Query(query): Query<FilterQuery>,
) -> Result<Json<Envelope<Vec<Detection>>>, ApiError> {
  let result = query
    .result
    .filter(|r| !r.is_empty())
    .ok_or_else(|| ApiError::BadRequest("Result query parameter is required".to_string()))?;

  let detections = state.stores.detections.clone();
  let label = result.clone();
  let matched = blocking(move || detections.list_by_result(&label)).await?;
  if matched.is_empty() {
    return Err(ApiError::NotFound(format!(
      "No detections found with result: {}",
      result
    )));
  }
  Ok(Json(Envelope::success(
    "Detections retrieved successfully",
    matched,
  )))
}

/// `GET /api/detection/detail/:id`
pub async fn detail(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<Envelope<Detection>>, ApiError> {
  let detections = state.stores.detections.clone();
  let found = blocking(move || detections.get(&id)).await?;
  let detection = found.ok_or_else(|| ApiError::NotFound("Detection not found".to_string()))?;
  Ok(Json(Envelope::success(
    "Detection retrieved successfully",
    detection,
  )))
}

/// `GET /api/detection/photo/*reference`
pub async fn photo(
  State(state): State<AppState>,
  Path(reference): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
  let photos = state.stores.photos.clone();
  let found = blocking(move || photos.get(&reference)).await?;
  let photo = found.ok_or_else(|| ApiError::NotFound("Photo not found".to_string()))?;
  Ok((
    [(header::CONTENT_TYPE, photo.media_type.mime())],
    photo.bytes,
  ))
}
