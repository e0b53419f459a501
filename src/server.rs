// 该文件是 Planitorium 项目的一部分。
// src/server.rs - HTTP 服务
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

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, State},
  http::StatusCode,
  response::IntoResponse,
  routing::{get, post},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
  config::PipelineConfig,
  service::{ClassifierService, Readiness},
  store::Stores,
};

mod detection;
mod error;
pub use self::error::ApiError;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// 响应信封: `{ "error": bool, "message": str, "data": ... }`
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  pub error: bool,
  pub message: String,
  pub data: Option<T>,
}

impl<T> Envelope<T> {
  pub fn success(message: impl Into<String>, data: T) -> Self {
    Self {
      error: false,
      message: message.into(),
      data: Some(data),
    }
  }

  pub fn failure(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      data: None,
    }
  }
}

#[derive(Clone)]
pub struct AppState {
  pub service: Arc<ClassifierService>,
  pub stores: Stores,
  pub public_base_url: String,
}

impl AppState {
  pub fn new(service: Arc<ClassifierService>, stores: Stores, public_base_url: impl Into<String>) -> Self {
    Self {
      service,
      stores,
      public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
    }
  }

  fn photo_url(&self, reference: &str) -> String {
    format!("{}/api/detection/photo/{}", self.public_base_url, reference)
  }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
  // 路径参数使用 axum 0.7 的 `:param` / `*rest` 语法
  let detection = Router::new()
    .route("/add", post(detection::add))
    .route("/list", get(detection::list))
    .route("/list/filter", get(detection::filter))
    .route("/detail/:id", get(detection::detail))
    .route("/photo/*reference", get(detection::photo));

  Router::new()
    .route("/health", get(health))
    .nest("/api/detection", detection)
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthStatus<'a> {
  status: &'static str,
  config: &'a PipelineConfig,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
  let readiness = state.service.readiness();
  let (code, status, message) = match &readiness {
    Readiness::Ready => (StatusCode::OK, "ready", "Model is ready".to_string()),
    Readiness::Idle => (
      StatusCode::OK,
      "idle",
      "Model will load on the first classification".to_string(),
    ),
    Readiness::Initializing => (
      StatusCode::SERVICE_UNAVAILABLE,
      "initializing",
      "Model is not loaded yet".to_string(),
    ),
    Readiness::Failed(e) => (
      StatusCode::SERVICE_UNAVAILABLE,
      "failed",
      format!("Model failed to load: {}", e),
    ),
  };
  let body = Envelope {
    error: !readiness.accepts_traffic(),
    message,
    data: Some(HealthStatus {
      status,
      config: state.service.config(),
    }),
  };
  (code, Json(body)).into_response()
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("收到中断信号，准备退出..."),
    Err(e) => warn!("无法监听中断信号: {}", e),
  }
}

/// 在给定监听器上提供服务，直到收到 Ctrl-C
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
  info!("HTTP 服务监听于 {}", listener.local_addr()?);
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!("HTTP 服务已停止");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, header},
  };
  use http_body_util::BodyExt;
  use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
  use serde_json::Value;
  use tower::ServiceExt;

  use crate::{
    config::ModelLoading,
    frame::InputShape,
    labels::{LabelTable, NOT_A_PLANT_LABEL},
    model::{MockModel, ModelError, SharedModel},
    pipeline::Pipeline,
    service::ModelLoader,
  };

  const BOUNDARY: &str = "planitorium-test-boundary";

  fn app_with(model: MockModel) -> Router {
    let model: SharedModel = Arc::new(model);
    let pipeline = Pipeline::new(
      model,
      Arc::new(LabelTable::corn()),
      &PipelineConfig::default(),
    )
    .unwrap();
    let service = Arc::new(ClassifierService::with_pipeline(
      pipeline,
      PipelineConfig::default(),
    ));
    router(
      AppState::new(service, Stores::memory(), "http://localhost:3000/"),
      DEFAULT_MAX_UPLOAD_BYTES,
    )
  }

  fn app() -> Router {
    app_with(MockModel::confident(InputShape::square(224), 7, 6))
  }

  async fn unavailable_app() -> Router {
    let loader: ModelLoader = Arc::new(|| Err(ModelError::invalid("模型文件损坏")));
    let config = PipelineConfig {
      model_loading: ModelLoading::Lazy,
      ..Default::default()
    };
    let service = ClassifierService::new(loader, Arc::new(LabelTable::corn()), config)
      .start()
      .await
      .unwrap();
    router(
      AppState::new(service, Stores::memory(), "http://localhost:3000"),
      DEFAULT_MAX_UPLOAD_BYTES,
    )
  }

  fn jpeg(size: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(size, size, Rgb([128, 128, 128]));
    let mut buf = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
      .write_to(&mut buf, ImageFormat::Jpeg)
      .unwrap();
    buf.into_inner()
  }

  fn upload(plant: Option<&str>, photo: Option<(&str, Vec<u8>)>) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(name) = plant {
      body.extend_from_slice(
        format!(
          "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"plantName\"\r\n\r\n{name}\r\n"
        )
        .as_bytes(),
      );
    }
    if let Some((mime, bytes)) = photo {
      body.extend_from_slice(
        format!(
          "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"leaf\"\r\nContent-Type: {mime}\r\n\r\n"
        )
        .as_bytes(),
      );
      body.extend_from_slice(&bytes);
      body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
      .method("POST")
      .uri("/api/detection/add")
      .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
      )
      .body(Body::from(body))
      .unwrap()
  }

  fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
  }

  async fn json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn health_reports_ready() {
    let response = app().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["error"], false);
    assert_eq!(body["data"]["status"], "ready");
    assert_eq!(body["data"]["config"]["confidence_threshold"], 50.0);
  }

  #[tokio::test]
  async fn lazy_health_is_idle_until_first_load() {
    let app = unavailable_app().await;
    let response = app.clone().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["error"], false);
    assert_eq!(body["data"]["status"], "idle");

    let response = app
      .clone()
      .oneshot(upload(Some("Jagung"), Some(("image/jpeg", jpeg(32)))))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(response).await["data"]["status"], "failed");
  }

  #[tokio::test]
  async fn add_then_read_back() {
    let app = app();
    let photo = jpeg(300);
    let response = app
      .clone()
      .oneshot(upload(Some("Jagung"), Some(("image/jpeg", photo.clone()))))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json(response).await;
    assert_eq!(body["error"], false);
    let detection = &body["data"];
    assert_eq!(detection["plantName"], "Jagung");
    assert_eq!(detection["result"], "Common Rust");
    let id = detection["id"].as_str().unwrap().to_string();
    let reference = detection["photo"].as_str().unwrap().to_string();
    assert_eq!(
      detection["photoUrl"],
      format!("http://localhost:3000/api/detection/photo/{}", reference)
    );

    let response = app.clone().oneshot(get_request("/api/detection/list")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["data"].as_array().unwrap().len(), 1);

    let response = app
      .clone()
      .oneshot(get_request(&format!("/api/detection/detail/{}", id)))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["data"]["id"], id.as_str());

    let response = app
      .clone()
      .oneshot(get_request("/api/detection/list/filter?result=Common%20Rust"))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
      .oneshot(get_request(&format!("/api/detection/photo/{}", reference)))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), photo.as_slice());
  }

  #[tokio::test]
  async fn uncertain_upload_is_stored_as_not_a_plant() {
    let app = app_with(MockModel::new(InputShape::square(224), vec![0.0; 7]));
    let response = app
      .oneshot(upload(Some("Mystery"), Some(("image/jpeg", jpeg(64)))))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json(response).await;
    assert_eq!(body["data"]["result"], NOT_A_PLANT_LABEL);
    assert_eq!(body["data"]["confidence"], 14.29);
  }

  #[tokio::test]
  async fn text_upload_is_unsupported_media_type() {
    let response = app()
      .oneshot(upload(Some("Jagung"), Some(("text/plain", b"hello".to_vec()))))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = json(response).await;
    assert_eq!(body["error"], true);
    assert_eq!(
      body["message"],
      "Unsupported media type: text/plain. Only JPEG and PNG photos are accepted"
    );
  }

  #[tokio::test]
  async fn inference_failure_is_internal_error_without_detection() {
    // 预热推理成功，之后的推理全部失败
    let app = app_with(
      MockModel::confident(InputShape::square(224), 7, 3).failing_after(1, "推理后端崩溃"),
    );
    let response = app
      .clone()
      .oneshot(upload(Some("Jagung"), Some(("image/jpeg", jpeg(64)))))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(response).await;
    assert_eq!(body["message"], "Classification failed");
    assert!(body["data"].is_null());

    let response = app.oneshot(get_request("/api/detection/list")).await.unwrap();
    assert!(json(response).await["data"].as_array().unwrap().is_empty());
  }

  #[tokio::test]
  async fn corrupt_jpeg_is_unprocessable() {
    let app = app();
    let response = app
      .clone()
      .oneshot(upload(Some("Jagung"), Some(("image/jpeg", b"\xff\xd8\xffgarbage".to_vec()))))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json(response).await["message"], "Image could not be decoded");

    // 截断的照片同样拒绝
    let photo = jpeg(300);
    let response = app
      .clone()
      .oneshot(upload(
        Some("Jagung"),
        Some(("image/jpeg", photo[..photo.len() / 2].to_vec())),
      ))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // 分类失败时不保存任何记录
    let response = app.oneshot(get_request("/api/detection/list")).await.unwrap();
    assert!(json(response).await["data"].as_array().unwrap().is_empty());
  }

  #[tokio::test]
  async fn missing_fields_are_bad_request() {
    let photo = jpeg(32);
    let response = app()
      .oneshot(upload(None, Some(("image/jpeg", photo.clone()))))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["message"], "Plant name is required");

    let response = app().oneshot(upload(Some("Jagung"), None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn unavailable_model_is_service_unavailable() {
    let response = unavailable_app()
      .await
      .oneshot(upload(Some("Jagung"), Some(("image/jpeg", jpeg(32)))))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
  }

  #[tokio::test]
  async fn oversized_upload_is_rejected() {
    let model: SharedModel = Arc::new(MockModel::confident(InputShape::square(224), 7, 1));
    let pipeline = Pipeline::new(
      model,
      Arc::new(LabelTable::corn()),
      &PipelineConfig::default(),
    )
    .unwrap();
    let service = Arc::new(ClassifierService::with_pipeline(
      pipeline,
      PipelineConfig::default(),
    ));
    let app = router(AppState::new(service, Stores::memory(), ""), 1024);
    let response = app
      .oneshot(upload(Some("Jagung"), Some(("image/jpeg", vec![0u8; 4096]))))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
  }

  #[tokio::test]
  async fn filter_requires_result_and_matches() {
    let response = app().oneshot(get_request("/api/detection/list/filter")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app()
      .oneshot(get_request("/api/detection/list/filter?result=Stalk%20Rot"))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn unknown_ids_are_not_found() {
    let response = app()
      .oneshot(get_request("/api/detection/detail/does-not-exist"))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app()
      .oneshot(get_request("/api/detection/photo/2026/01/01/missing.jpg"))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }
}
