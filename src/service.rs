// 该文件是 Planitorium 项目的一部分。
// src/service.rs - 分类服务：模型生命周期与并发调度
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

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicBool, Ordering},
};

use tokio::sync::OnceCell;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  config::{ModelLoading, PipelineConfig},
  decision::ClassificationResult,
  error::ClassifyError,
  input::RawImage,
  labels::LabelTable,
  model::{ModelError, ModelSource, SharedModel},
  pipeline::Pipeline,
};

/// 模型加载函数，可能在阻塞线程池中被多次调用（懒加载失败后重试）
pub type ModelLoader = Arc<dyn Fn() -> Result<SharedModel, ModelError> + Send + Sync>;

/// 服务就绪状态：初始化 → 就绪；懒加载失败时为 Failed，下次调用重试。
/// 懒加载模式在首次分类请求之前为 Idle，此时可以接收请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
  Idle,
  Initializing,
  Ready,
  Failed(String),
}

impl Readiness {
  pub fn is_ready(&self) -> bool {
    matches!(self, Readiness::Ready)
  }

  /// 可以接收分类请求：已就绪，或等待首次请求触发加载
  pub fn accepts_traffic(&self) -> bool {
    matches!(self, Readiness::Ready | Readiness::Idle)
  }
}

pub struct ClassifierService {
  loader: ModelLoader,
  labels: Arc<LabelTable>,
  config: PipelineConfig,
  pipeline: OnceCell<Pipeline>,
  load_attempted: AtomicBool,
  last_error: Mutex<Option<String>>,
}

impl ClassifierService {
  pub fn new(loader: ModelLoader, labels: Arc<LabelTable>, config: PipelineConfig) -> Self {
    Self {
      loader,
      labels,
      config,
      pipeline: OnceCell::new(),
      load_attempted: AtomicBool::new(false),
      last_error: Mutex::new(None),
    }
  }

  /// 按模型 URL 构造服务，加载动作延迟到 `start` 或首次调用
  pub fn from_model_url(url: Url, labels: Arc<LabelTable>, config: PipelineConfig) -> Self {
    let loader: ModelLoader = Arc::new(move || ModelSource::from_url(&url)?.build());
    Self::new(loader, labels, config)
  }

  /// 直接使用已就绪的流水线
  pub fn with_pipeline(pipeline: Pipeline, config: PipelineConfig) -> Self {
    let labels = Arc::new(pipeline.labels().clone());
    let loader: ModelLoader = Arc::new(|| Err(ModelError::invalid("流水线已注入, 不再加载模型")));
    Self {
      loader,
      labels,
      config,
      pipeline: OnceCell::new_with(Some(pipeline)),
      load_attempted: AtomicBool::new(true),
      last_error: Mutex::new(None),
    }
  }

  /// 启动服务。预加载模式下模型加载失败直接返回错误，进程不应继续对外服务
  pub async fn start(self) -> Result<Arc<Self>, ModelError> {
    match self.config.model_loading {
      ModelLoading::Eager => {
        info!("预加载模型...");
        self.pipeline.get_or_try_init(|| self.load_pipeline()).await?;
      }
      ModelLoading::Lazy => info!("模型将在首次分类请求时加载"),
    }
    Ok(Arc::new(self))
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn readiness(&self) -> Readiness {
    if self.pipeline.initialized() {
      return Readiness::Ready;
    }
    match self.last_error.lock() {
      Ok(guard) => match guard.as_ref() {
        Some(msg) => Readiness::Failed(msg.clone()),
        None if self.config.model_loading == ModelLoading::Lazy
          && !self.load_attempted.load(Ordering::SeqCst) =>
        {
          Readiness::Idle
        }
        None => Readiness::Initializing,
      },
      Err(_) => Readiness::Failed("状态锁已中毒".to_string()),
    }
  }

  async fn load_pipeline(&self) -> Result<Pipeline, ModelError> {
    self.load_attempted.store(true, Ordering::SeqCst);
    let loader = self.loader.clone();
    let labels = self.labels.clone();
    let config = self.config.clone();
    let result = tokio::task::spawn_blocking(move || {
      let model = loader()?;
      Pipeline::new(model, labels, &config)
    })
    .await
    .unwrap_or_else(|e| Err(ModelError::BackendError(format!("模型加载任务异常: {}", e))));

    match &result {
      Ok(_) => {
        if let Ok(mut guard) = self.last_error.lock() {
          *guard = None;
        }
        info!("模型已就绪");
      }
      Err(e) => {
        error!("模型加载失败: {}", e);
        if let Ok(mut guard) = self.last_error.lock() {
          *guard = Some(e.to_string());
        }
      }
    }
    result
  }

  /// 取得就绪的流水线，必要时加载。失败不会被缓存
  pub async fn pipeline(&self) -> Result<&Pipeline, ClassifyError> {
    self
      .pipeline
      .get_or_try_init(|| self.load_pipeline())
      .await
      .map_err(|e| ClassifyError::ModelUnavailable(e.to_string()))
  }

  /// 在阻塞线程池上执行预处理与推理，并受推理超时约束
  pub async fn classify(&self, raw: RawImage) -> Result<ClassificationResult, ClassifyError> {
    let pipeline = self.pipeline().await?.clone();
    let timeout = self.config.inference_timeout;
    let task = tokio::task::spawn_blocking(move || pipeline.classify(&raw));

    match tokio::time::timeout(timeout, task).await {
      Ok(Ok(result)) => result,
      Ok(Err(e)) => {
        error!("推理任务异常: {}", e);
        Err(ClassifyError::inference(format!("推理任务异常: {}", e)))
      }
      Err(_) => {
        warn!("推理超时: {:.2?}", timeout);
        Err(ClassifyError::inference(format!("推理超时 ({:.2?})", timeout)))
      }
    }
  }
}
