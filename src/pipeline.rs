// 该文件是 Planitorium 项目的一部分。
// src/pipeline.rs - 分类流水线：预处理 → 推理 → 判定
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

use tracing::{debug, info};

use crate::{
  config::PipelineConfig,
  decision::{ClassificationResult, Decision},
  error::ClassifyError,
  frame::NhwcTensor,
  input::RawImage,
  labels::LabelTable,
  model::{ModelError, SharedModel},
  preprocess::Preprocessor,
};

/// 已就绪的分类流水线，除共享只读模型外不保留任何状态
#[derive(Clone)]
pub struct Pipeline {
  model: SharedModel,
  labels: Arc<LabelTable>,
  preprocessor: Preprocessor,
  decision: Decision,
}

impl Pipeline {
  /// 组装流水线，并用一次全零输入预热校验模型输出类别数与标签表一致
  pub fn new(
    model: SharedModel,
    labels: Arc<LabelTable>,
    config: &PipelineConfig,
  ) -> Result<Self, ModelError> {
    let shape = model.input_shape();
    let warmup = model
      .infer(&NhwcTensor::zeros(shape))
      .map_err(ModelError::WarmupFailed)?;
    labels.ensure_class_count(warmup.len())?;
    info!(
      "流水线就绪: 输入 {}, {} 个类别, 阈值 {}%",
      shape,
      labels.len(),
      config.confidence_threshold
    );

    Ok(Self {
      model,
      labels,
      preprocessor: Preprocessor::new(shape, config.resize_filter, config.normalization),
      decision: Decision {
        confidence_threshold: config.confidence_threshold,
        temperature: config.temperature,
      },
    })
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn preprocess(&self, raw: &RawImage) -> Result<NhwcTensor, ClassifyError> {
    self.preprocessor.run(raw)
  }

  /// 对已预处理的张量推理并判定
  pub fn classify_tensor(&self, tensor: &NhwcTensor) -> Result<ClassificationResult, ClassifyError> {
    let scores = self.model.infer(tensor)?;
    debug!("模型原始输出: {:?}", scores);
    self.decision.decide(&scores, &self.labels)
  }

  /// 同步执行完整流水线，会阻塞当前线程
  pub fn classify(&self, raw: &RawImage) -> Result<ClassificationResult, ClassifyError> {
    let tensor = self.preprocess(raw)?;
    self.classify_tensor(&tensor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::InputShape,
    labels::NOT_A_PLANT_LABEL,
    model::{Model, MockModel},
  };
  use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

  fn gray_jpeg(size: u32) -> RawImage {
    let image = RgbImage::from_pixel(size, size, Rgb([128, 128, 128]));
    let mut buf = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
      .write_to(&mut buf, ImageFormat::Jpeg)
      .unwrap();
    RawImage::new(buf.into_inner(), "image/jpeg").unwrap()
  }

  fn pipeline(model: MockModel) -> Pipeline {
    Pipeline::new(
      Arc::new(model),
      Arc::new(LabelTable::corn()),
      &PipelineConfig::default(),
    )
    .unwrap()
  }

  #[test]
  fn end_to_end_with_confident_model() {
    let pipeline = pipeline(MockModel::confident(InputShape::square(224), 7, 6));
    let result = pipeline.classify(&gray_jpeg(300)).unwrap();
    assert_eq!(result.label, "Common Rust");
    assert!(result.confidence > 99.0);
  }

  #[test]
  fn uniform_output_is_not_a_plant() {
    let pipeline = pipeline(MockModel::new(InputShape::square(256), vec![1.0; 7]));
    let result = pipeline.classify(&gray_jpeg(300)).unwrap();
    assert_eq!(result.label, NOT_A_PLANT_LABEL);
    assert_eq!(result.confidence, 14.29);
  }

  #[test]
  fn same_tensor_twice_is_bit_identical() {
    let pipeline = pipeline(MockModel::new(
      InputShape::square(224),
      vec![0.3, 2.5, -1.0, 0.0, 4.2, 1.1, 0.9],
    ));
    let tensor = pipeline.preprocess(&gray_jpeg(300)).unwrap();
    let a = pipeline.classify_tensor(&tensor).unwrap();
    let b = pipeline.classify_tensor(&tensor).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
  }

  #[test]
  fn class_count_mismatch_fails_at_construction() {
    let model: SharedModel = Arc::new(MockModel::confident(InputShape::square(224), 80, 0));
    let err = Pipeline::new(model, Arc::new(LabelTable::corn()), &PipelineConfig::default())
      .err()
      .unwrap();
    assert!(matches!(err, ModelError::LabelMismatch(_)));
  }

  #[test]
  fn failing_model_fails_warmup() {
    let model: SharedModel =
      Arc::new(MockModel::new(InputShape::square(224), vec![0.0; 7]).failing("后端不可用"));
    let err = Pipeline::new(model, Arc::new(LabelTable::corn()), &PipelineConfig::default())
      .err()
      .unwrap();
    assert!(matches!(err, ModelError::WarmupFailed(_)));
  }

  #[test]
  fn model_is_shared_read_only() {
    let model = Arc::new(MockModel::confident(InputShape::square(224), 7, 1));
    let pipeline = Pipeline::new(
      model.clone(),
      Arc::new(LabelTable::corn()),
      &PipelineConfig::default(),
    )
    .unwrap();
    let raw = gray_jpeg(64);
    std::thread::scope(|s| {
      for _ in 0..4 {
        s.spawn(|| pipeline.classify(&raw).unwrap());
      }
    });
    // 预热 1 次 + 4 次并发推理
    assert_eq!(model.calls(), 5);
    assert_eq!(model.input_shape(), InputShape::square(224));
  }
}
