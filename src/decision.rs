// 该文件是 Planitorium 项目的一部分。
// src/decision.rs - 模型输出后处理：softmax、阈值与标签映射
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

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  error::ClassifyError,
  labels::{LabelTable, NOT_A_PLANT_LABEL, NOT_A_PLANT_SUGGESTION},
};

/// 归一化后的类别概率分布，和为 1
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector {
  probs: Box<[f64]>,
}

impl ScoreVector {
  /// 带温度的 softmax，减去最大值保证数值稳定
  pub fn softmax(logits: &[f32], temperature: f64) -> Result<Self, ClassifyError> {
    if logits.is_empty() {
      return Err(ClassifyError::inference("模型输出为空"));
    }
    if let Some(idx) = logits.iter().position(|v| !v.is_finite()) {
      return Err(ClassifyError::inference(format!(
        "模型输出第 {} 项不是有限数: {}",
        idx, logits[idx]
      )));
    }

    let scaled: Vec<f64> = logits.iter().map(|&v| v as f64 / temperature).collect();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scaled.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();

    Ok(Self {
      probs: exps.into_iter().map(|v| v / sum).collect(),
    })
  }

  pub fn len(&self) -> usize {
    self.probs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.probs.is_empty()
  }

  pub fn as_slice(&self) -> &[f64] {
    &self.probs
  }

  /// 最大概率的类别，出现并列时取索引最小者
  pub fn argmax(&self) -> (usize, f64) {
    let mut best = (0, self.probs[0]);
    for (idx, &p) in self.probs.iter().enumerate().skip(1) {
      if p > best.1 {
        best = (idx, p);
      }
    }
    best
  }
}

/// 一次分类的最终结果，计算后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
  pub label: String,
  /// 百分比，保留两位小数
  pub confidence: f64,
  pub suggestion: String,
}

impl ClassificationResult {
  pub fn is_recognized(&self) -> bool {
    self.label != NOT_A_PLANT_LABEL
  }
}

/// 概率转百分比并四舍五入到两位小数
pub fn to_percentage(probability: f64) -> f64 {
  (probability * 100.0 * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy)]
pub struct Decision {
  /// 百分比阈值
  pub confidence_threshold: f64,
  pub temperature: f64,
}

impl Decision {
  pub fn decide(
    &self,
    logits: &[f32],
    labels: &LabelTable,
  ) -> Result<ClassificationResult, ClassifyError> {
    if logits.len() != labels.len() {
      return Err(ClassifyError::inference(format!(
        "模型输出 {} 个分数, 标签表有 {} 个类别",
        logits.len(),
        labels.len()
      )));
    }

    let scores = ScoreVector::softmax(logits, self.temperature)?;
    let (class_index, probability) = scores.argmax();
    let percentage = probability * 100.0;
    let confidence = to_percentage(probability);
    debug!(
      "候选类别 {} 概率 {:.4} (阈值 {}%)",
      class_index, probability, self.confidence_threshold
    );

    if percentage < self.confidence_threshold {
      return Ok(ClassificationResult {
        label: NOT_A_PLANT_LABEL.to_string(),
        confidence,
        suggestion: NOT_A_PLANT_SUGGESTION.to_string(),
      });
    }

    let entry = labels.get(class_index)?;
    Ok(ClassificationResult {
      label: entry.label.clone(),
      confidence,
      suggestion: entry.suggestion.clone(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPS: f64 = 1e-6;

  fn decision(threshold: f64) -> Decision {
    Decision {
      confidence_threshold: threshold,
      temperature: 1.0,
    }
  }

  #[test]
  fn softmax_sums_to_one() {
    let cases: [&[f32]; 5] = [
      &[0.0, 0.0, 0.0],
      &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
      &[-1000.0, 0.0, 1000.0],
      &[88.0, 89.0, 90.0, -90.0],
      &[0.1, 0.2, 0.05, 0.05, 0.3, 0.2, 0.1],
    ];
    for logits in cases {
      for temperature in [0.5, 1.0, 3.0] {
        let scores = ScoreVector::softmax(logits, temperature).unwrap();
        let sum: f64 = scores.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < EPS, "sum = {sum} for {logits:?}");
      }
    }
  }

  #[test]
  fn temperature_flattens_distribution() {
    let sharp = ScoreVector::softmax(&[1.0, 3.0], 1.0).unwrap().argmax().1;
    let flat = ScoreVector::softmax(&[1.0, 3.0], 10.0).unwrap().argmax().1;
    assert!(flat < sharp);
  }

  #[test]
  fn non_finite_scores_are_inference_errors() {
    assert!(matches!(
      ScoreVector::softmax(&[1.0, f32::NAN], 1.0),
      Err(ClassifyError::InferenceError(_))
    ));
    assert!(matches!(
      ScoreVector::softmax(&[], 1.0),
      Err(ClassifyError::InferenceError(_))
    ));
  }

  #[test]
  fn argmax_prefers_first_on_ties() {
    let scores = ScoreVector::softmax(&[2.0, 5.0, 5.0], 1.0).unwrap();
    assert_eq!(scores.argmax().0, 1);
  }

  #[test]
  fn above_threshold_maps_argmax_entry() {
    let labels = LabelTable::corn();
    for class in 0..labels.len() {
      let mut logits = vec![0.0f32; labels.len()];
      logits[class] = 10.0;
      let result = decision(50.0).decide(&logits, &labels).unwrap();
      let entry = labels.get(class).unwrap();
      assert_eq!(result.label, entry.label);
      assert_eq!(result.suggestion, entry.suggestion);
      assert!(result.is_recognized());
      for (other, other_entry) in labels.iter().enumerate() {
        if other != class {
          assert_ne!(result.label, other_entry.label);
        }
      }
    }
  }

  #[test]
  fn below_threshold_is_sentinel_with_real_confidence() {
    let labels = LabelTable::corn();
    // 均匀分布：每类约 14.29%
    let logits = vec![0.0f32; 7];
    let result = decision(50.0).decide(&logits, &labels).unwrap();
    assert_eq!(result.label, NOT_A_PLANT_LABEL);
    assert_eq!(result.suggestion, NOT_A_PLANT_SUGGESTION);
    assert_eq!(result.confidence, 14.29);
    assert!(!result.is_recognized());
  }

  #[test]
  fn threshold_boundary_is_inclusive() {
    let labels = LabelTable::corn();
    let logits = vec![0.0f32; 7];
    let exact = (1.0f64 / 7.0) * 100.0;
    let result = decision(exact).decide(&logits, &labels).unwrap();
    assert_eq!(result.label, "Anthracnose");
    let result = decision(exact + 0.001).decide(&logits, &labels).unwrap();
    assert_eq!(result.label, NOT_A_PLANT_LABEL);
  }

  #[test]
  fn confidence_is_rounded_percentage() {
    assert_eq!(to_percentage(0.123456), 12.35);
    assert_eq!(to_percentage(1.0), 100.0);
    assert_eq!(to_percentage(0.0), 0.0);
  }

  #[test]
  fn class_count_mismatch_is_inference_error() {
    let labels = LabelTable::corn();
    assert!(matches!(
      decision(50.0).decide(&[1.0, 2.0], &labels),
      Err(ClassifyError::InferenceError(_))
    ));
  }

  #[test]
  fn same_scores_give_identical_results() {
    let labels = LabelTable::corn();
    let logits = [0.3f32, 2.5, -1.0, 0.0, 4.2, 1.1, 0.9];
    let a = decision(30.0).decide(&logits, &labels).unwrap();
    let b = decision(30.0).decide(&logits, &labels).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
  }
}
