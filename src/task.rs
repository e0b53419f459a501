// 该文件是 Planitorium 项目的一部分。
// src/task.rs - 命令行任务
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

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{decision::ClassificationResult, input::RawImage, output::Render, pipeline::Pipeline};

pub trait Task<I, O>: Sized {
  type Error;
  type Output;
  fn run_task(self, input: I, pipeline: &Pipeline, output: O) -> Result<Self::Output, Self::Error>;
}

pub struct OneShotTask;

impl<RE, I, O> Task<I, O> for OneShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RawImage>,
  O: Render<RawImage, ClassificationResult, Error = RE>,
{
  type Error = anyhow::Error;
  type Output = ClassificationResult;

  fn run_task(self, mut input: I, pipeline: &Pipeline, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功 ({} 字节, {})，开始分类...", image.len(), image.media_type());
    let now = Instant::now();
    let result = pipeline.classify(&image)?;
    info!("分类完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&image, &result)?;
    info!("输出完成: {} ({}%)", result.label, result.confidence);

    Ok(result)
  }
}

/// 延迟统计中跳过的预热次数
const WARMUP_RUNS: usize = 2;

/// 对同一张图像重复分类，统计平均耗时并校验每次结果完全一致
pub struct RepeatShotTask {
  repeat: usize,
}

impl RepeatShotTask {
  pub fn new(repeat: usize) -> Self {
    Self {
      repeat: repeat.max(1),
    }
  }
}

#[derive(Debug, Clone)]
pub struct RepeatShotReport {
  pub result: ClassificationResult,
  pub runs: usize,
  pub average: Duration,
}

impl<RE, I, O> Task<I, O> for RepeatShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RawImage>,
  O: Render<RawImage, ClassificationResult, Error = RE>,
{
  type Error = anyhow::Error;
  type Output = RepeatShotReport;

  fn run_task(self, mut input: I, pipeline: &Pipeline, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，重复分类 {} 次...", self.repeat);

    let mut first: Option<ClassificationResult> = None;
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = pipeline.classify(&image)?;
      let elapsed = now.elapsed();
      info!("({})分类完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);

      match &first {
        None => {
          output.render_result(&image, &result)?;
          first = Some(result);
        }
        Some(expected) if *expected != result => {
          anyhow::bail!("第 {} 次结果与首次不一致: {:?} != {:?}", i, result, expected);
        }
        Some(_) => {}
      }
    }

    let measured = if times.len() > WARMUP_RUNS {
      &times[WARMUP_RUNS..]
    } else {
      &times[..]
    };
    let average = measured.iter().sum::<Duration>() / measured.len() as u32;
    warn!("平均分类时间: {:.2?} ({} 次)", average, measured.len());

    let result = first.ok_or_else(|| anyhow::anyhow!("没有执行任何分类"))?;
    Ok(RepeatShotReport {
      result,
      runs: times.len(),
      average,
    })
  }
}
