// 该文件是 Dingwen （定文） 项目的一部分。
// src/model/east.rs - EAST 文本检测器后处理
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

use std::{borrow::Cow, convert::Infallible};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::TensorFrame,
  model::{
    BoxDecoder, DEFAULT_MIN_CONFIDENCE, DEFAULT_OVERLAP_THRESHOLD, DEFAULT_STRIDE, DetectResult,
    InferenceSession, Model, Suppressor,
  },
  tensor::{DetectorOutput, TensorError},
};

#[derive(Error, Debug)]
pub enum EastError {
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("推理会话错误: {0}")]
  Session(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("配置无效: {0}")]
  ConfigInvalid(String),
  #[error("模型地址必须使用 {expected} 方案, 实际为 {actual}")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
}

/// 检测器配置，可由 `east:?confidence=0.5&overlap=0.3&stride=4` 形式的地址得到
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EastDetectorBuilder {
  min_confidence: f32,
  overlap_threshold: f32,
  stride: f32,
  normalize: bool,
}

impl Default for EastDetectorBuilder {
  fn default() -> Self {
    Self {
      min_confidence: DEFAULT_MIN_CONFIDENCE,
      overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
      stride: DEFAULT_STRIDE,
      normalize: true,
    }
  }
}

impl FromUrlWithScheme for EastDetectorBuilder {
  const SCHEME: &'static str = "east";
}

fn parse_f32(key: &str, value: &str) -> Result<f32, EastError> {
  value
    .parse::<f32>()
    .map_err(|e| EastError::ConfigInvalid(format!("参数 {} 的值 '{}' 无法解析: {}", key, value, e)))
}

impl FromUrl for EastDetectorBuilder {
  type Error = EastError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "模型地址方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(EastError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let mut builder = Self::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "confidence" => builder.min_confidence = parse_f32(&key, &value)?,
        "overlap" => builder.overlap_threshold = parse_f32(&key, &value)?,
        "stride" => builder.stride = parse_f32(&key, &value)?,
        "normalize" => {
          builder.normalize = value.parse::<bool>().map_err(|_| {
            EastError::ConfigInvalid(format!("参数 normalize 的值 '{}' 不是布尔值", value))
          })?
        }
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl EastDetectorBuilder {
  pub fn min_confidence(mut self, min_confidence: f32) -> Self {
    self.min_confidence = min_confidence;
    self
  }

  pub fn overlap_threshold(mut self, overlap_threshold: f32) -> Self {
    self.overlap_threshold = overlap_threshold;
    self
  }

  pub fn stride(mut self, stride: f32) -> Self {
    self.stride = stride;
    self
  }

  pub fn normalize(mut self, normalize: bool) -> Self {
    self.normalize = normalize;
    self
  }

  fn validate(&self) -> Result<(), EastError> {
    if !(0.0..=1.0).contains(&self.min_confidence) {
      return Err(EastError::ConfigInvalid(format!(
        "置信度阈值必须在 [0, 1] 内, 实际为 {}",
        self.min_confidence
      )));
    }
    if !(0.0..=1.0).contains(&self.overlap_threshold) {
      return Err(EastError::ConfigInvalid(format!(
        "重叠阈值必须在 [0, 1] 内, 实际为 {}",
        self.overlap_threshold
      )));
    }
    if !self.stride.is_finite() || self.stride <= 0.0 {
      return Err(EastError::ConfigInvalid(format!(
        "下采样倍数必须为正数, 实际为 {}",
        self.stride
      )));
    }
    Ok(())
  }

  /// 以回放会话构建，输入为录制好的张量帧
  pub fn build(self) -> Result<EastDetector<ReplaySession>, EastError> {
    self.build_with(ReplaySession)
  }

  pub fn build_with<S: InferenceSession>(self, session: S) -> Result<EastDetector<S>, EastError> {
    self.validate()?;

    info!(
      "创建文本检测器: 置信度阈值 {}, 重叠阈值 {}, 下采样倍数 {}",
      self.min_confidence, self.overlap_threshold, self.stride
    );

    Ok(EastDetector {
      session,
      decoder: BoxDecoder::new()
        .with_min_confidence(self.min_confidence)
        .with_stride(self.stride)
        .with_normalize(self.normalize),
      suppressor: Suppressor::new(self.overlap_threshold),
    })
  }
}

/// 推理会话 + 解码 + 非极大值抑制
pub struct EastDetector<S> {
  session: S,
  decoder: BoxDecoder,
  suppressor: Suppressor,
}

impl<S> EastDetector<S> {
  pub fn decoder(&self) -> &BoxDecoder {
    &self.decoder
  }

  pub fn suppressor(&self) -> &Suppressor {
    &self.suppressor
  }

  pub fn postprocess(&self, output: &DetectorOutput) -> Result<DetectResult, EastError> {
    debug!("后处理模型输出");
    let (score, geometry) = output.grids()?;
    let candidates = self.decoder.decode(&score, &geometry)?;
    let boxes = self.suppressor.suppress(candidates);

    debug!("检测到 {} 个文本区域", boxes.len());

    Ok(DetectResult {
      rows: score.rows(),
      cols: score.cols(),
      stride: self.decoder.stride(),
      boxes,
    })
  }
}

impl<S: InferenceSession> Model for EastDetector<S> {
  type Input = S::Input;
  type Output = DetectResult;
  type Error = EastError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("执行模型推理");
    let output = self
      .session
      .run(input)
      .map_err(|e| EastError::Session(Box::new(e)))?;

    self.postprocess(&output)
  }
}

/// 直接回放帧中录制的检测器输出
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaySession;

impl InferenceSession for ReplaySession {
  type Input = TensorFrame;
  type Error = Infallible;

  fn run<'a>(&'a self, input: &'a TensorFrame) -> Result<Cow<'a, DetectorOutput>, Infallible> {
    Ok(Cow::Borrowed(&input.outputs))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::{RawTensor, TensorLayout};

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn defaults_without_query() {
    let builder = EastDetectorBuilder::from_url(&url("east:")).unwrap();
    assert_eq!(builder, EastDetectorBuilder::default());
  }

  #[test]
  fn query_overrides_thresholds() {
    let builder =
      EastDetectorBuilder::from_url(&url("east:?confidence=0.7&overlap=0.4&stride=8&normalize=false"))
        .unwrap();
    assert_eq!(
      builder,
      EastDetectorBuilder::default()
        .min_confidence(0.7)
        .overlap_threshold(0.4)
        .stride(8.0)
        .normalize(false)
    );

    let detector = builder.build().unwrap();
    assert_eq!(detector.decoder().min_confidence(), 0.7);
    assert_eq!(detector.decoder().stride(), 8.0);
    assert_eq!(detector.suppressor().overlap_threshold(), 0.4);
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    assert!(matches!(
      EastDetectorBuilder::from_url(&url("yolo:?confidence=0.5")),
      Err(EastError::SchemeMismatch { .. })
    ));
  }

  #[test]
  fn unparsable_value_is_rejected() {
    assert!(matches!(
      EastDetectorBuilder::from_url(&url("east:?confidence=high")),
      Err(EastError::ConfigInvalid(_))
    ));
  }

  #[test]
  fn out_of_range_thresholds_fail_to_build() {
    for builder in [
      EastDetectorBuilder::default().min_confidence(1.5),
      EastDetectorBuilder::default().overlap_threshold(-0.1),
      EastDetectorBuilder::default().stride(0.0),
      EastDetectorBuilder::default().min_confidence(f32::NAN),
    ] {
      assert!(matches!(builder.build(), Err(EastError::ConfigInvalid(_))));
    }
  }

  #[derive(Debug, Error)]
  #[error("会话不可用")]
  struct Unavailable;

  struct FailingSession;

  impl InferenceSession for FailingSession {
    type Input = ();
    type Error = Unavailable;

    fn run<'a>(&'a self, _input: &'a ()) -> Result<Cow<'a, DetectorOutput>, Unavailable> {
      Err(Unavailable)
    }
  }

  #[test]
  fn session_errors_are_wrapped() {
    let detector = EastDetectorBuilder::default()
      .build_with(FailingSession)
      .unwrap();
    assert!(matches!(detector.infer(&()), Err(EastError::Session(_))));
  }

  #[test]
  fn mismatched_outputs_are_reported() {
    let output = DetectorOutput {
      score: RawTensor::new([1, 1, 2, 2], TensorLayout::Nchw, vec![0.9; 4]).unwrap(),
      geometry: RawTensor::new([1, 5, 3, 2], TensorLayout::Nchw, vec![1.0; 30]).unwrap(),
    };
    let detector = EastDetectorBuilder::default().build().unwrap();
    assert!(matches!(
      detector.postprocess(&output),
      Err(EastError::Tensor(TensorError::ShapeMismatch { .. }))
    ));
  }

  #[test]
  fn overflowing_dump_is_reported() {
    let output: DetectorOutput = serde_json::from_str(
      r#"{
        "score": {"shape": [18446744073709551615, 1, 2, 1], "data": [0.9, 0.9]},
        "geometry": {"shape": [1, 5, 1, 1], "data": [1.0, 1.0, 1.0, 1.0, 0.0]}
      }"#,
    )
    .unwrap();
    let detector = EastDetectorBuilder::default().build().unwrap();
    assert!(matches!(
      detector.postprocess(&output),
      Err(EastError::Tensor(TensorError::ShapeOverflow(_)))
    ));
  }
}
