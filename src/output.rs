// 该文件是 Dingwen （定文） 项目的一部分。
// src/output.rs - 输出定义
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

use std::num::ParseIntError;

use crate::FromUrl;
use crate::FromUrlWithScheme;
use crate::input::TensorFrame;
use crate::model::{Candidate, DetectResult};
use thiserror::Error;
use url::Url;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// 从查询参数 `width`、`height` 读取原图尺寸，两者须同时给出
fn image_size(url: &Url) -> Result<Option<(u32, u32)>, ParseIntError> {
  let mut width = None;
  let mut height = None;
  for (k, v) in url.query_pairs() {
    match k.as_ref() {
      "width" => width = Some(v.parse::<u32>()?),
      "height" => height = Some(v.parse::<u32>()?),
      _ => {}
    }
  }
  Ok(width.zip(height))
}

/// 给定原图尺寸时映射到原图坐标，否则保留检测器输入坐标
fn boxes_for_output(result: &DetectResult, image_size: Option<(u32, u32)>) -> Vec<Candidate> {
  match image_size {
    Some((width, height)) => result.to_image_space(width, height),
    None => result.boxes.as_slice().to_vec(),
  }
}

mod log_output;
pub use self::log_output::{LogOutput, LogOutputError};

#[cfg(feature = "record_file")]
mod record_file;
#[cfg(feature = "record_file")]
pub use self::record_file::{RecordFileOutput, RecordFileOutputError};

#[cfg(feature = "jsonl_output")]
mod jsonl_output;
#[cfg(feature = "jsonl_output")]
pub use self::jsonl_output::{JsonLinesOutput, JsonLinesOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("日志输出错误: {0}")]
  LogOutputError(#[from] LogOutputError),
  #[cfg(feature = "record_file")]
  #[error("记录文件输出错误: {0}")]
  RecordFileOutputError(#[from] RecordFileOutputError),
  #[cfg(feature = "jsonl_output")]
  #[error("JSON Lines 输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  LogOutput(LogOutput),
  #[cfg(feature = "record_file")]
  RecordFileOutput(RecordFileOutput),
  #[cfg(feature = "jsonl_output")]
  JsonLinesOutput(JsonLinesOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => {
        let output = LogOutput::from_url(url)?;
        Ok(OutputWrapper::LogOutput(output))
      }
      #[cfg(feature = "record_file")]
      RecordFileOutput::SCHEME => {
        let output = RecordFileOutput::from_url(url)?;
        Ok(OutputWrapper::RecordFileOutput(output))
      }
      #[cfg(feature = "jsonl_output")]
      JsonLinesOutput::SCHEME => {
        let output = JsonLinesOutput::from_url(url)?;
        Ok(OutputWrapper::JsonLinesOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<TensorFrame, DetectResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::LogOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "record_file")]
      OutputWrapper::RecordFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "jsonl_output")]
      OutputWrapper::JsonLinesOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}
