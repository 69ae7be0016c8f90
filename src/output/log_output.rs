// 该文件是 Dingwen （定文） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::TensorFrame,
  model::DetectResult,
  output::{Render, boxes_for_output, image_size},
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像尺寸参数错误: {0}")]
  ImageSize(#[from] std::num::ParseIntError),
}

/// 把检测结果写入日志，`log:?width=1280&height=720` 时按原图坐标输出
pub struct LogOutput {
  image_size: Option<(u32, u32)>,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(LogOutput {
      image_size: image_size(url)?,
    })
  }
}

impl Render<TensorFrame, DetectResult> for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    info!(
      "帧 {} ({}): 检测到 {} 个文本区域",
      frame.index,
      frame.source.display(),
      result.len()
    );
    for item in boxes_for_output(result, self.image_size) {
      let rect = item.rect;
      info!(
        "  - {:.2}% at ({}, {}) - ({}, {})",
        item.confidence * 100.0,
        rect.x1,
        rect.y1,
        rect.x2,
        rect.y2
      );
    }
    Ok(())
  }
}
