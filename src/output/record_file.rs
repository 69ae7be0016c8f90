// 该文件是 Dingwen （定文） 项目的一部分。
// src/output/record_file.rs - 目录记录输出
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::TensorFrame,
  model::{Candidate, DetectResult},
  output::{Render, boxes_for_output, image_size},
};

#[derive(Error, Debug)]
pub enum RecordFileOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("路径解码错误: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("图像尺寸参数错误: {0}")]
  ImageSize(#[from] std::num::ParseIntError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 每帧一个文本记录，每行 `score, x1, y1, x2, y2`。
///
/// `record:///dir?width=1280&height=720&always`：给出原图尺寸时按原图坐标记录，
/// 带 `always` 时没有检测结果的帧也写出空记录。
pub struct RecordFileOutput {
  directory: PathBuf,
  image_size: Option<(u32, u32)>,
  always: bool,
}

impl FromUrlWithScheme for RecordFileOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordFileOutput {
  type Error = RecordFileOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(RecordFileOutputError::SchemeMismatch);
    }

    let directory = PathBuf::from(urlencoding::decode(uri.path())?.into_owned());
    std::fs::create_dir_all(&directory)?;

    Ok(RecordFileOutput {
      directory,
      image_size: image_size(uri)?,
      always: uri.query_pairs().any(|(k, _)| k == "always"),
    })
  }
}

fn record(boxes: &[Candidate]) -> String {
  boxes
    .iter()
    .map(|item| {
      format!(
        "{:.4}, {}, {}, {}, {}",
        item.confidence, item.rect.x1, item.rect.y1, item.rect.x2, item.rect.y2
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

impl RecordFileOutput {
  fn record_path(&self, frame: &TensorFrame) -> PathBuf {
    let stem = frame
      .source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| format!("{:06}", frame.index));
    self.directory.join(format!("{}.txt", stem))
  }
}

impl Render<TensorFrame, DetectResult> for RecordFileOutput {
  type Error = RecordFileOutputError;

  fn render_result(&self, frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let path = self.record_path(frame);
    let boxes = boxes_for_output(result, self.image_size);
    std::fs::write(&path, record(&boxes))?;
    debug!("写入检测记录: {}", path.display());
    Ok(())
  }
}
