// 该文件是 Dingwen （定文） 项目的一部分。
// src/output/jsonl_output.rs - JSON Lines 结果输出
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

use std::{
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::TensorFrame,
  model::{Candidate, DetectResult},
  output::{Render, boxes_for_output, image_size},
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("路径解码错误: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("图像尺寸参数错误: {0}")]
  ImageSize(#[from] std::num::ParseIntError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("输出文件锁已损坏")]
  Poisoned,
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  frame: usize,
  source: &'a Path,
  timestamp: String,
  input_size: (u32, u32),
  boxes: Vec<Candidate>,
}

/// 每帧追加一行 JSON 到 `jsonl:///path/result.jsonl`
pub struct JsonLinesOutput {
  path: PathBuf,
  writer: Mutex<BufWriter<File>>,
  image_size: Option<(u32, u32)>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }

    let path = PathBuf::from(urlencoding::decode(uri.path())?.into_owned());
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    info!("检测结果写入: {}", path.display());

    Ok(JsonLinesOutput {
      path,
      writer: Mutex::new(BufWriter::new(file)),
      image_size: image_size(uri)?,
    })
  }
}

impl Render<TensorFrame, DetectResult> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let record = FrameRecord {
      frame: frame.index,
      source: &frame.source,
      timestamp: Utc::now().to_rfc3339(),
      input_size: result.input_size(),
      boxes: boxes_for_output(result, self.image_size),
    };

    let mut writer = self
      .writer
      .lock()
      .map_err(|_| JsonLinesOutputError::Poisoned)?;
    serde_json::to_writer(&mut *writer, &record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    debug!("帧 {} 写入 {}", frame.index, self.path.display());
    Ok(())
  }
}
