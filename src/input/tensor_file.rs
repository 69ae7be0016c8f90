// 该文件是 Dingwen （定文） 项目的一部分。
// src/input/tensor_file.rs - 张量文件输入
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
  fs::File,
  io::BufReader,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::TensorFrame, tensor::DetectorOutput};

#[derive(Error, Debug)]
pub enum TensorFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("路径解码错误: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("输入路径不存在: {0}")]
  NotFound(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 读取 JSON 格式的检测器输出。
///
/// 地址指向单个文件，或指向一个目录（按文件名顺序读取其中所有 `*.json`）。
pub struct TensorFileInput {
  files: std::vec::IntoIter<PathBuf>,
  index: usize,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

impl FromUrl for TensorFileInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "输入地址方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = PathBuf::from(urlencoding::decode(url.path())?.into_owned());
    Self::open(path)
  }
}

impl TensorFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, TensorFileInputError> {
    let path = path.as_ref();

    let files = if path.is_dir() {
      let mut files = Vec::new();
      for entry in std::fs::read_dir(path)? {
        let file = entry?.path();
        if file.is_file() && file.extension().is_some_and(|ext| ext == "json") {
          files.push(file);
        }
      }
      files.sort();
      if files.is_empty() {
        warn!("目录中没有张量文件: {}", path.display());
      }
      files
    } else if path.is_file() {
      vec![path.to_path_buf()]
    } else {
      return Err(TensorFileInputError::NotFound(path.to_path_buf()));
    };

    info!("张量输入: {} 个文件", files.len());

    Ok(TensorFileInput {
      files: files.into_iter(),
      index: 0,
    })
  }

  pub fn load(path: &Path) -> Result<DetectorOutput, TensorFileInputError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
  }
}

impl Iterator for TensorFileInput {
  type Item = TensorFrame;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let source = self.files.next()?;
      match Self::load(&source) {
        Ok(outputs) => {
          debug!("读取张量文件: {}", source.display());
          let frame = TensorFrame {
            index: self.index,
            source,
            outputs,
          };
          self.index += 1;
          return Some(frame);
        }
        Err(e) => error!("跳过无法读取的张量文件 {}: {}", source.display(), e),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::{RawTensor, TensorLayout};

  fn dump(path: &Path, fill: f32) {
    let output = DetectorOutput {
      score: RawTensor::new([1, 1, 2, 2], TensorLayout::Nhwc, vec![fill; 4]).unwrap(),
      geometry: RawTensor::new([1, 5, 2, 2], TensorLayout::Nhwc, vec![1.0; 20]).unwrap(),
    };
    std::fs::write(path, serde_json::to_string(&output).unwrap()).unwrap();
  }

  #[test]
  fn reads_directory_in_name_order_and_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    dump(&dir.path().join("b.json"), 0.2);
    dump(&dir.path().join("a.json"), 0.1);
    std::fs::write(dir.path().join("c.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let url = Url::parse(&format!("tensor://{}", dir.path().display())).unwrap();
    let frames: Vec<_> = TensorFileInput::from_url(&url).unwrap().collect();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[0].source.file_name().unwrap(), "a.json");
    assert_eq!(frames[0].outputs.score.as_slice(), &[0.1; 4]);
    assert_eq!(frames[1].index, 1);
    assert_eq!(frames[1].source.file_name().unwrap(), "b.json");
  }

  #[test]
  fn single_file_yields_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.json");
    dump(&path, 0.8);

    let frames: Vec<_> = TensorFileInput::open(&path).unwrap().collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].source, path);
  }

  #[test]
  fn missing_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      TensorFileInput::open(dir.path().join("missing.json")),
      Err(TensorFileInputError::NotFound(_))
    ));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("image:///tmp/frame.json").unwrap();
    assert!(matches!(
      TensorFileInput::from_url(&url),
      Err(TensorFileInputError::SchemeMismatch(_))
    ));
  }
}
