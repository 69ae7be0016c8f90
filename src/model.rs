// 该文件是 Dingwen （定文） 项目的一部分。
// src/model.rs - 模型
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

use std::borrow::Cow;

use crate::tensor::DetectorOutput;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 推理引擎会话，产出原始的得分与几何张量。
///
/// 会话作为显式对象交给检测器持有，解码与抑制本身不依赖任何全局状态。
pub trait InferenceSession {
  type Input;
  type Error: std::error::Error + Send + Sync + 'static;

  fn run<'a>(&'a self, input: &'a Self::Input) -> Result<Cow<'a, DetectorOutput>, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult {
  /// 输出网格行数
  pub rows: usize,
  /// 输出网格列数
  pub cols: usize,
  pub stride: f32,
  pub boxes: FinalBoxSet,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  /// 检测器输入分辨率 `(width, height)`
  pub fn input_size(&self) -> (u32, u32) {
    (
      (self.cols as f32 * self.stride).round() as u32,
      (self.rows as f32 * self.stride).round() as u32,
    )
  }

  /// 把结果映射到 `width x height` 的原图并裁剪
  pub fn to_image_space(&self, width: u32, height: u32) -> Vec<Candidate> {
    let (input_w, input_h) = self.input_size();
    let scale = BoxScale::new(width, height, input_w, input_h);
    self.boxes.to_image_space(&scale, width, height)
  }
}

mod decode;
mod east;
mod rect;
mod suppress;

pub use self::decode::{
  BoxDecoder, Candidate, CandidateSet, DEFAULT_MIN_CONFIDENCE, DEFAULT_STRIDE,
};
pub use self::east::{EastDetector, EastDetectorBuilder, EastError, ReplaySession};
pub use self::rect::{BoxScale, Rect};
pub use self::suppress::{DEFAULT_OVERLAP_THRESHOLD, FinalBoxSet, Suppressor};
