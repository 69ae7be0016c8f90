// 该文件是 Dingwen （定文） 项目的一部分。
// src/model/decode.rs - 得分图与几何图解码为候选框
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
  model::Rect,
  tensor::{GeometryGrid, ScoreGrid, TensorError},
};

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
/// 检测器输入分辨率与输出网格之间的下采样倍数
pub const DEFAULT_STRIDE: f32 = 4.0;

/// 未经抑制的候选框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
  pub rect: Rect,
  pub confidence: f32,
}

/// 单次解码得到的候选框集合，按网格行优先顺序插入
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
  candidates: Vec<Candidate>,
}

impl CandidateSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_vec(candidates: Vec<Candidate>) -> Self {
    Self { candidates }
  }

  pub fn push(&mut self, candidate: Candidate) {
    self.candidates.push(candidate);
  }

  pub fn len(&self) -> usize {
    self.candidates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.candidates.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
    self.candidates.iter()
  }

  pub fn into_vec(self) -> Vec<Candidate> {
    self.candidates
  }
}

impl IntoIterator for CandidateSet {
  type Item = Candidate;
  type IntoIter = std::vec::IntoIter<Candidate>;

  fn into_iter(self) -> Self::IntoIter {
    self.candidates.into_iter()
  }
}

impl FromIterator<Candidate> for CandidateSet {
  fn from_iter<T: IntoIterator<Item = Candidate>>(iter: T) -> Self {
    Self::from_vec(iter.into_iter().collect())
  }
}

/// 把每个网格单元的方向距离与角度还原成矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxDecoder {
  min_confidence: f32,
  stride: f32,
  normalize: bool,
}

impl Default for BoxDecoder {
  fn default() -> Self {
    Self {
      min_confidence: DEFAULT_MIN_CONFIDENCE,
      stride: DEFAULT_STRIDE,
      normalize: true,
    }
  }
}

impl BoxDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
    self.min_confidence = min_confidence;
    self
  }

  pub fn with_stride(mut self, stride: f32) -> Self {
    self.stride = stride;
    self
  }

  /// 关闭后保留旋转运算得到的原始角点顺序
  pub fn with_normalize(mut self, normalize: bool) -> Self {
    self.normalize = normalize;
    self
  }

  pub fn min_confidence(&self) -> f32 {
    self.min_confidence
  }

  pub fn stride(&self) -> f32 {
    self.stride
  }

  pub fn decode(
    &self,
    score: &ScoreGrid<'_>,
    geometry: &GeometryGrid<'_>,
  ) -> Result<CandidateSet, TensorError> {
    if score.dim() != geometry.dim() {
      return Err(TensorError::ShapeMismatch {
        score: score.dim(),
        geometry: geometry.dim(),
      });
    }

    let mut candidates = CandidateSet::new();
    for ((row, col), &confidence) in score.cells().indexed_iter() {
      if confidence.is_nan() || confidence < self.min_confidence {
        continue;
      }

      let offset_x = col as f32 * self.stride;
      let offset_y = row as f32 * self.stride;

      let cell = geometry.cell(row, col);
      let box_h = cell.top + cell.bottom;
      let box_w = cell.right + cell.left;

      let (sin, cos) = cell.angle.sin_cos();
      // 终点先向零取整，起点由取整后的终点推出
      let end_x = (offset_x + cos * cell.right + sin * cell.bottom) as i32;
      let end_y = (offset_y + cos * cell.bottom - sin * cell.right) as i32;
      let start_x = (end_x as f32 - box_w) as i32;
      let start_y = (end_y as f32 - box_h) as i32;

      let rect = Rect::new(start_x, start_y, end_x, end_y);

      candidates.push(Candidate {
        rect: if self.normalize {
          rect.normalized()
        } else {
          rect
        },
        confidence,
      });
    }

    debug!(
      "解码 {}x{} 网格，得到 {} 个候选框",
      score.rows(),
      score.cols(),
      candidates.len()
    );

    Ok(candidates)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array2;

  const ROWS: usize = 80;
  const COLS: usize = 80;

  struct Grids {
    score: Array2<f32>,
    top: Array2<f32>,
    right: Array2<f32>,
    bottom: Array2<f32>,
    left: Array2<f32>,
    angle: Array2<f32>,
  }

  impl Grids {
    fn new(rows: usize, cols: usize) -> Self {
      Self {
        score: Array2::zeros((rows, cols)),
        top: Array2::zeros((rows, cols)),
        right: Array2::zeros((rows, cols)),
        bottom: Array2::zeros((rows, cols)),
        left: Array2::zeros((rows, cols)),
        angle: Array2::zeros((rows, cols)),
      }
    }

    fn set(&mut self, row: usize, col: usize, score: f32, distances: [f32; 4], angle: f32) {
      self.score[[row, col]] = score;
      self.top[[row, col]] = distances[0];
      self.right[[row, col]] = distances[1];
      self.bottom[[row, col]] = distances[2];
      self.left[[row, col]] = distances[3];
      self.angle[[row, col]] = angle;
    }

    fn decode(&self, decoder: &BoxDecoder) -> Result<CandidateSet, TensorError> {
      let score = ScoreGrid::from_view(self.score.view());
      let geometry = GeometryGrid::from_channels(
        self.top.view(),
        self.right.view(),
        self.bottom.view(),
        self.left.view(),
        self.angle.view(),
      )?;
      decoder.decode(&score, &geometry)
    }
  }

  #[test]
  fn single_hot_cell_yields_one_candidate() {
    let mut grids = Grids::new(ROWS, COLS);
    grids.set(10, 10, 0.9, [6.0, 12.0, 6.0, 12.0], 0.0);

    let candidates = grids.decode(&BoxDecoder::new()).unwrap();
    assert_eq!(candidates.len(), 1);

    let candidate = candidates.iter().next().unwrap();
    assert_eq!(candidate.confidence, 0.9);
    assert_eq!(candidate.rect, Rect::new(28, 34, 52, 46));
  }

  #[test]
  fn fractional_distances_truncate_from_the_end_corner() {
    let mut grids = Grids::new(ROWS, COLS);
    grids.set(10, 10, 0.9, [6.3, 12.6, 6.3, 12.6], 0.0);

    let rect = grids.decode(&BoxDecoder::new()).unwrap().into_vec()[0].rect;
    // end = (52.6, 46.3) -> (52, 46); start = (52 - 25.2, 46 - 12.6) -> (26, 33)
    assert_eq!(rect, Rect::new(26, 33, 52, 46));
  }

  #[test]
  fn negative_coordinates_truncate_toward_zero() {
    let mut grids = Grids::new(1, 1);
    grids.set(0, 0, 0.9, [0.4, 0.5, 0.7, 3.2], 0.0);

    let rect = grids
      .decode(&BoxDecoder::new().with_normalize(false))
      .unwrap()
      .into_vec()[0]
      .rect;
    // end = (0.5, 0.7) -> (0, 0); start = (-3.7, -1.1) -> (-3, -1)
    assert_eq!(rect, Rect::new(-3, -1, 0, 0));
  }

  #[test]
  fn zero_angle_offsets_are_direct() {
    let mut grids = Grids::new(4, 4);
    grids.set(1, 2, 0.7, [3.0, 5.0, 7.0, 2.0], 0.0);
    grids.set(3, 0, 0.8, [1.0, 9.0, 4.0, 6.0], 0.0);

    let decoder = BoxDecoder::new().with_normalize(false);
    let candidates = grids.decode(&decoder).unwrap().into_vec();
    assert_eq!(candidates.len(), 2);

    // 行优先扫描：(1, 2) 先于 (3, 0)
    let (offset_x, offset_y) = (8, 4);
    assert_eq!(candidates[0].rect.x1, offset_x - 2);
    assert_eq!(candidates[0].rect.x2, offset_x + 5);
    assert_eq!(candidates[0].rect.y1, offset_y + 7 - 10);
    assert_eq!(candidates[0].rect.y2, offset_y + 7);

    let (offset_x, offset_y) = (0, 12);
    assert_eq!(candidates[1].rect.x1, offset_x - 6);
    assert_eq!(candidates[1].rect.x2, offset_x + 9);
    assert_eq!(candidates[1].rect.y2, offset_y + 4);
  }

  #[test]
  fn every_candidate_meets_min_confidence() {
    let mut grids = Grids::new(8, 8);
    let scores = [0.1, 0.49, 0.5, 0.51, 0.75, 0.99, 0.3, 0.6];
    for (i, &s) in scores.iter().enumerate() {
      grids.set(i, (i * 3) % 8, s, [1.0, 1.0, 1.0, 1.0], 0.0);
    }

    let decoder = BoxDecoder::new().with_min_confidence(0.5);
    let candidates = grids.decode(&decoder).unwrap();
    assert_eq!(candidates.len(), 5);
    assert!(candidates.iter().all(|c| c.confidence >= 0.5));
  }

  #[test]
  fn rotation_moves_the_end_corner() {
    let mut grids = Grids::new(2, 2);
    let angle = std::f32::consts::FRAC_PI_2;
    grids.set(0, 0, 0.9, [2.0, 4.0, 6.0, 8.0], angle);

    let decoder = BoxDecoder::new().with_normalize(false);
    let rect = grids.decode(&decoder).unwrap().into_vec()[0].rect;
    // cos = 0, sin = 1: end = (bottom, -right)
    assert_eq!(rect, Rect::new(6 - 12, -4 - 8, 6, -4));
  }

  #[test]
  fn normalize_fixes_inverted_corners() {
    let mut grids = Grids::new(1, 1);
    grids.set(0, 0, 0.9, [-5.0, 3.0, 1.0, -9.0], 0.0);

    let raw = grids
      .decode(&BoxDecoder::new().with_normalize(false))
      .unwrap()
      .into_vec()[0]
      .rect;
    assert!(raw.is_inverted());

    let fixed = grids.decode(&BoxDecoder::new()).unwrap().into_vec()[0].rect;
    assert!(!fixed.is_inverted());
    assert_eq!(fixed, raw.normalized());
  }

  #[test]
  fn stride_is_configurable() {
    let mut grids = Grids::new(4, 4);
    grids.set(2, 3, 0.9, [0.0, 0.0, 0.0, 0.0], 0.0);

    let decoder = BoxDecoder::new().with_stride(8.0);
    let rect = grids.decode(&decoder).unwrap().into_vec()[0].rect;
    assert_eq!(rect, Rect::new(24, 16, 24, 16));
  }

  #[test]
  fn shape_mismatch_is_rejected_before_decoding() {
    let score = Array2::<f32>::ones((4, 4));
    let geometry = Array2::<f32>::zeros((4, 5));
    let geometry = GeometryGrid::from_channels(
      geometry.view(),
      geometry.view(),
      geometry.view(),
      geometry.view(),
      geometry.view(),
    )
    .unwrap();

    let err = BoxDecoder::new()
      .decode(&ScoreGrid::from_view(score.view()), &geometry)
      .unwrap_err();
    assert!(matches!(
      err,
      TensorError::ShapeMismatch {
        score: (4, 4),
        geometry: (4, 5)
      }
    ));
  }
}
