// 该文件是 Dingwen （定文） 项目的一部分。
// src/model/suppress.rs - 非极大值抑制
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

use crate::model::{BoxScale, Candidate, CandidateSet, Rect};

pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.3;

/// 抑制后保留下来的框，按选中顺序（置信度降序）排列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalBoxSet {
  boxes: Vec<Candidate>,
}

impl FinalBoxSet {
  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
    self.boxes.iter()
  }

  pub fn rects(&self) -> impl Iterator<Item = Rect> + '_ {
    self.boxes.iter().map(|c| c.rect)
  }

  pub fn as_slice(&self) -> &[Candidate] {
    &self.boxes
  }

  /// 先缩放到原图坐标再裁剪到图像范围内
  pub fn to_image_space(&self, scale: &BoxScale, width: u32, height: u32) -> Vec<Candidate> {
    self
      .boxes
      .iter()
      .map(|c| Candidate {
        rect: c.rect.scaled(scale).clamped(width, height),
        confidence: c.confidence,
      })
      .collect()
  }
}

impl From<FinalBoxSet> for CandidateSet {
  fn from(boxes: FinalBoxSet) -> Self {
    CandidateSet::from_vec(boxes.boxes)
  }
}

impl IntoIterator for FinalBoxSet {
  type Item = Candidate;
  type IntoIter = std::vec::IntoIter<Candidate>;

  fn into_iter(self) -> Self::IntoIter {
    self.boxes.into_iter()
  }
}

/// 贪心非极大值抑制
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suppressor {
  overlap_threshold: f32,
}

impl Default for Suppressor {
  fn default() -> Self {
    Self {
      overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
    }
  }
}

impl Suppressor {
  pub fn new(overlap_threshold: f32) -> Self {
    Self { overlap_threshold }
  }

  pub fn overlap_threshold(&self) -> f32 {
    self.overlap_threshold
  }

  /// 每轮选出置信度最高的候选框（并列时取最先出现的），
  /// 再淘汰与之交并比不低于阈值的其余候选框。
  pub fn suppress(&self, candidates: CandidateSet) -> FinalBoxSet {
    let candidates = candidates.into_vec();
    let total = candidates.len();

    let mut alive = vec![true; total];
    let mut remaining = total;
    let mut boxes = Vec::new();

    while remaining > 0 {
      let mut best: Option<usize> = None;
      for (i, candidate) in candidates.iter().enumerate() {
        if !alive[i] {
          continue;
        }
        match best {
          Some(b) if candidates[b].confidence >= candidate.confidence => {}
          _ => best = Some(i),
        }
      }

      let Some(best) = best else {
        break;
      };
      let selected = candidates[best];
      alive[best] = false;
      remaining -= 1;

      for (i, candidate) in candidates.iter().enumerate() {
        if alive[i] && selected.rect.iou(&candidate.rect) >= self.overlap_threshold {
          alive[i] = false;
          remaining -= 1;
        }
      }

      boxes.push(selected);
    }

    debug!("非极大值抑制: {} 个候选框保留 {} 个", total, boxes.len());

    FinalBoxSet { boxes }
  }
}
