// 该文件是 Dingwen （定文） 项目的一部分。
// src/tensor.rs - 检测器输出张量视图
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

use ndarray::{ArrayView2, ArrayView3, ArrayView4, Axis, ShapeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 得分张量的通道数
pub const SCORE_CHANNELS: usize = 1;
/// 几何张量的通道数：上、右、下、左距离以及旋转角
pub const GEOMETRY_CHANNELS: usize = 5;

#[derive(Error, Debug)]
pub enum TensorError {
  #[error("得分图与几何图尺寸不一致: 得分 {score:?}, 几何 {geometry:?}")]
  ShapeMismatch {
    score: (usize, usize),
    geometry: (usize, usize),
  },
  #[error("几何通道 {channel} 尺寸不一致: 期望 {expected:?}, 实际 {actual:?}")]
  ChannelShape {
    channel: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
  },
  #[error("通道数不匹配: 期望 {expected}, 实际 {actual}")]
  ChannelMismatch { expected: usize, actual: usize },
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  DataLength { expected: usize, actual: usize },
  #[error("张量形状过大: {0:?}")]
  ShapeOverflow([usize; 4]),
  #[error("张量批次为空")]
  EmptyBatch,
  #[error("张量布局错误: {0}")]
  Layout(#[from] ShapeError),
}

/// 扁平缓冲区的内存排布。
///
/// 无论哪种排布，声明的形状始终按 `[batch, channels, rows, cols]` 给出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
  /// `buf[c * rows * cols + r * cols + k]`
  Nchw,
  /// `buf[(r * cols + k) * channels + c]`，TFLite 检测器的默认输出
  #[default]
  Nhwc,
}

/// 推理引擎输出的原始张量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTensor {
  shape: [usize; 4],
  #[serde(default)]
  layout: TensorLayout,
  data: Vec<f32>,
}

impl RawTensor {
  pub fn new(shape: [usize; 4], layout: TensorLayout, data: Vec<f32>) -> Result<Self, TensorError> {
    let tensor = Self {
      shape,
      layout,
      data,
    };
    tensor.check_len()?;
    Ok(tensor)
  }

  pub fn shape(&self) -> [usize; 4] {
    self.shape
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn channels(&self) -> usize {
    self.shape[1]
  }

  pub fn rows(&self) -> usize {
    self.shape[2]
  }

  pub fn cols(&self) -> usize {
    self.shape[3]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  fn check_len(&self) -> Result<(), TensorError> {
    let expected = self
      .shape
      .iter()
      .try_fold(1usize, |len, &dim| len.checked_mul(dim))
      .ok_or(TensorError::ShapeOverflow(self.shape))?;
    if self.data.len() != expected {
      return Err(TensorError::DataLength {
        expected,
        actual: self.data.len(),
      });
    }
    Ok(())
  }

  /// 第 0 个批次的 `(channels, rows, cols)` 视图
  pub fn view(&self) -> Result<ArrayView3<'_, f32>, TensorError> {
    // 反序列化得到的张量没有经过 `new` 的检查
    self.check_len()?;

    let [batch, channels, rows, cols] = self.shape;
    if batch == 0 {
      return Err(TensorError::EmptyBatch);
    }

    let view = match self.layout {
      TensorLayout::Nchw => {
        ArrayView4::from_shape((batch, channels, rows, cols), self.data.as_slice())?
      }
      TensorLayout::Nhwc => {
        ArrayView4::from_shape((batch, rows, cols, channels), self.data.as_slice())?
          .permuted_axes([0, 3, 1, 2])
      }
    };

    Ok(view.index_axis_move(Axis(0), 0))
  }
}

fn check_channels(view: &ArrayView3<'_, f32>, expected: usize) -> Result<(), TensorError> {
  let actual = view.len_of(Axis(0));
  if actual != expected {
    return Err(TensorError::ChannelMismatch { expected, actual });
  }
  Ok(())
}

/// 每个网格单元的文本概率
#[derive(Debug, Clone)]
pub struct ScoreGrid<'a> {
  cells: ArrayView2<'a, f32>,
}

impl<'a> ScoreGrid<'a> {
  pub fn from_view(cells: ArrayView2<'a, f32>) -> Self {
    Self { cells }
  }

  pub fn from_tensor(tensor: &'a RawTensor) -> Result<Self, TensorError> {
    let view = tensor.view()?;
    check_channels(&view, SCORE_CHANNELS)?;
    Ok(Self {
      cells: view.index_axis_move(Axis(0), 0),
    })
  }

  /// `(rows, cols)`
  pub fn dim(&self) -> (usize, usize) {
    self.cells.dim()
  }

  pub fn rows(&self) -> usize {
    self.cells.nrows()
  }

  pub fn cols(&self) -> usize {
    self.cells.ncols()
  }

  pub fn get(&self, row: usize, col: usize) -> f32 {
    self.cells[[row, col]]
  }

  pub(crate) fn cells(&self) -> &ArrayView2<'a, f32> {
    &self.cells
  }
}

/// 单个网格单元的几何量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry {
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
  pub left: f32,
  /// 弧度
  pub angle: f32,
}

/// 与得分图逐单元对齐的五个几何通道
#[derive(Debug, Clone)]
pub struct GeometryGrid<'a> {
  top: ArrayView2<'a, f32>,
  right: ArrayView2<'a, f32>,
  bottom: ArrayView2<'a, f32>,
  left: ArrayView2<'a, f32>,
  angle: ArrayView2<'a, f32>,
}

impl<'a> GeometryGrid<'a> {
  pub fn from_channels(
    top: ArrayView2<'a, f32>,
    right: ArrayView2<'a, f32>,
    bottom: ArrayView2<'a, f32>,
    left: ArrayView2<'a, f32>,
    angle: ArrayView2<'a, f32>,
  ) -> Result<Self, TensorError> {
    let expected = top.dim();
    for (channel, view) in [
      ("right", &right),
      ("bottom", &bottom),
      ("left", &left),
      ("angle", &angle),
    ] {
      if view.dim() != expected {
        return Err(TensorError::ChannelShape {
          channel,
          expected,
          actual: view.dim(),
        });
      }
    }

    Ok(Self {
      top,
      right,
      bottom,
      left,
      angle,
    })
  }

  pub fn from_tensor(tensor: &'a RawTensor) -> Result<Self, TensorError> {
    let view = tensor.view()?;
    check_channels(&view, GEOMETRY_CHANNELS)?;

    let channel = |c: usize| view.clone().index_axis_move(Axis(0), c);
    Ok(Self {
      top: channel(0),
      right: channel(1),
      bottom: channel(2),
      left: channel(3),
      angle: channel(4),
    })
  }

  /// `(rows, cols)`
  pub fn dim(&self) -> (usize, usize) {
    self.top.dim()
  }

  pub fn cell(&self, row: usize, col: usize) -> CellGeometry {
    CellGeometry {
      top: self.top[[row, col]],
      right: self.right[[row, col]],
      bottom: self.bottom[[row, col]],
      left: self.left[[row, col]],
      angle: self.angle[[row, col]],
    }
  }
}

/// 一次推理调用得到的得分与几何张量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutput {
  pub score: RawTensor,
  pub geometry: RawTensor,
}

impl DetectorOutput {
  pub fn grids(&self) -> Result<(ScoreGrid<'_>, GeometryGrid<'_>), TensorError> {
    Ok((
      ScoreGrid::from_tensor(&self.score)?,
      GeometryGrid::from_tensor(&self.geometry)?,
    ))
  }
}
