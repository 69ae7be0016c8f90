// 该文件是 Dingwen （定文） 项目的一部分。
// src/model/rect.rs - 矩形框与交并比
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

/// 轴对齐矩形，`(x1, y1)` 为左上角，`(x2, y2)` 为右下角。
///
/// 解码时的旋转运算可能产生角点颠倒的矩形，构造时不做保证，
/// 需要时调用 [`Rect::normalized`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl Rect {
  pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> i64 {
    i64::from(self.x2) - i64::from(self.x1)
  }

  pub fn height(&self) -> i64 {
    i64::from(self.y2) - i64::from(self.y1)
  }

  /// 带符号面积，角点颠倒时可能为负
  pub fn area(&self) -> i64 {
    self.width() * self.height()
  }

  pub fn is_inverted(&self) -> bool {
    self.x1 > self.x2 || self.y1 > self.y2
  }

  pub fn normalized(&self) -> Self {
    Self {
      x1: self.x1.min(self.x2),
      y1: self.y1.min(self.y2),
      x2: self.x1.max(self.x2),
      y2: self.y1.max(self.y2),
    }
  }

  /// 交集面积，不相交时为 0
  pub fn intersection(&self, other: &Rect) -> i64 {
    let x1 = self.x1.max(other.x1);
    let y1 = self.y1.max(other.y1);
    let x2 = self.x2.min(other.x2);
    let y2 = self.y2.min(other.y2);

    let w = (i64::from(x2) - i64::from(x1)).max(0);
    let h = (i64::from(y2) - i64::from(y1)).max(0);
    w * h
  }

  /// 交并比。
  ///
  /// 并集面积不为正（退化矩形或角点颠倒）时视为不重叠，返回 `0.0`。
  pub fn iou(&self, other: &Rect) -> f32 {
    let intersection = self.intersection(other);
    let union = self.area() + other.area() - intersection;
    if union <= 0 {
      return 0.0;
    }
    (intersection as f64 / union as f64) as f32
  }

  /// 映射到原图坐标，截断取整
  pub fn scaled(&self, scale: &BoxScale) -> Self {
    Self {
      x1: (self.x1 as f32 * scale.x) as i32,
      y1: (self.y1 as f32 * scale.y) as i32,
      x2: (self.x2 as f32 * scale.x) as i32,
      y2: (self.y2 as f32 * scale.y) as i32,
    }
  }

  /// 限制在 `[0, width] x [0, height]` 内
  pub fn clamped(&self, width: u32, height: u32) -> Self {
    let w = i32::try_from(width).unwrap_or(i32::MAX);
    let h = i32::try_from(height).unwrap_or(i32::MAX);
    Self {
      x1: self.x1.clamp(0, w),
      y1: self.y1.clamp(0, h),
      x2: self.x2.clamp(0, w),
      y2: self.y2.clamp(0, h),
    }
  }
}

/// 检测器输入坐标到原图坐标的缩放比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxScale {
  pub x: f32,
  pub y: f32,
}

impl BoxScale {
  pub fn new(image_width: u32, image_height: u32, input_width: u32, input_height: u32) -> Self {
    Self {
      x: image_width as f32 / input_width.max(1) as f32,
      y: image_height as f32 / input_height.max(1) as f32,
    }
  }

  pub fn identity() -> Self {
    Self { x: 1.0, y: 1.0 }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  #[test]
  fn iou_of_rect_with_itself_is_one() {
    let rect = Rect::new(3, 4, 13, 24);
    assert_abs_diff_eq!(rect.iou(&rect), 1.0);
  }

  #[test]
  fn iou_is_symmetric() {
    let pairs = [
      (Rect::new(0, 0, 10, 10), Rect::new(5, 5, 15, 15)),
      (Rect::new(0, 0, 10, 10), Rect::new(20, 20, 30, 30)),
      (Rect::new(-4, 2, 8, 9), Rect::new(0, 0, 3, 40)),
      (Rect::new(10, 10, 0, 0), Rect::new(2, 2, 6, 6)),
    ];
    for (a, b) in pairs {
      assert_eq!(a.iou(&b), b.iou(&a));
    }
  }

  #[test]
  fn iou_of_partial_overlap() {
    // 交集 5x5=25，并集 100+100-25=175
    let a = Rect::new(0, 0, 10, 10);
    let b = Rect::new(5, 5, 15, 15);
    assert_abs_diff_eq!(a.iou(&b), 25.0 / 175.0, epsilon = 1e-6);
  }

  #[test]
  fn disjoint_rects_do_not_overlap() {
    let a = Rect::new(0, 0, 10, 10);
    let b = Rect::new(10, 0, 20, 10);
    assert_eq!(a.intersection(&b), 0);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn degenerate_union_yields_zero() {
    let point = Rect::new(5, 5, 5, 5);
    assert_eq!(point.iou(&point), 0.0);
  }

  #[test]
  fn normalized_orders_corners() {
    let rect = Rect::new(10, 2, 4, 8);
    assert!(rect.is_inverted());
    let rect = rect.normalized();
    assert!(!rect.is_inverted());
    assert_eq!(rect, Rect::new(4, 2, 10, 8));
  }

  #[test]
  fn scale_then_clamp_into_image() {
    let scale = BoxScale::new(640, 480, 320, 320);
    let rect = Rect::new(-8, 100, 300, 330).scaled(&scale).clamped(640, 480);
    assert_eq!(rect, Rect::new(0, 150, 600, 480));
  }
}
