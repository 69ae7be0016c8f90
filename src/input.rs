// 该文件是 Dingwen （定文） 项目的一部分。
// src/input.rs - 检测器输出输入
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

use crate::tensor::DetectorOutput;

/// 一帧录制下来的检测器输出
#[derive(Debug, Clone)]
pub struct TensorFrame {
  /// 帧序号，从 0 开始
  pub index: usize,
  /// 来源文件
  pub source: PathBuf,
  pub outputs: DetectorOutput,
}

mod tensor_file;
pub use self::tensor_file::{TensorFileInput, TensorFileInputError};
