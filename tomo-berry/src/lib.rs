#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 为 3D 分割模型准备冷冻电镜 tomogram 训练数据, 并把模型预测还原到
//! 原始物理坐标.
//!
//! 数据流:
//!
//! 1. 原始 tomogram + 每个标注切片的 2D 涂绘图 → 标签融合 ([`fusion`]) →
//!   稀疏 3D 标签体 (未标注 / 不存在 / 存在), 写回存储 ([`storage`]).
//! 2. 标注记录 ([`record`]) → 样本组装 ([`dataset`]): 加载、深度截断
//!   ([`geometry`])、可选增强 ([`augment`])、权重掩码 ([`weight`])、
//!   对齐填充 → 交给模型的样本.
//! 3. 推理时: 原始 tomogram → 前处理 ([`inference`]) → 模型 (外部) →
//!   后处理 → 与原始形状一致的预测体.
//!
//! 各阶段 (训练/验证/测试/预测) 的行为差异由 [`phase`] 中的值对象统一描述.
//!
//! # 注意
//!
//! 几何参数 (步长、块大小) 为 0 属于配置错误, 应在启动时由
//! [`config::DatasetConfig::validate`] 或 [`inference::InferenceConfig::new`]
//! 拦截; 底层纯函数遇到这种情况会直接 panic.

/// 二维索引 (高, 宽).
pub type Idx2d = (usize, usize);

/// 三维索引 (深度, 高, 宽).
pub type Idx3d = (usize, usize, usize);

pub mod augment;
pub mod config;
pub mod consts;
pub mod dataset;
pub mod error;
pub mod fusion;
pub mod geometry;
pub mod inference;
pub mod phase;
pub mod prelude;
pub mod record;
pub mod storage;
pub mod weight;

mod target;

pub use error::{Result, TomoError};
pub use target::Target;

use std::path::{Path, PathBuf};

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}
