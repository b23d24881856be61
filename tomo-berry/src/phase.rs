//! 学习阶段与数据集风格.
//!
//! 各阶段在数据增强、深度截断和权重策略上的差异被收敛成一个
//! [`PhaseConfig`] 值对象, 在构建数据集时一次性选定.

use crate::error::{Result, TomoError};
use crate::weight::SlicePositions;
use serde::Deserialize;
use std::fmt;

/// 学习阶段.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// 训练.
    Train,

    /// 验证.
    Val,

    /// 测试.
    Test,

    /// 预测. 没有真值, 不计算权重.
    Predict,
}

impl Phase {
    /// 全部阶段.
    pub const ALL: [Phase; 4] = [Phase::Train, Phase::Val, Phase::Test, Phase::Predict];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
            Self::Predict => "predict",
        })
    }
}

/// 单个阶段的行为配置.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PhaseConfig {
    /// 阶段.
    pub phase: Phase,

    /// 是否允许数据增强. 仅训练阶段可能为 `true`.
    pub apply_augmentation: bool,

    /// 是否截断深度.
    pub limit_depth: bool,

    /// 参与评分的标注切片位置. 预测阶段为 `None`.
    pub eligible_slice_positions: Option<SlicePositions>,
}

impl PhaseConfig {
    /// 该阶段是否保留复制因子. 非训练阶段总是按 1 处理.
    #[inline]
    pub fn keeps_replication(&self) -> bool {
        self.phase == Phase::Train
    }
}

/// 数据集风格. 决定各阶段的可评分切片集合.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Flavour {
    /// 所有阶段都使用全部 5 个切片.
    Basic,

    /// 训练用外围 4 个切片, 验证只用中心切片, 测试用全部切片.
    Slice,
}

/// 已登记的风格. 键名稳定, 启动时校验.
pub const FLAVOURS: [(&str, Flavour); 2] = [("basic", Flavour::Basic), ("slice", Flavour::Slice)];

impl Flavour {
    /// 由登记键名查找风格.
    pub fn from_key(key: &str) -> Result<Self> {
        FLAVOURS
            .iter()
            .find_map(|&(k, f)| (k == key).then_some(f))
            .ok_or_else(|| TomoError::InvalidConfig(format!("unknown dataset flavour `{key}`")))
    }

    /// 该风格在 `phase` 阶段的可评分切片位置.
    pub fn eligible(self, phase: Phase) -> Option<SlicePositions> {
        match (self, phase) {
            (_, Phase::Predict) => None,
            (Self::Basic, _) => Some(SlicePositions::ALL),
            (Self::Slice, Phase::Train) => Some(SlicePositions::OFF_CENTER),
            (Self::Slice, Phase::Val) => Some(SlicePositions::CENTER),
            (Self::Slice, Phase::Test) => Some(SlicePositions::ALL),
        }
    }

    /// 构建 `phase` 阶段的行为配置. `augment` 只在训练阶段生效.
    pub fn phase_config(self, phase: Phase, augment: bool) -> PhaseConfig {
        PhaseConfig {
            phase,
            apply_augmentation: augment && phase == Phase::Train,
            limit_depth: matches!(phase, Phase::Train | Phase::Val),
            eligible_slice_positions: self.eligible(phase),
        }
    }
}
