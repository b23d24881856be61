//! 权重掩码: 决定哪些体素参与损失/指标计算.

use crate::consts::{label, SLICES_PER_TOMO};
use log::debug;
use ndarray::{Array3, ArrayView3, Axis};

/// 5 个标注切片位置的子集.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SlicePositions(u8);

impl SlicePositions {
    /// 全部 5 个位置.
    pub const ALL: Self = Self::from_positions(&[0, 1, 2, 3, 4]);

    /// 仅中心切片.
    pub const CENTER: Self = Self::from_positions(&[2]);

    /// 除中心以外的 4 个切片.
    pub const OFF_CENTER: Self = Self::from_positions(&[0, 1, 3, 4]);

    /// 由位置列表构造. 位置必须小于 5, 否则 panic.
    pub const fn from_positions(positions: &[usize]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < positions.len() {
            assert!(positions[i] < SLICES_PER_TOMO);
            bits |= 1 << positions[i];
            i += 1;
        }
        Self(bits)
    }

    /// 是否包含位置 `pos`?
    #[inline]
    pub const fn contains(self, pos: usize) -> bool {
        pos < SLICES_PER_TOMO && self.0 & (1 << pos) != 0
    }

    /// 包含的位置, 升序.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..SLICES_PER_TOMO).filter(move |&p| self.contains(p))
    }

    /// 补集.
    #[inline]
    pub const fn complement(self) -> Self {
        Self(!self.0 & 0b1_1111)
    }
}

/// 将切片索引转换为合法的深度下标. 截断后落在窗口外的切片返回 `None`.
#[inline]
fn depth_index(slice: i64, depth: usize) -> Option<usize> {
    usize::try_from(slice).ok().filter(|&z| z < depth)
}

/// 计算一个目标的权重掩码.
///
/// * z 限制模式 (`include_zlimits`): 所有非未标注体素有效, 但不在 `eligible`
///   中的标注切片被整体排除.
/// * 仅切片模式: 只有 `eligible` 中的标注切片有效.
///
/// 两种模式下未标注体素 (包括增强旋转进来的空白) 都不参与评分.
/// 落在当前深度以外的切片索引被忽略.
pub fn weight(
    label: ArrayView3<f32>,
    slices: &[i64; SLICES_PER_TOMO],
    eligible: SlicePositions,
    include_zlimits: bool,
) -> Array3<bool> {
    let depth = label.len_of(Axis(0));
    let known = label.mapv(|v| !label::is_unknown(v));
    let (mut ans, marked) = if include_zlimits {
        (known.clone(), eligible.complement())
    } else {
        (Array3::from_elem(label.dim(), false), eligible)
    };

    for pos in marked.iter() {
        let Some(z) = depth_index(slices[pos], depth) else {
            debug!("slice {pos} at {} outside depth {depth}", slices[pos]);
            continue;
        };
        let mut sli = ans.index_axis_mut(Axis(0), z);
        if include_zlimits {
            sli.fill(false);
        } else {
            sli.assign(&known.index_axis(Axis(0), z));
        }
    }
    ans
}
