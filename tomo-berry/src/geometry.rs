//! 体数据几何工具: 对齐填充、深度截断.
//!
//! 这里的填充是 **非居中** 的: 所有新增空间都加在各轴的高端.
//! 推理路径使用的居中填充见 [`crate::inference`].

use crate::consts::CENTER_SLICE;
use crate::record::SampleRecord;
use crate::Idx3d;
use log::debug;
use ndarray::{s, Array3, Axis, Slice};
use std::ops::Range;

/// 将 `n` 向上取整到 `r` 的倍数.
///
/// `r` 为 0 时 panic. 该值应当在启动时由配置校验拦截.
#[inline]
pub fn round_up(n: usize, r: usize) -> usize {
    assert!(r > 0, "对齐步长必须为正");
    n.div_ceil(r) * r
}

/// 各维度向上对齐到 `r` 的倍数后的形状.
#[inline]
pub fn padded_shape((d, h, w): Idx3d, r: usize) -> Idx3d {
    (round_up(d, r), round_up(h, r), round_up(w, r))
}

/// 将三个维度都零填充到 `r` 的倍数, 原数据位于原点一角.
///
/// 若已经对齐, 则原样返回 `x` 本身 (不会复制).
pub fn pad<A: Clone + Default>(x: Array3<A>, r: usize) -> Array3<A> {
    let (d, h, w) = x.dim();
    let shape = padded_shape((d, h, w), r);
    if shape == (d, h, w) {
        return x;
    }

    let mut ans = Array3::from_elem(shape, A::default());
    ans.slice_mut(s![..d, ..h, ..w]).assign(&x);
    ans
}

/// 计算深度截断窗口.
///
/// 深度不超过 `limit` 时返回 `None`. 否则返回长度恰为 `limit` 的窗口,
/// 并尽可能以 `center` 为中心; 放不下时贴住头部或尾部.
pub fn depth_window(depth: usize, center: i64, limit: usize) -> Option<Range<usize>> {
    if depth <= limit {
        return None;
    }
    let (d, l) = (depth as i64, limit as i64);
    let lo = center.saturating_sub(l / 2);

    let lo = if (0..=d - l).contains(&lo) {
        lo
    } else if center >= d / 2 {
        d - l
    } else {
        0
    };
    Some(lo as usize..(lo + l) as usize)
}

/// 将样本在深度方向截断到 `limit`, 并尽量保留中心标注切片.
///
/// 所有深度索引数组都被裁剪到同一窗口, 5 个切片索引都减去窗口下界
/// (落在窗口外的索引可能变为负数或超出新深度). 发生截断时返回 `true`.
pub fn truncate(record: &mut SampleRecord, limit: usize) -> bool {
    let Some(window) = depth_window(record.shape.0, record.slices[CENTER_SLICE], limit) else {
        return false;
    };
    debug!(
        "{}: depth {} truncated to {:?}",
        record.tomo_name, record.shape.0, window
    );

    let lo = window.start;
    record
        .data
        .slice_axis_inplace(Axis(0), Slice::from(window.clone()));
    for label in record.labels.values_mut() {
        label.slice_axis_inplace(Axis(0), Slice::from(window.clone()));
    }
    for s in record.slices.iter_mut() {
        *s -= lo as i64;
    }
    record.shape.0 = limit;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Target;
    use ndarray::Array3;
    use std::collections::BTreeMap;

    fn record(depth: usize, slices: [i64; 5]) -> SampleRecord {
        let data = Array3::from_shape_fn((depth, 2, 3), |(z, _, _)| z as f32);
        let mut labels = BTreeMap::new();
        labels.insert(
            Target::Mito,
            Array3::from_shape_fn((depth, 2, 3), |(z, _, _)| -(z as f32)),
        );
        SampleRecord {
            tomo_name: "t.npz".to_string(),
            shape: (depth, 2, 3),
            data,
            labels,
            slices,
        }
    }

    #[test]
    fn test_pad_shape_and_corner() {
        let x = Array3::from_elem((3, 33, 64), 1.0f32);
        let p = pad(x, 32);
        assert_eq!(p.dim(), (32, 64, 64));
        assert_eq!(p[(2, 32, 63)], 1.0);
        assert_eq!(p[(3, 0, 0)], 0.0);
        assert_eq!(p[(0, 33, 0)], 0.0);
        assert_eq!(p.iter().filter(|v| **v == 1.0).count(), 3 * 33 * 64);
    }

    #[test]
    fn test_pad_noop_keeps_buffer() {
        let x = Array3::from_shape_fn((32, 64, 32), |(z, h, w)| (z + h + w) as f32);
        let ptr = x.as_ptr();
        let expected = x.clone();
        let p = pad(x, 32);
        assert_eq!(p.as_ptr(), ptr);
        assert_eq!(p, expected);
    }

    #[test]
    fn test_pad_idempotent() {
        for r in [1, 3, 8, 32] {
            let x = Array3::from_shape_fn((5, 9, 17), |(z, h, w)| (z * h + w) as i8);
            let once = pad(x, r);
            let twice = pad(once.clone(), r);
            assert_eq!(once, twice);
        }
    }

    #[test]
    #[should_panic]
    fn test_pad_zero_stride() {
        pad(Array3::<f32>::zeros((1, 1, 1)), 0);
    }

    #[test]
    fn test_depth_window_cases() {
        assert_eq!(depth_window(100, 50, 128), None);
        assert_eq!(depth_window(128, 50, 128), None);
        assert_eq!(depth_window(200, 100, 128), Some(36..164));
        assert_eq!(depth_window(200, 10, 128), Some(0..128));
        assert_eq!(depth_window(200, 190, 128), Some(72..200));
        // 对称窗口刚好贴住尾部.
        assert_eq!(depth_window(200, 136, 128), Some(72..200));
        // 极端中心索引不溢出, 窗口贴住首尾.
        assert_eq!(depth_window(200, i64::MAX, 128), Some(72..200));
        assert_eq!(depth_window(200, i64::MIN, 128), Some(0..128));
        assert_eq!(depth_window(200, i64::MIN + 1, 7), Some(0..7));
        for center in -5..210 {
            for limit in [1, 7, 64, 127, 128] {
                let w = depth_window(200, center, limit).unwrap();
                assert_eq!(w.len(), limit);
                assert!(w.end <= 200);
            }
        }
    }

    #[test]
    fn test_truncate_symmetric() {
        let mut r = record(200, [20, 60, 100, 140, 180]);
        assert!(truncate(&mut r, 128));
        assert_eq!(r.shape, (128, 2, 3));
        assert_eq!(r.data.dim(), (128, 2, 3));
        assert_eq!(r.labels[&Target::Mito].dim(), (128, 2, 3));
        assert_eq!(r.slices, [-16, 24, 64, 104, 144]);
        assert_eq!(r.data[(0, 0, 0)], 36.0);
        assert_eq!(r.labels[&Target::Mito][(127, 1, 2)], -163.0);
    }

    #[test]
    fn test_truncate_head_clamp() {
        let mut r = record(200, [2, 5, 10, 15, 150]);
        assert!(truncate(&mut r, 128));
        assert_eq!(r.slices[CENTER_SLICE], 10);
        assert_eq!(r.data[(0, 0, 0)], 0.0);
        assert_eq!(r.data[(127, 0, 0)], 127.0);
    }

    #[test]
    fn test_truncate_noop_when_short() {
        let mut r = record(90, [10, 20, 30, 40, 50]);
        let before = r.data.clone();
        assert!(!truncate(&mut r, 128));
        assert_eq!(r.shape, (90, 2, 3));
        assert_eq!(r.slices, [10, 20, 30, 40, 50]);
        assert_eq!(r.data, before);
    }
}
