//! 标签融合: 把人工涂绘的 2D 标注图写入稀疏 3D 标签体.
//!
//! 一张涂绘图同时编码了两个目标 (见 [`crate::consts::paint`]).
//! 未被标注的切片保持 [`label::UNKNOWN`], z 范围以外的切片强制为
//! [`label::ABSENT`].

use crate::consts::{label, paint, DATA_KEY};
use crate::error::{Result, TomoError};
use crate::record::AnnotationRecord;
use crate::storage::{PaintedMasks, TomoStore};
use crate::{Idx2d, Idx3d, Target};
use log::{info, warn};
use ndarray::{s, Array2, Array3, ArrayView2, Axis, Zip};
use std::collections::VecDeque;
use std::path::PathBuf;

/// 填充二值图中的空洞: 所有无法经 4-相邻背景路径连到图像边缘的背景像素
/// 都被置为前景. 以此法修改了原图则返回 `true`.
pub fn fill_holes(mask: &mut Array2<bool>) -> bool {
    let (h, w) = mask.dim();
    if h == 0 || w == 0 {
        return false;
    }

    // 从边缘出发, 标记所有能到达的背景像素.
    let mut outside = Array2::from_elem((h, w), false);
    let mut bfs_q = VecDeque::with_capacity(2 * (h + w));
    let border = (0..h)
        .flat_map(|i| [(i, 0), (i, w - 1)])
        .chain((0..w).flat_map(|j| [(0, j), (h - 1, j)]));
    for pos in border {
        if !mask[pos] && !outside[pos] {
            outside[pos] = true;
            bfs_q.push_back(pos);
        }
    }

    while let Some((cur_h, cur_w)) = bfs_q.pop_front() {
        let n4 = [
            (cur_h.wrapping_sub(1), cur_w),
            (cur_h + 1, cur_w),
            (cur_h, cur_w.wrapping_sub(1)),
            (cur_h, cur_w + 1),
        ];
        for pos in n4 {
            if pos.0 < h && pos.1 < w && !mask[pos] && !outside[pos] {
                outside[pos] = true;
                bfs_q.push_back(pos);
            }
        }
    }

    let mut non_trivial = false;
    Zip::from(&mut *mask).and(&outside).for_each(|m, &o| {
        if !*m && !o {
            *m = true;
            non_trivial = true;
        }
    });
    non_trivial
}

/// 若标注图比目标切片小, 则在原点一角零填充到 `slice` 大小.
///
/// 上游的取整误差会让标注图偶尔差一两个像素. 比目标切片大的标注图不在约定范围内,
/// 返回 [`TomoError::ShapeMismatch`].
pub fn fit_mask(mask: Array2<u8>, slice: Idx2d) -> Result<Array2<u8>> {
    let (h, w) = mask.dim();
    if (h, w) == slice {
        return Ok(mask);
    }
    if h > slice.0 || w > slice.1 {
        return Err(TomoError::ShapeMismatch {
            found: vec![h, w],
            expected: vec![slice.0, slice.1],
        });
    }

    warn!("painted mask {:?} padded to {:?}", (h, w), slice);
    let mut ans = Array2::zeros(slice);
    ans.slice_mut(s![..h, ..w]).assign(&mask);
    Ok(ans)
}

/// 以谓词 `pred` 二值化标注图并填充空洞.
pub fn binary_slice(mask: ArrayView2<u8>, pred: fn(u8) -> bool) -> Array2<bool> {
    let mut ans = mask.mapv(pred);
    fill_holes(&mut ans);
    ans
}

/// 将涂绘标注图 `painted` 融合进两个 3D 标签体的第 `index` 个切片.
///
/// 该切片原有内容 (通常是未标注哨兵值) 会被覆盖. 对同一输入重复调用结果不变.
/// 两个标签体形状不一致时返回 [`TomoError::ShapeMismatch`].
pub fn insert_labels(
    painted: ArrayView2<u8>,
    index: usize,
    mito: &mut Array3<i8>,
    granule: &mut Array3<i8>,
) -> Result<()> {
    let (depth, h, w) = mito.dim();
    if granule.dim() != mito.dim() {
        return Err(TomoError::ShapeMismatch {
            found: granule.shape().to_vec(),
            expected: mito.shape().to_vec(),
        });
    }
    if index >= depth {
        return Err(TomoError::IndexOutOfRange { index, len: depth });
    }

    let painted = fit_mask(painted.to_owned(), (h, w))?;
    let targets = [
        (mito, paint::is_mito as fn(u8) -> bool),
        (granule, paint::is_granule as fn(u8) -> bool),
    ];
    for (volume, pred) in targets {
        let binary = binary_slice(painted.view(), pred);
        Zip::from(volume.index_axis_mut(Axis(0), index))
            .and(&binary)
            .for_each(|v, &b| *v = if b { label::PRESENT } else { label::ABSENT });
    }
    Ok(())
}

/// 同一 tomogram 的线粒体与颗粒标签体.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPair {
    /// 线粒体标签体.
    pub mito: Array3<i8>,

    /// 颗粒标签体.
    pub granule: Array3<i8>,
}

impl LabelPair {
    /// 创建形状为 `shape` 的未标注标签体, 并把 `[0, z_min)` 和 `[z_max, D)`
    /// 范围内的切片置为确定不存在.
    ///
    /// 超出深度的 z 限制会被截到 `D`.
    pub fn new(shape: Idx3d, z_min: usize, z_max: usize) -> Self {
        let depth = shape.0;
        let mut volume = Array3::from_elem(shape, label::UNKNOWN);
        volume
            .slice_mut(s![..z_min.min(depth), .., ..])
            .fill(label::ABSENT);
        volume
            .slice_mut(s![z_max.min(depth).., .., ..])
            .fill(label::ABSENT);

        Self {
            granule: volume.clone(),
            mito: volume,
        }
    }

    /// 融合一张涂绘标注图, 见 [`insert_labels`].
    #[inline]
    pub fn insert(&mut self, painted: ArrayView2<u8>, index: usize) -> Result<()> {
        insert_labels(painted, index, &mut self.mito, &mut self.granule)
    }

    /// 按目标获取标签体.
    #[inline]
    pub fn get(&self, target: Target) -> &Array3<i8> {
        match target {
            Target::Mito => &self.mito,
            Target::Granule => &self.granule,
        }
    }
}

/// 为一条标注记录生成训练容器.
///
/// 从 `raw` 读取原始 `data`, 按 z 限制初始化标签体, 从 `masks` 读取 5 张涂绘图并融合,
/// 最后把 `data`, `mito`, `granule` 一并写入 `out` 中同名的容器.
pub fn fuse_record(
    record: &AnnotationRecord,
    raw: &TomoStore,
    masks: &PaintedMasks,
    out: &TomoStore,
) -> Result<PathBuf> {
    let data = raw.open(&record.sample, &record.tomo_name)?.data()?;
    let mut pair = LabelPair::new(data.dim(), record.z_min, record.z_max);

    for &slice in record.slices.iter() {
        let painted = masks.read(&record.sample, record.stem(), slice)?;
        let index = usize::try_from(slice).map_err(|_| {
            TomoError::InvalidConfig(format!("{}: negative slice {slice}", record.tomo_name))
        })?;
        pair.insert(painted.view(), index)?;
    }
    info!(
        "{}: fused {} slices into {:?}",
        record.tomo_name,
        record.slices.len(),
        data.dim()
    );

    let mut writer = out.create(&record.sample, &record.tomo_name)?;
    writer.add(DATA_KEY, &data)?;
    for target in Target::ALL {
        writer.add(target.key(), pair.get(target))?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fill_ring_to_disk() {
        let mut ring = array![
            [false, false, false, false, false],
            [false, true, true, true, false],
            [false, true, false, true, false],
            [false, true, true, true, false],
            [false, false, false, false, false],
        ];
        assert!(fill_holes(&mut ring));
        assert!(ring[(2, 2)]);
        assert_eq!(ring.iter().filter(|b| **b).count(), 9);
        // 再填一次不会有变化.
        assert!(!fill_holes(&mut ring));
    }

    #[test]
    fn test_fill_keeps_open_background() {
        // 开口的 "U" 形, 内部与边缘连通.
        let mut u = array![
            [true, false, true],
            [true, false, true],
            [true, true, true],
        ];
        let before = u.clone();
        assert!(!fill_holes(&mut u));
        assert_eq!(u, before);
    }

    #[test]
    fn test_fill_diagonal_leak_is_still_a_hole() {
        // 4-相邻意义下, 对角缺口不会把内部连到外部.
        let mut m = array![
            [false, true, false],
            [true, false, true],
            [false, true, false],
        ];
        assert!(fill_holes(&mut m));
        assert!(m[(1, 1)]);
        assert!(!m[(0, 0)]);
    }

    #[test]
    fn test_fit_mask() {
        let m = Array2::from_elem((2, 3), 7u8);
        let fitted = fit_mask(m, (3, 4)).unwrap();
        assert_eq!(fitted.dim(), (3, 4));
        assert_eq!(fitted[(1, 2)], 7);
        assert_eq!(fitted[(2, 0)], 0);
        assert_eq!(fitted[(0, 3)], 0);

        let too_big = Array2::<u8>::zeros((4, 4));
        assert!(matches!(
            fit_mask(too_big, (3, 4)),
            Err(TomoError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_label_pair_zlimits() {
        let pair = LabelPair::new((10, 2, 2), 2, 8);
        for z in 0..10 {
            let expected = if (2..8).contains(&z) {
                label::UNKNOWN
            } else {
                label::ABSENT
            };
            assert!(pair.mito.index_axis(Axis(0), z).iter().all(|v| *v == expected));
            assert!(pair.granule.index_axis(Axis(0), z).iter().all(|v| *v == expected));
        }
    }

    #[test]
    fn test_insert_labels_encoding() {
        let mut pair = LabelPair::new((4, 3, 3), 0, 4);
        let painted = array![[254u8, 253, 0], [0, 0, 0], [0, 0, 252]];
        pair.insert(painted.view(), 1).unwrap();

        let mito = pair.mito.index_axis(Axis(0), 1);
        let granule = pair.granule.index_axis(Axis(0), 1);
        assert_eq!(mito[(0, 0)], label::PRESENT);
        assert_eq!(granule[(0, 0)], label::ABSENT);
        assert_eq!(mito[(0, 1)], label::PRESENT);
        assert_eq!(granule[(0, 1)], label::PRESENT);
        assert_eq!(mito[(2, 2)], label::ABSENT);

        // 其他切片仍为未标注.
        assert!(pair.mito.index_axis(Axis(0), 0).iter().all(|v| *v == label::UNKNOWN));
        assert!(pair.granule.index_axis(Axis(0), 2).iter().all(|v| *v == label::UNKNOWN));
    }

    #[test]
    fn test_insert_labels_idempotent_and_padded() {
        let mut pair = LabelPair::new((3, 4, 4), 0, 3);
        let painted = array![[255u8, 255, 255], [255, 0, 255], [255, 255, 255]];
        pair.insert(painted.view(), 2).unwrap();
        let once = pair.clone();
        pair.insert(painted.view(), 2).unwrap();
        assert_eq!(pair, once);

        let sli = pair.mito.index_axis(Axis(0), 2);
        assert_eq!(sli[(1, 1)], label::PRESENT);
        assert_eq!(sli[(3, 3)], label::ABSENT);
        assert_eq!(sli.iter().filter(|v| **v == label::PRESENT).count(), 9);
    }

    #[test]
    fn test_insert_labels_volume_mismatch() {
        let mut mito = Array3::from_elem((3, 2, 2), label::UNKNOWN);
        let mut granule = Array3::from_elem((3, 2, 3), label::UNKNOWN);
        let painted = Array2::<u8>::zeros((2, 2));
        let err = insert_labels(painted.view(), 0, &mut mito, &mut granule).unwrap_err();
        match err {
            TomoError::ShapeMismatch { found, expected } => {
                assert_eq!(found, [3, 2, 3]);
                assert_eq!(expected, [3, 2, 2]);
            }
            e => panic!("unexpected error {e}"),
        }
        assert!(mito.iter().all(|v| *v == label::UNKNOWN));
    }

    #[test]
    fn test_insert_labels_out_of_range() {
        let mut pair = LabelPair::new((3, 2, 2), 0, 3);
        let painted = Array2::<u8>::zeros((2, 2));
        assert!(matches!(
            pair.insert(painted.view(), 3),
            Err(TomoError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }
}
