//! 推理前处理与后处理.
//!
//! 前处理: 强度截断归一化 → 可选的 2 倍降采样 → 居中零填充到块大小的倍数.
//! 后处理是填充的精确几何逆: 用相同的居中偏移把结果裁剪回填充前形状.

use crate::consts::{CLIP_SIGMA, INFERENCE_BLOCK};
use crate::error::{Result, TomoError};
use crate::geometry::padded_shape;
use crate::Idx3d;
use log::info;
use ndarray::{s, Array1, Array3, ArrayView1, ArrayView3, ArrayViewMut1, Axis, Zip};

/// 推理几何配置.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InferenceConfig {
    block: usize,
    bin2: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            block: INFERENCE_BLOCK,
            bin2: false,
        }
    }
}

impl InferenceConfig {
    /// 构建配置. `block` 必须为正, 否则返回 [`TomoError::InvalidConfig`].
    pub fn new(block: usize, bin2: bool) -> Result<Self> {
        if block == 0 {
            return Err(TomoError::InvalidConfig(
                "inference block size must be positive".into(),
            ));
        }
        Ok(Self { block, bin2 })
    }

    /// 块大小.
    #[inline]
    pub fn block(&self) -> usize {
        self.block
    }

    /// 是否 2 倍降采样.
    #[inline]
    pub fn bin2(&self) -> bool {
        self.bin2
    }
}

/// 前处理结果.
#[derive(Debug, Clone)]
pub struct Prepared {
    /// 填充后的体数据, 各维度均为块大小的倍数.
    pub data: Array3<f32>,

    /// 填充前 (降采样后) 的形状.
    pub shape: Idx3d,
}

/// 把强度截断到 `±3` 并线性缩放到 `[-1, 1]`. 输入假定服从标准正态分布.
pub fn normalize(vol: &mut Array3<f32>) {
    vol.mapv_inplace(|v| v.clamp(-CLIP_SIGMA, CLIP_SIGMA) / CLIP_SIGMA);
}

/// 线性插值长度. 与常见的 `round(n * 0.5)` 约定一致 (四舍六入五成双), 至少为 1.
#[inline]
fn binned_len(n: usize) -> usize {
    ((n as f64 * 0.5).round_ties_even() as usize).max(1)
}

/// 沿一条线做线性重采样. 两端点对齐.
fn resample_lane(src: ArrayView1<f32>, mut dst: ArrayViewMut1<f32>) {
    let (n_in, n_out) = (src.len(), dst.len());
    let scale = if n_out > 1 {
        (n_in - 1) as f64 / (n_out - 1) as f64
    } else {
        0.0
    };
    for (i, d) in dst.iter_mut().enumerate() {
        let x = i as f64 * scale;
        let x0 = (x.floor() as usize).min(n_in - 1);
        let x1 = (x0 + 1).min(n_in - 1);
        let f = (x - x0 as f64) as f32;
        *d = src[x0] * (1.0 - f) + src[x1] * f;
    }
}

/// 沿 `axis` 把长度重采样到 `len`.
fn resample_axis(vol: ArrayView3<f32>, axis: Axis, len: usize) -> Array3<f32> {
    let mut shape = vol.raw_dim();
    shape[axis.index()] = len;
    let mut ans = Array3::zeros(shape);
    Zip::from(ans.lanes_mut(axis))
        .and(vol.lanes(axis))
        .for_each(|dst, src| resample_lane(src, dst));
    ans
}

/// 三个维度均以线性插值降采样 2 倍.
pub fn bin2(vol: ArrayView3<f32>) -> Array3<f32> {
    let (d, h, w) = vol.dim();
    let ans = resample_axis(vol, Axis(0), binned_len(d));
    let ans = resample_axis(ans.view(), Axis(1), binned_len(h));
    resample_axis(ans.view(), Axis(2), binned_len(w))
}

/// 居中偏移: 每个维度 `(padded - original) / 2`.
#[inline]
pub fn centered_offsets(padded: Idx3d, original: Idx3d) -> Idx3d {
    (
        (padded.0 - original.0) / 2,
        (padded.1 - original.1) / 2,
        (padded.2 - original.2) / 2,
    )
}

/// 居中零填充到 `block` 的倍数. 已对齐时原样返回.
pub fn pad_centered(vol: Array3<f32>, block: usize) -> Array3<f32> {
    let shape = vol.dim();
    let padded = padded_shape(shape, block);
    if padded == shape {
        return vol;
    }
    let (d, h, w) = shape;
    let (z, y, x) = centered_offsets(padded, shape);

    let mut ans = Array3::zeros(padded);
    ans.slice_mut(s![z..z + d, y..y + h, x..x + w]).assign(&vol);
    info!("tomogram padded from {shape:?} -> {padded:?}");
    ans
}

/// 把 `vol` 按居中偏移裁剪回 `original`.
///
/// `vol` 在任一维度上小于 `original` 时 panic.
pub fn crop_centered(vol: ArrayView3<f32>, original: Idx3d) -> Array3<f32> {
    let (d, h, w) = original;
    let (z, y, x) = centered_offsets(vol.dim(), original);
    vol.slice(s![z..z + d, y..y + h, x..x + w]).to_owned()
}

/// 推理前处理.
pub fn preprocess(mut vol: Array3<f32>, config: &InferenceConfig) -> Prepared {
    normalize(&mut vol);
    if config.bin2 {
        let old = vol.dim();
        vol = bin2(vol.view());
        info!("tomogram binned by 2 from {old:?} -> {:?}", vol.dim());
    }
    let shape = vol.dim();
    Prepared {
        data: pad_centered(vol, config.block),
        shape,
    }
}

/// 推理后处理: 把预测结果裁剪回填充前形状.
#[inline]
pub fn postprocess(result: ArrayView3<f32>, original: Idx3d) -> Array3<f32> {
    crop_centered(result, original)
}

/// 推理后处理, 同时裁剪前处理后的输入, 以便与预测一同保存.
pub fn postprocess_with_data(
    result: ArrayView3<f32>,
    data: ArrayView3<f32>,
    original: Idx3d,
) -> (Array3<f32>, Array3<f32>) {
    (crop_centered(result, original), crop_centered(data, original))
}

/// 把形状编码为一维数组, 便于与数据一同存储.
#[inline]
pub fn shape_to_array((d, h, w): Idx3d) -> Array1<u64> {
    Array1::from(vec![d as u64, h as u64, w as u64])
}

/// [`shape_to_array`] 的逆. 长度不为 3 时返回 `None`.
pub fn shape_from_array(a: ArrayView1<u64>) -> Option<Idx3d> {
    match a.as_slice()? {
        &[d, h, w] => Some((d as usize, h as usize, w as usize)),
        _ => None,
    }
}
