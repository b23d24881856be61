//! 可重放的数据增强.
//!
//! 随机参数只抽取一次 ([`AugmentParams::draw`]), 之后通过纯函数 [`apply`]
//! 把完全相同的几何变换施加到输入和每个目标的标签体上. 标签按掩码处理
//! (最近邻采样, 不做强度变换), 输入按图像处理 (双线性采样 + 色调曲线).
//!
//! 变换顺序: 网格扭曲 → 色调曲线 → 翻转 → 转置 → 90 度旋转 → 安全旋转.
//! 所有变换都在 (高, 宽) 平面内逐切片进行, 深度方向保持不变.

use crate::consts::label;
use crate::Idx2d;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// 平面内旋转角度上限, 以度为单位.
pub const MAX_ROTATION_DEG: f32 = 30.0;

/// 色调曲线 gamma 的对数幅度.
pub const TONE_SCALE: f32 = 0.25;

/// 网格扭曲在每个维度上的格数.
pub const GRID_STEPS: usize = 10;

/// 网格扭曲中每格伸缩比例的幅度.
pub const GRID_DISTORT_LIMIT: f32 = 0.25;

/// 带可选种子的随机数发生器. 没有种子时从系统熵初始化.
pub fn rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// 网格扭曲参数: 每个维度被等分为 [`GRID_STEPS`] 格, 每格按各自比例伸缩.
///
/// 伸缩后整体重新归一化到原长度, 因此扭曲不会把内容移出平面.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridDistortion {
    /// 高度方向 (行) 每格的伸缩比例.
    pub rows: [f32; GRID_STEPS],

    /// 宽度方向 (列) 每格的伸缩比例.
    pub cols: [f32; GRID_STEPS],
}

impl GridDistortion {
    fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut step = || 1.0 + rng.gen_range(-GRID_DISTORT_LIMIT..=GRID_DISTORT_LIMIT);
        Self {
            rows: std::array::from_fn(|_| step()),
            cols: std::array::from_fn(|_| step()),
        }
    }
}

/// 长度为 `n` 的轴在扭曲后, 每个输出位置对应的源坐标.
///
/// 所有比例都为 1 时是恒等映射. 结果单调不减且落在 `[0, n - 1]` 内.
fn grid_map(n: usize, steps: &[f32; GRID_STEPS]) -> Vec<f32> {
    let bounds: Vec<usize> = (0..=GRID_STEPS).map(|k| k * n / GRID_STEPS).collect();
    let total: f32 = bounds
        .windows(2)
        .zip(steps)
        .map(|(b, &s)| (b[1] - b[0]) as f32 * s)
        .sum();
    let scale = if total > 0.0 { n as f32 / total } else { 1.0 };
    let last = n.saturating_sub(1) as f32;

    let mut ans = Vec::with_capacity(n);
    let mut prev = 0.0f32;
    for (b, &s) in bounds.windows(2).zip(steps) {
        for t in 0..b[1] - b[0] {
            ans.push(((prev + t as f32 * s) * scale).min(last));
        }
        prev += (b[1] - b[0]) as f32 * s;
    }
    ans
}

/// 一次抽样得到的全部增强参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AugmentParams {
    /// 网格扭曲. `None` 表示不扭曲.
    pub grid: Option<GridDistortion>,

    /// 左右翻转.
    pub hflip: bool,

    /// 上下翻转.
    pub vflip: bool,

    /// 转置 (高宽互换).
    pub transpose: bool,

    /// 逆时针旋转 90 度的次数, `0..4`.
    pub rot90: u8,

    /// 色调曲线指数, 仅作用于输入图像.
    pub gamma: f32,

    /// 平面内旋转角度, 以弧度为单位.
    pub angle: f32,
}

impl AugmentParams {
    /// 恒等变换.
    pub const IDENTITY: Self = Self {
        grid: None,
        hflip: false,
        vflip: false,
        transpose: false,
        rot90: 0,
        gamma: 1.0,
        angle: 0.0,
    };

    /// 抽取一组参数.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let grid = Some(GridDistortion::draw(rng));
        Self {
            grid,
            hflip: rng.gen_bool(0.5),
            vflip: rng.gen_bool(0.5),
            transpose: true,
            rot90: rng.gen_range(0..4),
            gamma: rng.gen_range(-TONE_SCALE..=TONE_SCALE).exp(),
            angle: rng
                .gen_range(-MAX_ROTATION_DEG..=MAX_ROTATION_DEG)
                .to_radians(),
        }
    }

    /// 输入平面形状为 `(h, w)` 时的输出平面形状.
    #[inline]
    pub fn plane_shape(&self, (h, w): Idx2d) -> Idx2d {
        if self.transpose ^ (self.rot90 % 2 == 1) {
            (w, h)
        } else {
            (h, w)
        }
    }
}

/// 翻转、转置与 90 度旋转. 这些变换只搬移像素, 对图像和掩码完全一致.
fn orient<A: Clone>(p: &AugmentParams, plane: ArrayView2<A>) -> Array2<A> {
    let mut v = plane;
    if p.hflip {
        v.invert_axis(Axis(1));
    }
    if p.vflip {
        v.invert_axis(Axis(0));
    }
    if p.transpose {
        v = v.reversed_axes();
    }
    for _ in 0..p.rot90 {
        v = v.reversed_axes();
        v.invert_axis(Axis(0));
    }
    v.to_owned()
}

/// 按 [`GridDistortion`] 重采样. 源坐标总在平面内.
fn distort(plane: ArrayView2<f32>, grid: &GridDistortion, is_label: bool) -> Array2<f32> {
    let src = plane.to_owned();
    let (h, w) = src.dim();
    let (ys, xs) = (grid_map(h, &grid.rows), grid_map(w, &grid.cols));
    Array2::from_shape_fn((h, w), |(i, j)| {
        if is_label {
            nearest(&src, ys[i], xs[j], label::UNKNOWN_F32)
        } else {
            bilinear(&src, ys[i], xs[j], 0.0)
        }
    })
}

/// 最近邻采样. 越界时返回 `fill`.
fn nearest(src: &Array2<f32>, y: f32, x: f32, fill: f32) -> f32 {
    let (yi, xi) = (y.round(), x.round());
    if yi < 0.0 || xi < 0.0 {
        return fill;
    }
    src.get((yi as usize, xi as usize)).copied().unwrap_or(fill)
}

/// 双线性采样. 越界时返回 `fill`.
fn bilinear(src: &Array2<f32>, y: f32, x: f32, fill: f32) -> f32 {
    let (h, w) = src.dim();
    if y < 0.0 || x < 0.0 || y > (h - 1) as f32 || x > (w - 1) as f32 {
        return fill;
    }
    let (y0, x0) = (y.floor() as usize, x.floor() as usize);
    let (y1, x1) = ((y0 + 1).min(h - 1), (x0 + 1).min(w - 1));
    let (fy, fx) = (y - y0 as f32, x - x0 as f32);

    let top = src[(y0, x0)] * (1.0 - fx) + src[(y0, x1)] * fx;
    let bottom = src[(y1, x0)] * (1.0 - fx) + src[(y1, x1)] * fx;
    top * (1.0 - fy) + bottom * fy
}

/// 绕平面中心旋转 `angle` 弧度, 并缩放使旋转后的整幅平面恰好放进原形状.
///
/// 原平面的内容不会被裁掉. 四角新出现的空白区域: 图像填 0, 掩码填未标注.
fn rotate(plane: Array2<f32>, angle: f32, is_label: bool) -> Array2<f32> {
    if angle == 0.0 {
        return plane;
    }
    let (h, w) = plane.dim();
    let (ch, cw) = ((h as f32 - 1.0) / 2.0, (w as f32 - 1.0) / 2.0);
    let (sin, cos) = angle.sin_cos();

    // 旋转后外接矩形与原平面的比例.
    let (hf, wf) = (h as f32, w as f32);
    let ky = (hf * cos.abs() + wf * sin.abs()) / hf;
    let kx = (wf * cos.abs() + hf * sin.abs()) / wf;

    Array2::from_shape_fn((h, w), |(i, j)| {
        let (y, x) = ((i as f32 - ch) * ky, (j as f32 - cw) * kx);
        let (sy, sx) = (cos * y - sin * x + ch, sin * y + cos * x + cw);
        if is_label {
            nearest(&plane, sy, sx, label::UNKNOWN_F32)
        } else {
            bilinear(&plane, sy, sx, 0.0)
        }
    })
}

/// 色调曲线. 输入假定位于 `[-1, 1]`.
#[inline]
fn tone(v: f32, gamma: f32) -> f32 {
    let t = ((v + 1.0) / 2.0).clamp(0.0, 1.0);
    2.0 * t.powf(gamma) - 1.0
}

/// 对单个平面施加 `params` 描述的变换.
///
/// `is_label` 为 `true` 时按掩码处理: 最近邻采样, 不做色调变换,
/// 因此输出取值仍在原有标签集合内.
pub fn apply(params: &AugmentParams, plane: ArrayView2<f32>, is_label: bool) -> Array2<f32> {
    let mut ans = match params.grid.as_ref() {
        Some(grid) => distort(plane, grid, is_label),
        None => plane.to_owned(),
    };
    if !is_label && params.gamma != 1.0 {
        ans.mapv_inplace(|v| tone(v, params.gamma));
    }
    let oriented = orient(params, ans.view());
    rotate(oriented, params.angle, is_label)
}

/// 对 3D 体的每个深度切片施加同一变换.
pub fn apply_volume(params: &AugmentParams, vol: ArrayView3<f32>, is_label: bool) -> Array3<f32> {
    let (d, h, w) = vol.dim();
    let (oh, ow) = params.plane_shape((h, w));
    let mut ans = Array3::zeros((d, oh, ow));
    for (src, mut dst) in vol.axis_iter(Axis(0)).zip(ans.axis_iter_mut(Axis(0))) {
        dst.assign(&apply(params, src, is_label));
    }
    ans
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    fn argmax(a: &Array2<f32>) -> Idx2d {
        a.indexed_iter()
            .fold(((0, 0), f32::MIN), |best, (pos, &v)| {
                if v > best.1 {
                    (pos, v)
                } else {
                    best
                }
            })
            .0
    }

    #[test]
    fn test_identity() {
        let plane = array![[0.1f32, -0.2, 0.3], [0.4, 0.5, -0.6]];
        assert_eq!(apply(&AugmentParams::IDENTITY, plane.view(), false), plane);
        assert_eq!(apply(&AugmentParams::IDENTITY, plane.view(), true), plane);
    }

    #[test]
    fn test_orient_matches_numpy_conventions() {
        let plane = array![[1.0f32, 2.0], [3.0, 4.0]];
        let rot = AugmentParams {
            rot90: 1,
            ..AugmentParams::IDENTITY
        };
        // np.rot90([[1, 2], [3, 4]]) == [[2, 4], [1, 3]]
        assert_eq!(apply(&rot, plane.view(), true), array![[2.0, 4.0], [1.0, 3.0]]);

        let tr = AugmentParams {
            transpose: true,
            hflip: true,
            ..AugmentParams::IDENTITY
        };
        assert_eq!(apply(&tr, plane.view(), true), array![[2.0, 4.0], [1.0, 3.0]]);
    }

    #[test]
    fn test_shared_draw_keeps_image_and_mask_aligned() {
        let mut r = rng(Some(7));
        for _ in 0..16 {
            let params = AugmentParams {
                grid: None,
                angle: 0.0,
                ..AugmentParams::draw(&mut r)
            };
            let mut image = Array3::from_elem((2, 5, 7), -1.0f32);
            let mut mask = Array3::<f32>::zeros((2, 5, 7));
            image[(1, 1, 5)] = 1.0;
            mask[(1, 1, 5)] = 1.0;

            let ai = apply_volume(&params, image.view(), false);
            let am = apply_volume(&params, mask.view(), true);
            assert_eq!(ai.dim(), am.dim());
            assert_eq!(
                (ai.dim().1, ai.dim().2),
                params.plane_shape((5, 7))
            );
            let pi = argmax(&ai.index_axis(Axis(0), 1).to_owned());
            let pm = argmax(&am.index_axis(Axis(0), 1).to_owned());
            assert_eq!(pi, pm);
        }
    }

    #[test]
    fn test_mask_values_survive_rotation() {
        let mut r = rng(Some(11));
        let mask = Array3::from_shape_fn((3, 16, 12), |(z, h, w)| ((z + h + w) % 3) as f32 - 1.0);
        for _ in 0..8 {
            let params = AugmentParams::draw(&mut r);
            let out = apply_volume(&params, mask.view(), true);
            assert!(out.iter().all(|v| [-1.0, 0.0, 1.0].contains(v)));
        }
    }

    #[test]
    fn test_draw_is_reproducible() {
        let a = AugmentParams::draw(&mut rng(Some(3)));
        let b = AugmentParams::draw(&mut rng(Some(3)));
        assert_eq!(a, b);
        assert!(a.angle.abs() <= MAX_ROTATION_DEG.to_radians());
        assert!(a.rot90 < 4);
    }

    #[test]
    fn test_grid_map() {
        let ones = [1.0f32; GRID_STEPS];
        for n in [1, 7, 10, 33] {
            let m = grid_map(n, &ones);
            assert_eq!(m, (0..n).map(|i| i as f32).collect::<Vec<_>>());
        }

        let mut steps = ones;
        steps[0] = 1.25;
        steps[9] = 0.75;
        let m = grid_map(40, &steps);
        assert_eq!(m.len(), 40);
        assert_eq!(m[0], 0.0);
        assert!(m.windows(2).all(|p| p[0] <= p[1]));
        assert!(m[39] <= 39.0);
        // 第一格被拉伸, 前 4 个输出覆盖更多的源像素.
        assert!(m[4] > 4.0);
    }

    #[test]
    fn test_grid_distortion_keeps_mask_values() {
        let mut r = rng(Some(5));
        let params = AugmentParams {
            grid: Some(GridDistortion::draw(&mut r)),
            ..AugmentParams::IDENTITY
        };
        let mask = Array2::from_shape_fn((24, 30), |(h, w)| if h < 12 && w < 15 { 1.0 } else { 0.0 });
        let out = apply(&params, mask.view(), true);
        assert_eq!(out.dim(), (24, 30));
        assert!(out.iter().all(|v| *v == 0.0 || *v == 1.0));
        assert_eq!(out[(0, 0)], 1.0);
        assert_eq!(out[(23, 29)], 0.0);
    }

    #[test]
    fn test_safe_rotate_keeps_corner_foreground() {
        // 四个角各有一块前景; 普通旋转会把它们全部裁掉.
        let mask = Array2::from_shape_fn((32, 32), |(h, w)| {
            if (h < 4 || h >= 28) && (w < 4 || w >= 28) {
                1.0
            } else {
                0.0
            }
        });
        for deg in [25.0f32, -25.0, 30.0] {
            let params = AugmentParams {
                angle: deg.to_radians(),
                ..AugmentParams::IDENTITY
            };
            let out = apply(&params, mask.view(), true);
            for (hs, ws) in [(0..16, 0..16), (0..16, 16..32), (16..32, 0..16), (16..32, 16..32)] {
                let quadrant = out.slice(ndarray::s![hs, ws]);
                assert!(
                    quadrant.iter().any(|v| *v == 1.0),
                    "corner lost at {deg} degrees"
                );
            }
            // 四角仍会出现未标注区域.
            assert_eq!(out[(0, 0)], label::UNKNOWN_F32);
        }
    }

    #[test]
    fn test_tone_bounds() {
        for g in [0.78f32, 1.0, 1.28] {
            assert!((tone(-1.0, g) + 1.0).abs() < 1e-6);
            assert!((tone(1.0, g) - 1.0).abs() < 1e-6);
        }
    }
}
