//! 通用常量.

/// 3D 标签体素取值.
///
/// 标签体在存储中以 `i8` 保存, 进入样本组装流程后转换为 `f32`,
/// 因此这里同时提供两种表示.
pub mod label {
    /// 未标注 (没有任何信息).
    pub const UNKNOWN: i8 = -1;

    /// 确定不存在目标结构.
    pub const ABSENT: i8 = 0;

    /// 确定存在目标结构.
    pub const PRESENT: i8 = 1;

    /// `UNKNOWN` 的浮点表示.
    pub const UNKNOWN_F32: f32 = UNKNOWN as f32;

    /// 体素是否未标注?
    #[inline]
    pub fn is_unknown(v: f32) -> bool {
        v == UNKNOWN_F32
    }
}

/// 人工涂绘的 2D 标注图编码.
pub mod paint {
    /// 像素值不低于该值即为线粒体 (结构 A).
    pub const MITO_THRESHOLD: u8 = 253;

    /// 像素值恰为该值即为颗粒 (结构 B). 颗粒区域是线粒体区域的子集.
    pub const GRANULE_MARKER: u8 = 253;

    /// 像素是否属于线粒体?
    #[inline]
    pub const fn is_mito(p: u8) -> bool {
        p >= MITO_THRESHOLD
    }

    /// 像素是否属于颗粒?
    #[inline]
    pub const fn is_granule(p: u8) -> bool {
        p == GRANULE_MARKER
    }
}

/// 每个 tomogram 标注的水平切片个数.
pub const SLICES_PER_TOMO: usize = 5;

/// 作为深度截断中心的切片位置 (第 2 个, 从 0 开始).
pub const CENTER_SLICE: usize = 2;

/// 训练/验证阶段的默认深度上限.
pub const DEPTH_LIMIT: usize = 128;

/// 3D UNet 要求的各维度对齐步长.
pub const NET_STRIDE: usize = 32;

/// 推理阶段居中填充的块大小.
pub const INFERENCE_BLOCK: usize = 64;

/// 推理前强度截断的标准差倍数. 输入假定服从标准正态分布.
pub const CLIP_SIGMA: f32 = 3.0;

/// 存储容器中原始数据的数组名.
pub const DATA_KEY: &str = "data";

/// 预测结果写回时使用的数组名.
pub const PREDICTION_KEY: &str = "mito_pred";

/// 预处理结果中记录填充前形状的数组名.
pub const SHAPE_KEY: &str = "shape";
