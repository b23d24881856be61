//! 运行时错误.

use ndarray_npy::{ReadNpzError, WriteNpzError};
use thiserror::Error;

/// 本 crate 的统一结果类型.
pub type Result<T> = std::result::Result<T, TomoError>;

/// 数据准备与还原过程中的错误.
#[derive(Debug, Error)]
pub enum TomoError {
    /// 清单、tomogram 或其中某个数组不存在. 对当前样本而言总是致命的.
    #[error("missing data: {0}")]
    MissingData(String),

    /// 数组形状与预期不符, 例如涂绘标注图比目标切片更大.
    #[error("shape {found:?} does not fit expected shape {expected:?}")]
    ShapeMismatch {
        /// 实际形状.
        found: Vec<usize>,
        /// 预期形状.
        expected: Vec<usize>,
    },

    /// 索引越界.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// 请求的索引.
        index: usize,
        /// 合法长度.
        len: usize,
    },

    /// 配置错误, 应在启动时发现.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 读取 npz 容器错误.
    #[error(transparent)]
    ReadNpz(#[from] ReadNpzError),

    /// 写入 npz 容器错误.
    #[error(transparent)]
    WriteNpz(#[from] WriteNpzError),

    /// 标注图解码错误.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// 标注清单解析错误.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// 配置文件解析错误.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
