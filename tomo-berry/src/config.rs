//! 数据集配置. 以 JSON 保存, 在启动时一次性校验.

use crate::consts::{DEPTH_LIMIT, NET_STRIDE};
use crate::error::{Result, TomoError};
use crate::phase::Flavour;
use crate::record::SplitKind;
use crate::Target;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_targets() -> Vec<String> {
    vec![Target::Mito.key().to_owned()]
}

fn default_flavour() -> String {
    "basic".to_owned()
}

const fn default_depth_limit() -> usize {
    DEPTH_LIMIT
}

const fn default_stride() -> usize {
    NET_STRIDE
}

const fn default_rf() -> usize {
    1
}

/// 数据集配置.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// tomogram 容器根目录.
    pub root: PathBuf,

    /// 目标名列表.
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,

    /// 数据集风格键名, 见 [`crate::phase::FLAVOURS`].
    #[serde(default = "default_flavour")]
    pub flavour: String,

    /// 权重是否包含 z 限制推出的背景信号.
    #[serde(default)]
    pub include_zlimits: bool,

    /// 训练/验证阶段的深度上限.
    #[serde(default = "default_depth_limit")]
    pub depth_limit: usize,

    /// 网络对齐步长.
    #[serde(default = "default_stride")]
    pub stride: usize,

    /// 训练阶段的复制因子.
    #[serde(default = "default_rf")]
    pub replication_factor: usize,

    /// 训练阶段是否做数据增强.
    #[serde(default)]
    pub augment: bool,

    /// 增强随机种子. 缺省时每次从系统熵初始化.
    #[serde(default)]
    pub seed: Option<u64>,

    /// 交叉验证划分方式. 设置时必须同时给出 `sample` 与 `fold`.
    #[serde(default)]
    pub split: Option<SplitKind>,

    /// 参与划分的样本名.
    #[serde(default)]
    pub sample: Option<String>,

    /// 留作测试的折编号.
    #[serde(default)]
    pub fold: Option<i32>,
}

/// 校验后的配置.
#[derive(Debug, Clone)]
pub struct ValidConfig {
    /// 原始配置.
    pub raw: DatasetConfig,

    /// 解析后的目标.
    pub targets: Vec<Target>,

    /// 解析后的风格.
    pub flavour: Flavour,
}

impl DatasetConfig {
    /// 以默认值构建指向 `root` 的配置.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
            targets: default_targets(),
            flavour: default_flavour(),
            include_zlimits: false,
            depth_limit: DEPTH_LIMIT,
            stride: NET_STRIDE,
            replication_factor: 1,
            augment: false,
            seed: None,
            split: None,
            sample: None,
            fold: None,
        }
    }

    /// 从 JSON 字符串解析.
    #[inline]
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// 从 JSON 文件解析.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TomoError::MissingData(format!(
                "config {} not found",
                path.display()
            )));
        }
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// 校验配置. 任何几何参数为 0、未知目标或未知风格都是配置错误.
    pub fn validate(self) -> Result<ValidConfig> {
        let invalid = |msg: &str| Err(TomoError::InvalidConfig(msg.to_owned()));
        if self.stride == 0 {
            return invalid("stride must be positive");
        }
        if self.depth_limit == 0 {
            return invalid("depth_limit must be positive");
        }
        if self.replication_factor == 0 {
            return invalid("replication_factor must be positive");
        }
        if self.targets.is_empty() {
            return invalid("at least one target is required");
        }
        if self.split.is_some() && (self.sample.is_none() || self.fold.is_none()) {
            return invalid("split requires both sample and fold");
        }

        let mut targets = Vec::with_capacity(self.targets.len());
        for name in self.targets.iter() {
            let t: Target = name.parse()?;
            if targets.contains(&t) {
                return Err(TomoError::InvalidConfig(format!("duplicate target `{t}`")));
            }
            targets.push(t);
        }
        let flavour = Flavour::from_key(&self.flavour)?;

        Ok(ValidConfig {
            raw: self,
            targets,
            flavour,
        })
    }
}
