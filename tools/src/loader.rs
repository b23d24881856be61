//! 对 `tomo-berry` 存储结构的一层封装. 提供从环境变量或主目录定位数据的入口.

use anyhow::Context;
use std::env;
use std::path::PathBuf;
use tomo_berry::home_dataset_dir_with;
use tomo_berry::record::Manifest;
use tomo_berry::storage::{PaintedMasks, TomoStore};

/// 清单默认文件名.
pub const MANIFEST_NAME: &str = "manifest.csv";

fn dir_from_env_or_home(var: &str, tail: &[&str]) -> anyhow::Result<PathBuf> {
    match env::var(var) {
        Ok(d) if !d.is_empty() => Ok(PathBuf::from(d)),
        _ => home_dataset_dir_with(tail)
            .with_context(|| format!("neither ${var} nor the home directory is available")),
    }
}

/// 获取训练容器根目录.
///
/// 1. 若环境变量 `$TOMO_TRAIN_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/tomo/train`.
pub fn train_dir_from_env_or_home() -> anyhow::Result<PathBuf> {
    dir_from_env_or_home("TOMO_TRAIN_DIR", &["tomo", "train"])
}

/// 获取原始 tomogram 根目录.
///
/// 1. 若环境变量 `$TOMO_RAW_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/tomo/raw`.
pub fn raw_dir_from_env_or_home() -> anyhow::Result<PathBuf> {
    dir_from_env_or_home("TOMO_RAW_DIR", &["tomo", "raw"])
}

/// 获取涂绘标注图根目录.
///
/// 1. 若环境变量 `$TOMO_MASK_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/tomo/mask`.
pub fn mask_dir_from_env_or_home() -> anyhow::Result<PathBuf> {
    dir_from_env_or_home("TOMO_MASK_DIR", &["tomo", "mask"])
}

/// 从 `$TOMO_TRAIN_DIR` 或者 `$HOME/dataset/tomo/train` 打开训练容器存储.
#[inline]
pub fn train_store_from_env_or_home() -> anyhow::Result<TomoStore> {
    Ok(TomoStore::new(train_dir_from_env_or_home()?))
}

/// 从 `$TOMO_RAW_DIR` 或者 `$HOME/dataset/tomo/raw` 打开原始 tomogram 存储.
#[inline]
pub fn raw_store_from_env_or_home() -> anyhow::Result<TomoStore> {
    Ok(TomoStore::new(raw_dir_from_env_or_home()?))
}

/// 从 `$TOMO_MASK_DIR` 或者 `$HOME/dataset/tomo/mask` 定位涂绘标注图.
#[inline]
pub fn masks_from_env_or_home() -> anyhow::Result<PaintedMasks> {
    Ok(PaintedMasks::new(mask_dir_from_env_or_home()?))
}

/// 读取样本 `sample` 的清单 `{raw}/{sample}/manifest.csv`.
pub fn manifest_of(raw: &TomoStore, sample: &str) -> anyhow::Result<Manifest> {
    let mut path = raw.root().join(sample);
    path.push(MANIFEST_NAME);
    Manifest::open(&path, sample).with_context(|| format!("reading {}", path.display()))
}
