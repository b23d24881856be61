//! 为一个或多个样本生成训练容器.
//!
//! 用法: `gen_train_data <sample>...`
//!
//! 目录由 `$TOMO_RAW_DIR`, `$TOMO_MASK_DIR`, `$TOMO_TRAIN_DIR` 指定,
//! 缺省时位于 `$HOME/dataset/tomo/` 下.

use anyhow::Context;
use log::{error, info};
use tomo_berry::fusion::fuse_record;
use tools::loader;

fn main() -> anyhow::Result<()> {
    tools::init_logger()?;

    let samples: Vec<String> = std::env::args().skip(1).collect();
    if samples.is_empty() {
        eprintln!("usage: gen_train_data <sample>...");
        std::process::exit(2);
    }

    let raw = loader::raw_store_from_env_or_home()?;
    let masks = loader::masks_from_env_or_home()?;
    let out = loader::train_store_from_env_or_home()?;

    let mut failed = 0usize;
    for sample in samples.iter() {
        let manifest = loader::manifest_of(&raw, sample)?;
        info!("{sample}: {} tomograms", manifest.len());
        for record in manifest.records() {
            match fuse_record(record, &raw, &masks, &out)
                .with_context(|| format!("{sample}/{}", record.tomo_name))
            {
                Ok(path) => info!("saved {}", path.display()),
                Err(e) => {
                    error!("{e:#}");
                    failed += 1;
                }
            }
        }
        tools::sep();
    }

    if failed > 0 {
        anyhow::bail!("{failed} tomograms failed");
    }
    Ok(())
}
