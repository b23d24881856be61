//! 外部分割模型前后的数据处理.
//!
//! ```text
//! mito_seg prep <in.npz> <out.npz> [--bin2]
//! mito_seg restore <prepared.npz> <prediction.npz> <out.npz> [--copy]
//! ```
//!
//! `prep` 写出 `data` (归一化并居中填充后的体) 和 `shape` (填充前形状);
//! 模型把预测写入 `mito_pred`; `restore` 把预测裁剪回 `shape`, `--copy`
//! 时一并写出裁剪后的 `data`.

use anyhow::{bail, Context};
use log::info;
use ndarray::{Array1, Array3};
use std::path::PathBuf;
use tomo_berry::consts::{DATA_KEY, INFERENCE_BLOCK, PREDICTION_KEY, SHAPE_KEY};
use tomo_berry::inference::{self, InferenceConfig};
use tomo_berry::storage::{TomoArchive, TomoWriter};

fn usage() -> ! {
    eprintln!("usage:");
    eprintln!("  mito_seg prep <in.npz> <out.npz> [--bin2]");
    eprintln!("  mito_seg restore <prepared.npz> <prediction.npz> <out.npz> [--copy]");
    std::process::exit(2);
}

/// 拆分位置参数与开关. 仅接受 `flag` 这一个开关.
fn split_args(args: Vec<String>, flag: &str) -> anyhow::Result<(Vec<PathBuf>, bool)> {
    let mut paths = Vec::new();
    let mut on = false;
    for a in args {
        if a == flag {
            on = true;
        } else if a.starts_with("--") {
            bail!("unknown option `{a}`");
        } else {
            paths.push(PathBuf::from(a));
        }
    }
    Ok((paths, on))
}

fn prep(input: PathBuf, output: PathBuf, bin2: bool) -> anyhow::Result<()> {
    let data = TomoArchive::open(&input)?
        .data()
        .with_context(|| format!("reading {}", input.display()))?;
    let config = InferenceConfig::new(INFERENCE_BLOCK, bin2)?;
    let prepared = inference::preprocess(data, &config);
    info!(
        "{}: {:?} -> {:?}",
        input.display(),
        prepared.shape,
        prepared.data.dim()
    );

    let mut writer = TomoWriter::create(&output)?;
    writer.add(DATA_KEY, &prepared.data)?;
    writer.add(SHAPE_KEY, &inference::shape_to_array(prepared.shape))?;
    writer.finish()?;
    Ok(())
}

fn restore(
    prepared: PathBuf,
    prediction: PathBuf,
    output: PathBuf,
    copy: bool,
) -> anyhow::Result<()> {
    let mut archive = TomoArchive::open(&prepared)?;
    let raw_shape: Array1<u64> = archive.read(SHAPE_KEY)?;
    let shape = inference::shape_from_array(raw_shape.view())
        .with_context(|| format!("malformed `{SHAPE_KEY}` in {}", prepared.display()))?;

    let pred: Array3<f32> = TomoArchive::open(&prediction)?
        .read(PREDICTION_KEY)
        .with_context(|| format!("reading {}", prediction.display()))?;

    let mut writer = TomoWriter::create(&output)?;
    if copy {
        let data = archive.data()?;
        let (pred, data) = inference::postprocess_with_data(pred.view(), data.view(), shape);
        writer.add(PREDICTION_KEY, &pred)?;
        writer.add(DATA_KEY, &data)?;
    } else {
        writer.add(PREDICTION_KEY, &inference::postprocess(pred.view(), shape))?;
    }
    let path = writer.finish()?;
    info!("restored {shape:?} into {}", path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tools::init_logger()?;

    let mut args = std::env::args().skip(1);
    let cmd = args.next().unwrap_or_else(|| usage());
    let rest: Vec<String> = args.collect();

    match cmd.as_str() {
        "prep" => {
            let (paths, bin2) = split_args(rest, "--bin2")?;
            let [input, output]: [PathBuf; 2] = paths.try_into().unwrap_or_else(|_| usage());
            prep(input, output, bin2)
        }
        "restore" => {
            let (paths, copy) = split_args(rest, "--copy")?;
            let [prepared, prediction, output]: [PathBuf; 3] =
                paths.try_into().unwrap_or_else(|_| usage());
            restore(prepared, prediction, output, copy)
        }
        "--help" | "-h" => usage(),
        other => bail!("unknown command `{other}`"),
    }
}
