//! 样本组装: 从标注记录产出一个完整的训练/验证/测试/预测样本.
//!
//! 每次取样都从存储重新读取, 不做跨样本缓存; 每个 [`SampleRecord`]
//! 只归当前调用所有, 因此可以按样本索引并行取样而无需加锁.

use crate::augment::{self, AugmentParams};
use crate::config::ValidConfig;
use crate::error::{Result, TomoError};
use crate::geometry::{pad, truncate};
use crate::phase::{Phase, PhaseConfig};
use crate::record::{AnnotationRecord, Manifest, SampleRecord};
use crate::storage::TomoStore;
use crate::weight::weight;
use crate::Target;
use log::debug;
use ndarray::{Array3, Array4, Axis};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 交给模型的一个样本.
#[derive(Debug, Clone)]
pub struct Example {
    /// 输入, 形状 `(1, D, H, W)`.
    pub input: Array4<f32>,

    /// 每个目标的输出 (标签), 形状 `(1, D, H, W)`.
    pub outputs: BTreeMap<Target, Array4<f32>>,

    /// 每个目标的权重掩码, 形状 `(D, H, W)`. 预测阶段为空.
    pub weights: BTreeMap<Target, Array3<bool>>,

    /// tomogram 文件名.
    pub tomo_name: String,
}

/// 复制因子不为 1 时, 有效长度向上取整到 4 的倍数, 以保持固定批大小下的批组成稳定.
#[inline]
pub fn effective_len(num_records: usize, rf: usize) -> usize {
    if rf == 1 {
        num_records
    } else {
        (num_records * rf).div_ceil(4) * 4
    }
}

/// 单个阶段的数据集.
#[derive(Debug, Clone)]
pub struct TomoDataset {
    records: Vec<AnnotationRecord>,
    store: TomoStore,
    targets: Vec<Target>,
    phase: PhaseConfig,
    include_zlimits: bool,
    depth_limit: usize,
    stride: usize,
    rf: usize,
    seed: Option<u64>,
}

impl TomoDataset {
    /// 由校验后的配置构建 `phase` 阶段的数据集.
    pub fn new(records: Vec<AnnotationRecord>, config: &ValidConfig, phase: Phase) -> Self {
        let raw = &config.raw;
        let phase = config.flavour.phase_config(phase, raw.augment);
        let rf = if phase.keeps_replication() {
            raw.replication_factor
        } else {
            1
        };
        Self {
            records,
            store: TomoStore::new(&raw.root),
            targets: config.targets.clone(),
            phase,
            include_zlimits: raw.include_zlimits,
            depth_limit: raw.depth_limit,
            stride: raw.stride,
            rf,
            seed: raw.seed,
        }
    }

    /// 由清单构建 `phase` 阶段的数据集.
    ///
    /// 配置了 `split` 时按 [`Manifest::select`] 挑选记录, 否则使用全部记录.
    pub fn from_manifest(manifest: &Manifest, config: &ValidConfig, phase: Phase) -> Self {
        let raw = &config.raw;
        let records = match (raw.split, raw.sample.as_deref(), raw.fold) {
            (Some(kind), Some(sample), Some(fold)) => manifest.select(phase, sample, kind, fold),
            _ => manifest.records().to_vec(),
        };
        Self::new(records, config, phase)
    }

    /// 阶段配置.
    #[inline]
    pub fn phase(&self) -> &PhaseConfig {
        &self.phase
    }

    /// 实际记录数.
    #[inline]
    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    /// 有效长度, 见 [`effective_len`].
    #[inline]
    pub fn len(&self) -> usize {
        effective_len(self.records.len(), self.rf)
    }

    /// 数据集是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 逻辑索引对应的记录. 越界时返回 [`TomoError::IndexOutOfRange`].
    pub fn record_at(&self, index: usize) -> Result<&AnnotationRecord> {
        let len = self.len();
        if index >= len {
            return Err(TomoError::IndexOutOfRange { index, len });
        }
        Ok(&self.records[index % self.records.len()])
    }

    /// 逻辑索引对应的容器路径.
    pub fn path_at(&self, index: usize) -> Result<PathBuf> {
        let r = self.record_at(index)?;
        Ok(self.store.path_of(&r.sample, &r.tomo_name))
    }

    /// 取第 `index` 个样本.
    pub fn get(&self, index: usize) -> Result<Example> {
        let record = self.record_at(index)?;
        let params = self.phase.apply_augmentation.then(|| {
            let mut rng = augment::rng(self.seed.map(|s| s.wrapping_add(index as u64)));
            AugmentParams::draw(&mut rng)
        });
        self.build_example(record, params.as_ref())
    }

    /// 按顺序迭代所有样本.
    pub fn iter(&self) -> impl Iterator<Item = Result<Example>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// 由一条标注记录组装样本. `params` 为 `Some` 时施加该增强.
    pub fn build_example(
        &self,
        record: &AnnotationRecord,
        params: Option<&AugmentParams>,
    ) -> Result<Example> {
        let mut sample = SampleRecord::load(&self.store, record, &self.targets)?;
        if self.phase.limit_depth {
            truncate(&mut sample, self.depth_limit);
        }

        let SampleRecord {
            tomo_name,
            data,
            mut labels,
            slices,
            ..
        } = sample;

        let data = match params {
            Some(p) => {
                for label in labels.values_mut() {
                    *label = augment::apply_volume(p, label.view(), true);
                }
                augment::apply_volume(p, data.view(), false)
            }
            None => data,
        };

        let mut weights = BTreeMap::new();
        if let Some(eligible) = self.phase.eligible_slice_positions {
            for (&target, label) in labels.iter() {
                let w = weight(label.view(), &slices, eligible, self.include_zlimits);
                weights.insert(target, pad(w, self.stride));
            }
        }

        let outputs = labels
            .into_iter()
            .map(|(t, y)| (t, pad(y, self.stride).insert_axis(Axis(0))))
            .collect();
        let input = pad(data, self.stride).insert_axis(Axis(0));

        debug!(
            "{} example {tomo_name}: input {:?}",
            self.phase.phase,
            input.dim()
        );
        Ok(Example {
            input,
            outputs,
            weights,
            tomo_name,
        })
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl TomoDataset {
    /// 借助 `rayon`, 并行地取出 `indices` 对应的样本, 一个索引一个任务.
    ///
    /// 任一样本失败则返回该错误.
    pub fn par_batch(&self, indices: &[usize]) -> Result<Vec<Example>> {
        indices.par_iter().map(|&i| self.get(i)).collect()
    }
}
