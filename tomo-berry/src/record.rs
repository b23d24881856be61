//! 标注清单与单个样本的工作记录.

use crate::consts::SLICES_PER_TOMO;
use crate::error::{Result, TomoError};
use crate::phase::Phase;
use crate::storage::TomoStore;
use crate::{Idx3d, Target};
use ndarray::Array3;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// 交叉验证划分方式. 对应清单中的 `split_loo`, `split_5`, `split_10` 列.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    /// 留一法.
    Loo,

    /// 5 折.
    Fold5,

    /// 10 折.
    Fold10,
}

/// 一个 tomogram 的标注信息. 创建后只读.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    /// 样本 (实验批次) 名.
    pub sample: String,

    /// tomogram 文件名.
    pub tomo_name: String,

    /// z 下限. 该切片以下确定没有目标结构.
    pub z_min: usize,

    /// z 上限 (不含). 该切片及以上确定没有目标结构.
    pub z_max: usize,

    /// 5 个标注切片的深度索引, 位置有意义: 第 2 个为中心切片.
    pub slices: [i64; SLICES_PER_TOMO],

    /// 各划分方式下的折编号, 依次为留一法、5 折、10 折.
    pub splits: [Option<i32>; 3],
}

impl AnnotationRecord {
    /// 指定划分方式下的折编号.
    #[inline]
    pub fn split(&self, kind: SplitKind) -> Option<i32> {
        match kind {
            SplitKind::Loo => self.splits[0],
            SplitKind::Fold5 => self.splits[1],
            SplitKind::Fold10 => self.splits[2],
        }
    }

    /// 涂绘标注图文件名主干 (tomogram 文件名去掉扩展名).
    pub fn stem(&self) -> &str {
        Path::new(&self.tomo_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.tomo_name)
    }
}

/// 清单中的一行. 列名决定切片的位置语义.
#[derive(Debug, Deserialize)]
struct ManifestRow {
    tomo_name: String,
    z_min: usize,
    z_max: usize,
    slice_0: i64,
    slice_1: i64,
    slice_2: i64,
    slice_3: i64,
    slice_4: i64,
    #[serde(default)]
    sample: Option<String>,
    #[serde(default)]
    split_loo: Option<i32>,
    #[serde(default)]
    split_5: Option<i32>,
    #[serde(default)]
    split_10: Option<i32>,
}

impl ManifestRow {
    fn into_record(self, default_sample: &str) -> AnnotationRecord {
        AnnotationRecord {
            sample: self.sample.unwrap_or_else(|| default_sample.to_owned()),
            tomo_name: self.tomo_name,
            z_min: self.z_min,
            z_max: self.z_max,
            slices: [
                self.slice_0,
                self.slice_1,
                self.slice_2,
                self.slice_3,
                self.slice_4,
            ],
            splits: [self.split_loo, self.split_5, self.split_10],
        }
    }
}

/// 标注清单: 每行对应一个 tomogram.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    records: Vec<AnnotationRecord>,
}

impl Manifest {
    /// 打开 CSV 清单. 缺少 `sample` 列的行归入 `default_sample`.
    ///
    /// 文件不存在时返回 [`TomoError::MissingData`].
    pub fn open<P: AsRef<Path>>(path: P, default_sample: &str) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TomoError::MissingData(format!(
                "manifest {} not found",
                path.display()
            )));
        }
        Self::from_reader(std::fs::File::open(path)?, default_sample)
    }

    /// 从任意 CSV 数据源读取清单.
    pub fn from_reader<R: std::io::Read>(rdr: R, default_sample: &str) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(rdr);
        let records = rdr
            .deserialize::<ManifestRow>()
            .map(|row| row.map(|r| r.into_record(default_sample)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { records })
    }

    /// 全部记录.
    #[inline]
    pub fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    /// 记录条数.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 清单是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 按阶段挑选某个样本的记录.
    ///
    /// 训练/验证阶段取折编号不等于 `fold` 的记录, 测试阶段取等于 `fold` 的记录,
    /// 预测阶段取全部记录. 没有该划分列的记录在训练/验证阶段保留, 在测试阶段排除.
    pub fn select(
        &self,
        phase: Phase,
        sample: &str,
        kind: SplitKind,
        fold: i32,
    ) -> Vec<AnnotationRecord> {
        if phase == Phase::Predict {
            return self.records.clone();
        }
        self.records
            .iter()
            .filter(|r| r.sample == sample)
            .filter(|r| match phase {
                Phase::Test => r.split(kind) == Some(fold),
                _ => r.split(kind) != Some(fold),
            })
            .cloned()
            .collect()
    }
}

/// 组装单个样本时的可变工作记录.
///
/// 每次取样新建, 在加载与截断时就地修改, 产出样本后丢弃.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    /// tomogram 文件名.
    pub tomo_name: String,

    /// 当前形状 (深度, 高, 宽).
    pub shape: Idx3d,

    /// 原始 tomogram.
    pub data: Array3<f32>,

    /// 每个目标一个标签体, 与 `data` 同形状.
    pub labels: BTreeMap<Target, Array3<f32>>,

    /// 5 个标注切片的深度索引. 截断后相对于新窗口, 可能越界.
    pub slices: [i64; SLICES_PER_TOMO],
}

impl SampleRecord {
    /// 从存储中加载 `record` 对应的 tomogram 及 `targets` 的标签体.
    ///
    /// 任一数组缺失都是致命错误.
    pub fn load(store: &TomoStore, record: &AnnotationRecord, targets: &[Target]) -> Result<Self> {
        let mut archive = store.open(&record.sample, &record.tomo_name)?;
        let data = archive.data()?;
        let shape = data.dim();

        let mut labels = BTreeMap::new();
        for &target in targets {
            let label = archive.label(target)?;
            if label.dim() != shape {
                return Err(TomoError::ShapeMismatch {
                    found: label.shape().to_vec(),
                    expected: data.shape().to_vec(),
                });
            }
            labels.insert(target, label.mapv(f32::from));
        }

        Ok(Self {
            tomo_name: record.tomo_name.clone(),
            shape,
            data,
            labels,
            slices: record.slices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
tomo_name,z_min,z_max,slice_0,slice_1,slice_2,slice_3,slice_4,split_loo,split_5,split_10,sample
a.hdf,10,90,20,35,50,65,80,0,0,0,Q18
b.hdf,5,60,10,20,30,40,50,1,1,1,Q18
c.hdf,0,40,5,10,15,20,25,2,0,2,WT
";

    #[test]
    fn test_manifest_parse() {
        let m = Manifest::from_reader(CSV.as_bytes(), "unused").unwrap();
        assert_eq!(m.len(), 3);
        let a = &m.records()[0];
        assert_eq!(a.sample, "Q18");
        assert_eq!(a.stem(), "a");
        assert_eq!((a.z_min, a.z_max), (10, 90));
        assert_eq!(a.slices, [20, 35, 50, 65, 80]);
        assert_eq!(a.split(SplitKind::Fold5), Some(0));
    }

    #[test]
    fn test_manifest_default_sample() {
        let csv = "tomo_name,z_min,z_max,slice_0,slice_1,slice_2,slice_3,slice_4\n\
                   x.hdf,0,10,1,2,3,4,5\n";
        let m = Manifest::from_reader(csv.as_bytes(), "Q66").unwrap();
        assert_eq!(m.records()[0].sample, "Q66");
        assert_eq!(m.records()[0].splits, [None, None, None]);
    }

    #[test]
    fn test_manifest_select() {
        let m = Manifest::from_reader(CSV.as_bytes(), "unused").unwrap();
        let names = |v: Vec<AnnotationRecord>| -> Vec<String> {
            v.into_iter().map(|r| r.tomo_name).collect()
        };
        assert_eq!(
            names(m.select(Phase::Train, "Q18", SplitKind::Loo, 1)),
            ["a.hdf"]
        );
        assert_eq!(
            names(m.select(Phase::Test, "Q18", SplitKind::Loo, 1)),
            ["b.hdf"]
        );
        assert_eq!(m.select(Phase::Predict, "Q18", SplitKind::Loo, 1).len(), 3);
    }

    #[test]
    fn test_manifest_missing_file() {
        assert!(matches!(
            Manifest::open("/definitely/not/here.csv", "Q18"),
            Err(TomoError::MissingData(_))
        ));
    }
}
