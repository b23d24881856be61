//! 后端存储: 以 npz 归档保存的具名数组容器, 以及 PNG 格式的涂绘标注图.
//!
//! 一个 tomogram 容器位于 `{root}/{sample}/{tomo_name}`, 至少包含名为
//! `data` 的数组; 训练用的容器还包含以目标命名的标签体 (如 `mito`, `granule`).

use crate::consts::DATA_KEY;
use crate::error::{Result, TomoError};
use crate::Target;
use log::info;
use ndarray::{Array, Array2, ArrayBase, Data, Dimension, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement, WritableElement};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// 按 (样本, 名称) 定位 tomogram 容器.
#[derive(Debug, Clone)]
pub struct TomoStore {
    root: PathBuf,
}

impl TomoStore {
    /// 以 `root` 为根目录初始化. 不检查目录是否存在.
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    /// 根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 容器的完整路径.
    pub fn path_of(&self, sample: &str, tomo_name: &str) -> PathBuf {
        let mut ans = self.root.clone();
        ans.push(sample);
        ans.push(tomo_name);
        ans
    }

    /// 打开容器. 文件不存在时返回 [`TomoError::MissingData`].
    #[inline]
    pub fn open(&self, sample: &str, tomo_name: &str) -> Result<TomoArchive> {
        TomoArchive::open(self.path_of(sample, tomo_name))
    }

    /// 在 `{root}/{sample}` 下创建 (或覆盖) 容器, 必要时创建样本目录.
    pub fn create(&self, sample: &str, tomo_name: &str) -> Result<TomoWriter> {
        let path = self.path_of(sample, tomo_name);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        TomoWriter::create(path)
    }
}

/// 已打开的只读容器.
pub struct TomoArchive {
    path: PathBuf,
    reader: NpzReader<File>,
    names: Vec<String>,
}

/// 归档内的数组名可能带有 `.npy` 后缀.
#[inline]
fn bare_name(name: &str) -> &str {
    name.strip_suffix(".npy").unwrap_or(name)
}

impl TomoArchive {
    /// 打开 `path` 处的 npz 归档.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        if !path.is_file() {
            return Err(TomoError::MissingData(format!(
                "tomogram {} not found",
                path.display()
            )));
        }
        let file = OpenOptions::new().read(true).open(&path)?;
        let mut reader = NpzReader::new(file)?;
        let names = reader.names()?;
        Ok(Self {
            path,
            reader,
            names,
        })
    }

    /// 归档路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 归档中所有数组名 (不含 `.npy` 后缀).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| bare_name(n))
    }

    /// 是否包含名为 `key` 的数组?
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.keys().any(|k| k == key)
    }

    /// 按名读取数组. 名称不存在时返回 [`TomoError::MissingData`].
    pub fn read<A, D>(&mut self, key: &str) -> Result<Array<A, D>>
    where
        A: ReadableElement,
        D: Dimension,
    {
        let Some(name) = self.names.iter().find(|n| bare_name(n) == key) else {
            return Err(TomoError::MissingData(format!(
                "array `{key}` not found in {}",
                self.path.display()
            )));
        };
        Ok(self.reader.by_name::<OwnedRepr<A>, D>(name)?)
    }

    /// 读取原始 tomogram.
    #[inline]
    pub fn data(&mut self) -> Result<ndarray::Array3<f32>> {
        self.read(DATA_KEY)
    }

    /// 读取目标 `target` 的标签体.
    #[inline]
    pub fn label(&mut self, target: Target) -> Result<ndarray::Array3<i8>> {
        self.read(target.key())
    }
}

/// 写入中的容器. 必须调用 [`TomoWriter::finish`] 才会落盘完整.
pub struct TomoWriter {
    path: PathBuf,
    writer: NpzWriter<File>,
}

impl TomoWriter {
    /// 创建 (或覆盖) `path` 处的压缩 npz 归档.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: NpzWriter::new_compressed(file),
        })
    }

    /// 追加一个名为 `key` 的数组.
    pub fn add<S, D>(&mut self, key: &str, array: &ArrayBase<S, D>) -> Result<()>
    where
        S: Data,
        S::Elem: WritableElement,
        D: Dimension,
    {
        self.writer.add_array(key, array)?;
        Ok(())
    }

    /// 完成写入.
    pub fn finish(self) -> Result<PathBuf> {
        self.writer.finish()?;
        info!("saved {}", self.path.display());
        Ok(self.path)
    }
}

/// 按 (样本, 文件名主干, 切片索引) 定位涂绘标注图.
#[derive(Debug, Clone)]
pub struct PaintedMasks {
    root: PathBuf,
}

impl PaintedMasks {
    /// 以 `root` 为根目录初始化.
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    /// 根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{sample}/{stem}_{slice}.png`.
    pub fn path_of(&self, sample: &str, stem: &str, slice: i64) -> PathBuf {
        let mut ans = self.root.clone();
        ans.push(sample);
        ans.push(format!("{stem}_{slice}.png"));
        ans
    }

    /// 读取一张标注图, 见 [`read_painted_mask`].
    #[inline]
    pub fn read(&self, sample: &str, stem: &str, slice: i64) -> Result<Array2<u8>> {
        read_painted_mask(self.path_of(sample, stem, slice))
    }
}

/// 读取 8-bit 灰度标注图为 (高, 宽) 数组. 非灰度图会先被转换为灰度.
pub fn read_painted_mask<P: AsRef<Path>>(path: P) -> Result<Array2<u8>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(TomoError::MissingData(format!(
            "painted mask {} not found",
            path.display()
        )));
    }
    let img = image::open(path)?.into_luma8();
    let (w, h) = img.dimensions();

    // 该操作不会生成 `Err`: 缓冲区长度恰为 h * w.
    Array2::from_shape_vec((h as usize, w as usize), img.into_raw()).map_err(|e| {
        TomoError::MissingData(format!("malformed mask {}: {e}", path.display()))
    })
}
