use crate::error::{Result, TomoError};
use std::fmt;
use std::str::FromStr;

/// 分割目标. 集合是封闭的, 新目标必须在这里登记.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Target {
    /// 线粒体 (结构 A).
    Mito,

    /// 线粒体内颗粒 (结构 B).
    Granule,
}

impl Target {
    /// 所有已登记的目标.
    pub const ALL: [Target; 2] = [Target::Mito, Target::Granule];

    /// 存储容器中对应的数组名.
    #[inline]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Mito => "mito",
            Self::Granule => "granule",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Target {
    type Err = TomoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.key() == s)
            .ok_or_else(|| TomoError::InvalidConfig(format!("unknown target `{s}`")))
    }
}
