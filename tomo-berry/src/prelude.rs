//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d, Result, Target, TomoError};

pub use crate::augment::AugmentParams;
pub use crate::config::{DatasetConfig, ValidConfig};
pub use crate::consts::label::{ABSENT, PRESENT, UNKNOWN};
pub use crate::consts::{DEPTH_LIMIT, INFERENCE_BLOCK, NET_STRIDE};
pub use crate::dataset::{Example, TomoDataset};
pub use crate::fusion::{insert_labels, LabelPair};
pub use crate::geometry::{pad, truncate};
pub use crate::inference::{postprocess, preprocess, InferenceConfig, Prepared};
pub use crate::phase::{Flavour, Phase, PhaseConfig};
pub use crate::record::{AnnotationRecord, Manifest, SampleRecord, SplitKind};
pub use crate::storage::{PaintedMasks, TomoArchive, TomoStore, TomoWriter};
pub use crate::weight::{weight, SlicePositions};
