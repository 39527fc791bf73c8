//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Shape3;

pub use crate::batch::{Batch, SeedMode, SharedVolume};
pub use crate::config::{AugmentConfig, Axis3, FillMode, PipelineConfig, RotationAxis, TargetShape};
pub use crate::data::{BatchArray, NiftiIo, NpyReader, Volume, VolumeReader, VolumeWriter};
pub use crate::error::{PipelineError, Result};
pub use crate::preprocess::{Preprocessor, Step};
pub use crate::transform::GeometricTransformer;

pub use crate::dataset::{self, home_dataset_dir_with, Dataset};
pub use crate::generator::{GeneratorConfig, VolumeGenerator};
pub use crate::iterator::{Augmentation, IteratorConfig, VolumeIterator};

pub use crate::inference::{restore, save_prediction};
pub use crate::weights::{compute_weights, ClassWeights};
