#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 为 3D 医学体数据分割模型的训练与推理提供预处理、几何增强和批处理流水线.
//!
//! 所有体数据按 `(X, Y, Z, C)` 组织, 批次按 `(N, X, Y, Z, C)` 组织.
//! 目标形状与强度归一化常量通过 [`PipelineConfig`] 显式传入, 而非全局常量.
//!
//! # 注意
//!
//! 1. 流水线是单线程同步的: 每个批次在交给调用者之前已完整算好.
//!   迭代器/生成器实例各自持有顺序与随机源, 不应跨线程共享.
//! 2. 所有错误都以 [`PipelineError`] 返回给调用者, 不会静默跳过样本.
//! 3. 输入批次的通道顺序固定为 `[强度, 每样本辅助.., 共享拼接.., 种子]`.
//!
//! # 开发计划
//!
//! ### 裁剪 / 还原 / 强度归一化 ✅
//!
//! 实现位于 `vol-berry/src/preprocess.rs`.
//!
//! ### 随机仿射增强 (旋转、剪切、平移、缩放、翻转) ✅
//!
//! 输入使用三线性插值, 标签与种子使用最近邻插值, 同一样本共用一组参数.
//!
//! 实现位于 `vol-berry/src/transform`.
//!
//! ### 增强迭代器 & 确定性生成器 ✅
//!
//! 1. 训练时整体载入、每轮打乱, 支持固定步数. ✅
//! 2. 验证/推理时按批次惰性加载, 或一次性缓存. ✅
//! 3. 种子来源: 文件 / 标签切片 / 整个标签. ✅
//!
//! 实现位于 `vol-berry/src/iterator.rs`, `vol-berry/src/generator.rs`
//! 和 `vol-berry/src/batch`.
//!
//! ### 类别权重 ✅
//!
//! 实现位于 `vol-berry/src/weights.rs`.
//!
//! ### 推理结果还原并写回 nifti ✅
//!
//! 实现位于 `vol-berry/src/inference.rs`.

/// 三维空间形状 `(X, Y, Z)`.
pub type Shape3 = (usize, usize, usize);

pub mod batch;
pub mod config;
pub mod consts;

/// 体数据类型与读写接口.
pub mod data;

pub mod dataset;
pub mod error;
pub mod generator;
pub mod inference;
pub mod iterator;
pub mod preprocess;
pub mod transform;
pub mod weights;

pub mod prelude;

pub use batch::{Batch, BatchAssembler, SeedMode, SharedVolume};
pub use config::{AugmentConfig, Axis3, FillMode, PipelineConfig, RotationAxis, TargetShape};
pub use data::{BatchArray, NiftiIo, NpyReader, Volume, VolumeReader, VolumeWriter};
pub use dataset::Dataset;
pub use error::{PipelineError, Result};
pub use generator::{GeneratorConfig, VolumeGenerator};
pub use iterator::{Augmentation, IteratorConfig, VolumeIterator};
pub use preprocess::{Preprocessor, Step};
pub use transform::{GeometricTransformer, Interpolation, SamplePair, TransformParameters};
pub use weights::{compute_weights, ClassWeights};
