//! 运行时错误.

use crate::Shape3;
use thiserror::Error;

/// 流水线统一的结果类型.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// 数据流水线的运行时错误.
///
/// 所有错误都会直接返回给调用者, 不做静默恢复. 批次组装过程中任一样本出错,
/// 整个批次的组装即告失败 (而不是跳过该样本), 以免批次大小与消费者的预期不一致.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 体数据空间形状与目标形状不兼容 (裁剪、还原或批次堆叠时).
    #[error("shape error: {0}")]
    Shape(String),

    /// 互斥选项同时出现, 或缺少必要的配套输入.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 批次索引越界. 第一个分量为请求的索引, 第二个分量为批次总数.
    #[error("batch index {index} out of range for {len} batches")]
    Index {
        /// 请求的批次索引.
        index: usize,
        /// 批次总数.
        len: usize,
    },

    /// 标签中不存在任何前景体素, 无法从中合成种子切片.
    #[error("label of shape {0:?} has no foreground voxel to draw a seed slice from")]
    EmptyLabel(Shape3),

    /// nifti 文件读写错误.
    #[error("nifti error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// npy 文件读取错误.
    #[error("npy error: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),

    /// 底层数组形状错误.
    #[error("array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// 其他底层 I/O 错误.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// 构造形状错误.
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    /// 构造配置错误.
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 是否为形状错误.
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape(_))
    }

    /// 是否为配置错误.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
