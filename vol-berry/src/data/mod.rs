//! 体数据的基础类型与外部读写接口.
//!
//! 所有体数据均按 `(X, Y, Z, C)` 组织, 批次按 `(N, X, Y, Z, C)` 组织.

use std::path::Path;

use ndarray::{
    concatenate, stack, Array4, Array5, ArrayBase, ArrayD, ArrayView4, Axis, Data, Ix3, Ix4,
};

use crate::error::{PipelineError, Result};
use crate::Shape3;

mod nifti_io;
mod npy_io;

pub use nifti_io::NiftiIo;
pub use npy_io::NpyReader;

/// 单个体数据, 轴顺序为 `(X, Y, Z, C)`.
pub type Volume = Array4<f32>;

/// 批次数组, 轴顺序为 `(N, X, Y, Z, C)`.
pub type BatchArray = Array5<f32>;

/// 体数据读取器.
///
/// 实现者必须按固定的 `(X, Y, Z)` 轴约定返回数组,
/// 以便 [`crate::inference::restore`] 之后写回时几何关系保持一致.
pub trait VolumeReader {
    /// 读取 `path` 处的原始体数据. 三维数据会附加一个长度为 1 的通道轴.
    fn read(&self, path: &Path) -> Result<Volume>;

    /// 获取 `path` 处体数据的空间形状 `(X, Y, Z)`.
    ///
    /// 默认实现会读取整个文件; 能够只读文件头的格式应当覆盖该方法.
    fn shape(&self, path: &Path) -> Result<Shape3> {
        Ok(spatial_shape(&self.read(path)?))
    }
}

/// 体数据写入器. 只在推理路径中使用.
pub trait VolumeWriter {
    /// 参考头信息的类型.
    type Header;

    /// 将 `volume` 写到 `path`. 若给出 `header`, 则以它为参考头.
    fn save(
        &self,
        volume: ArrayView4<'_, f32>,
        path: &Path,
        header: Option<&Self::Header>,
    ) -> Result<()>;
}

impl<R: VolumeReader + ?Sized> VolumeReader for &R {
    #[inline]
    fn read(&self, path: &Path) -> Result<Volume> {
        (**self).read(path)
    }

    #[inline]
    fn shape(&self, path: &Path) -> Result<Shape3> {
        (**self).shape(path)
    }
}

/// 获取四维体数据的空间形状.
#[inline]
pub fn spatial_shape<S: Data<Elem = f32>>(volume: &ArrayBase<S, Ix4>) -> Shape3 {
    let (x, y, z, _) = volume.dim();
    (x, y, z)
}

/// 获取四维体数据的通道数.
#[inline]
pub fn channels<S: Data<Elem = f32>>(volume: &ArrayBase<S, Ix4>) -> usize {
    volume.len_of(Axis(3))
}

/// 将任意维度的原始数组整理为 `(X, Y, Z, C)` 体数据.
///
/// 三维数组附加通道轴, 四维数组原样返回, 其他维度返回形状错误.
pub fn into_volume(raw: ArrayD<f32>) -> Result<Volume> {
    let volume = match raw.ndim() {
        3 => raw.into_dimensionality::<Ix3>()?.insert_axis(Axis(3)),
        4 => raw.into_dimensionality::<Ix4>()?,
        n => {
            return Err(PipelineError::shape(format!(
                "expected a 3D or 4D volume, got {n} dimensions"
            )))
        }
    };
    // nifti 数据按列优先排布, 统一转换为标准布局.
    Ok(if volume.is_standard_layout() {
        volume
    } else {
        volume.as_standard_layout().into_owned()
    })
}

/// 沿通道轴拼接两个空间形状一致的体数据.
pub fn concat_channels<'a>(a: ArrayView4<'a, f32>, b: ArrayView4<'a, f32>) -> Result<Volume> {
    if spatial_shape(&a) != spatial_shape(&b) {
        return Err(PipelineError::shape(format!(
            "cannot concatenate channels of {:?} and {:?}",
            a.dim(),
            b.dim()
        )));
    }
    Ok(concatenate(Axis(3), &[a, b])?)
}

/// 将若干形状一致的体数据堆叠为批次.
pub fn stack_volumes(volumes: &[Volume]) -> Result<BatchArray> {
    let Some(first) = volumes.first() else {
        return Err(PipelineError::shape("cannot stack an empty batch"));
    };
    if let Some(v) = volumes.iter().find(|v| v.dim() != first.dim()) {
        return Err(PipelineError::shape(format!(
            "inconsistent volume shapes in batch: {:?} vs {:?}",
            first.dim(),
            v.dim()
        )));
    }
    let views: Vec<_> = volumes.iter().map(|v| v.view()).collect();
    Ok(stack(Axis(0), &views)?)
}
