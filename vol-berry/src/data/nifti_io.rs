use std::path::Path;

use ndarray::ArrayView4;
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use super::{into_volume, Volume, VolumeReader, VolumeWriter};
use crate::error::Result;
use crate::Shape3;

/// 从 header 中获取 `(X, Y, Z)` 体素个数.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Shape3 {
    // [ndim, X, Y, Z, C, ..]
    let [_, x, y, z, ..] = h.dim;
    (x as usize, y as usize, z as usize)
}

/// nii / nii.gz 格式的体数据读写器.
///
/// nifti 数据的索引顺序天然就是 `(X, Y, Z[, C])`, 因此读取时不做轴变换,
/// 只把列优先的数据整理为标准布局.
#[derive(Copy, Clone, Debug, Default)]
pub struct NiftiIo;

impl NiftiIo {
    /// 仅读取 `path` 处文件的 header.
    pub fn header(&self, path: &Path) -> Result<NiftiHeader> {
        Ok(NiftiHeader::from_file(path)?)
    }
}

impl VolumeReader for NiftiIo {
    fn read(&self, path: &Path) -> Result<Volume> {
        let obj = ReaderOptions::new().read_file(path)?;
        let data = obj.into_volume().into_ndarray::<f32>()?;
        into_volume(data)
    }

    /// 只解析 header, 不加载体素数据.
    fn shape(&self, path: &Path) -> Result<Shape3> {
        Ok(get_shape_from_header(&self.header(path)?))
    }
}

impl VolumeWriter for NiftiIo {
    type Header = NiftiHeader;

    fn save(
        &self,
        volume: ArrayView4<'_, f32>,
        path: &Path,
        header: Option<&NiftiHeader>,
    ) -> Result<()> {
        let options = WriterOptions::new(path);
        let options = match header {
            Some(h) => options.reference_header(h),
            None => options,
        };
        // 单通道体数据按三维写出, 与常见分割标注文件保持一致.
        if volume.len_of(ndarray::Axis(3)) == 1 {
            options.write_nifti(&volume.index_axis(ndarray::Axis(3), 0))?;
        } else {
            options.write_nifti(&volume)?;
        }
        Ok(())
    }
}
