//! 推理结果的还原与写出.

use std::path::{Path, PathBuf};

use log::info;
use ndarray::{ArrayView4, ArrayView5, Axis};

use crate::data::{Volume, VolumeReader, VolumeWriter};
use crate::error::{PipelineError, Result};
use crate::preprocess::Preprocessor;

/// 将目标形状的网络输出补零还原到 `source` 文件的原始空间形状.
///
/// 原始形状通过 [`VolumeReader::shape`] 获取, 不加载源文件的体素数据
/// (取决于读取器的实现).
pub fn restore<R: VolumeReader + ?Sized>(
    preprocessor: &Preprocessor,
    reader: &R,
    prediction: ArrayView4<'_, f32>,
    source: &Path,
) -> Result<Volume> {
    let original = reader.shape(source)?;
    preprocessor.uncrop(prediction, original)
}

/// 逐样本还原一个批次的网络输出. `sources` 与批次样本一一对应,
/// 通常来自 [`VolumeGenerator::batch_files`](crate::generator::VolumeGenerator::batch_files).
pub fn restore_batch<R: VolumeReader + ?Sized>(
    preprocessor: &Preprocessor,
    reader: &R,
    predictions: ArrayView5<'_, f32>,
    sources: &[PathBuf],
) -> Result<Vec<Volume>> {
    if predictions.len_of(Axis(0)) != sources.len() {
        return Err(PipelineError::config(format!(
            "{} predictions for {} source files",
            predictions.len_of(Axis(0)),
            sources.len()
        )));
    }
    predictions
        .outer_iter()
        .zip(sources)
        .map(|(p, s)| restore(preprocessor, reader, p, s))
        .collect()
}

/// 将还原后的预测写到 `path`. 给出 `header` 时以它为参考头.
pub fn save_prediction<W: VolumeWriter + ?Sized>(
    writer: &W,
    volume: ArrayView4<'_, f32>,
    path: &Path,
    header: Option<&W::Header>,
) -> Result<()> {
    writer.save(volume, path, header)?;
    info!("saved prediction {:?} to {}", volume.dim(), path.display());
    Ok(())
}
