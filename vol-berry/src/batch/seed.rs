//! 种子掩膜合成.

use ndarray::{ArrayView4, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::consts::is_foreground;
use crate::data::{spatial_shape, Volume};
use crate::error::{PipelineError, Result};

/// 沿第一个空间轴, 至少包含一个前景体素的切片索引 (升序).
pub fn nonempty_slices(label: ArrayView4<'_, f32>) -> Vec<usize> {
    label
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, s)| s.iter().any(|&v| is_foreground(v)))
        .map(|(i, _)| i)
        .collect()
}

/// 从标签合成单切片种子.
///
/// 在所有非空切片中均匀地选取一个切片 `r`, 返回与 `label` 同形状、除切片 `r`
/// 外全为背景的体数据, 切片 `r` 的内容从标签原样复制.
///
/// # 注意
///
/// 标签中没有任何前景体素时返回 [`PipelineError::EmptyLabel`].
pub fn slice_seed<R: Rng + ?Sized>(label: ArrayView4<'_, f32>, rng: &mut R) -> Result<Volume> {
    let candidates = nonempty_slices(label);
    let &r = candidates
        .choose(rng)
        .ok_or_else(|| PipelineError::EmptyLabel(spatial_shape(&label)))?;

    let mut seed = Volume::zeros(label.raw_dim());
    seed.index_axis_mut(Axis(0), r)
        .assign(&label.index_axis(Axis(0), r));
    Ok(seed)
}

/// 以整个标签作为种子.
#[inline]
pub fn volume_seed(label: ArrayView4<'_, f32>) -> Volume {
    label.to_owned()
}
