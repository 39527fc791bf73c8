//! 确定性预处理: 裁剪到目标形状、还原到原始形状以及强度归一化.

use std::path::Path;

use ndarray::{s, ArrayView4};

use crate::config::{PipelineConfig, TargetShape};
use crate::data::{spatial_shape, Volume, VolumeReader};
use crate::error::{PipelineError, Result};
use crate::Shape3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 预处理步骤.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Step {
    /// 除以 `max_value` 做强度归一化.
    Rescale,

    /// 对称裁剪到目标形状.
    Crop,
}

impl Step {
    /// 强度图像的默认步骤: 先归一化, 再裁剪.
    pub const INTENSITY: &'static [Step] = &[Step::Rescale, Step::Crop];

    /// 标签、种子等掩膜的步骤: 只裁剪.
    pub const MASK: &'static [Step] = &[Step::Crop];
}

/// 每个轴两侧各需裁掉 (或填充) 的体素个数.
#[inline]
fn margins((x, y, z): Shape3, target: &TargetShape) -> [usize; 3] {
    let (tx, ty, tz) = target.dim();
    [x.abs_diff(tx) / 2, y.abs_diff(ty) / 2, z.abs_diff(tz) / 2]
}

/// 预处理器. 除配置外不持有任何状态.
#[derive(Copy, Clone, Debug)]
pub struct Preprocessor {
    config: PipelineConfig,
}

impl Preprocessor {
    /// 从运行配置构造.
    #[inline]
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// 运行配置.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 目标形状.
    #[inline]
    pub fn target_shape(&self) -> TargetShape {
        self.config.target_shape
    }

    /// 对称裁剪到目标形状.
    ///
    /// 每个空间轴两侧各裁掉 `|dim - target| / 2` (向下取整) 个体素.
    /// 输入任一空间维度小于目标形状, 或裁剪后 (因奇数差值) 与目标形状不一致时,
    /// 返回形状错误.
    pub fn crop(&self, volume: ArrayView4<'_, f32>) -> Result<Volume> {
        let target = self.target_shape();
        let shape = spatial_shape(&volume);
        if !target.fits_in(shape) {
            return Err(PipelineError::shape(format!(
                "the input shape {shape:?} is smaller than the target shape {:?}",
                target.dim()
            )));
        }

        let [dx, dy, dz] = margins(shape, &target);
        let (x, y, z) = shape;
        let cropped = volume.slice(s![dx..x - dx, dy..y - dy, dz..z - dz, ..]);

        if spatial_shape(&cropped) != target.dim() {
            return Err(PipelineError::shape(format!(
                "the cropped shape {:?} does not match the target shape {:?}",
                spatial_shape(&cropped),
                target.dim()
            )));
        }
        Ok(cropped.to_owned())
    }

    /// 强度归一化, 每个元素除以 `max_value`. 不改变形状.
    ///
    /// 该操作不是幂等的: 连续调用两次等价于除以 `max_value` 的平方.
    pub fn rescale(&self, volume: ArrayView4<'_, f32>) -> Volume {
        let m = self.config.max_value;
        volume.mapv(|v| v / m)
    }

    /// [`Self::crop`] 的逆操作: 两侧补零, 还原到 `original` 空间形状.
    ///
    /// `volume` 的空间形状必须恰好等于目标形状, `original` 在每个轴上都不能小于
    /// 目标形状, 否则返回形状错误. 差值为奇数的轴无法还原, 同样返回形状错误.
    pub fn uncrop(&self, volume: ArrayView4<'_, f32>, original: Shape3) -> Result<Volume> {
        let target = self.target_shape();
        if spatial_shape(&volume) != target.dim() {
            return Err(PipelineError::shape(format!(
                "the input shape {:?} is not the target shape {:?}",
                volume.dim(),
                target.dim()
            )));
        }
        if !target.fits_in(original) {
            return Err(PipelineError::shape(format!(
                "the original shape {original:?} is smaller than the target shape {:?}",
                target.dim()
            )));
        }

        let [dx, dy, dz] = margins(original, &target);
        let (tx, ty, tz) = target.dim();
        let restored_shape = (tx + 2 * dx, ty + 2 * dy, tz + 2 * dz);
        if restored_shape != original {
            return Err(PipelineError::shape(format!(
                "the restored shape {restored_shape:?} does not match the original shape {original:?}"
            )));
        }

        let c = volume.len_of(ndarray::Axis(3));
        let mut padded = Volume::zeros((restored_shape.0, restored_shape.1, restored_shape.2, c));
        padded
            .slice_mut(s![dx..dx + tx, dy..dy + ty, dz..dz + tz, ..])
            .assign(&volume);
        Ok(padded)
    }

    /// 对已加载的体数据按顺序执行 `steps`.
    pub fn apply_steps(&self, mut volume: Volume, steps: &[Step]) -> Result<Volume> {
        for step in steps {
            volume = match step {
                Step::Rescale => self.rescale(volume.view()),
                Step::Crop => self.crop(volume.view())?,
            };
        }
        Ok(volume)
    }

    /// 通过 `reader` 加载 `path` 处的体数据, 再按顺序执行 `steps`.
    pub fn preprocess<R: VolumeReader + ?Sized>(
        &self,
        reader: &R,
        path: &Path,
        steps: &[Step],
    ) -> Result<Volume> {
        let volume = reader.read(path)?;
        self.apply_steps(volume, steps)
    }
}
