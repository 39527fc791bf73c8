//! 随机几何增强.
//!
//! [`GeometricTransformer`] 只持有参数范围, 本身无状态. 随机源由调用者传入,
//! 因此固定种子即可复现采样结果.
//!
//! 同一样本的输入、标签与种子必须使用同一组 [`TransformParameters`],
//! [`GeometricTransformer::apply_sample`] 以成对的方式一次性完成变换,
//! 调用者无需自行在多次调用间传递参数.

use ndarray::ArrayView4;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{AugmentConfig, Axis3, FillMode, RotationAxis};
use crate::consts::BACKGROUND;
use crate::data::Volume;
use crate::error::Result;

mod affine;

use affine::Fill;

/// 重采样插值方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Interpolation {
    /// 三线性插值, 用于强度通道.
    Linear,

    /// 最近邻插值, 用于标签与种子等离散掩膜.
    Nearest,
}

/// 一次随机采样得到的变换参数.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransformParameters {
    /// 旋转 (与剪切) 所绕的轴.
    pub rotation_axis: Axis3,

    /// 旋转角 (度).
    pub rotation: f32,

    /// 每个轴的平移量, 单位为轴长比例.
    pub shift: [f32; 3],

    /// 剪切角 (度), 作用于旋转平面.
    pub shear: f32,

    /// 每个轴的缩放因子.
    pub zoom: [f32; 3],

    /// 每个轴是否翻转.
    pub flip: [bool; 3],
}

impl TransformParameters {
    /// 恒等变换参数.
    pub const fn identity() -> Self {
        Self {
            rotation_axis: Axis3::Z,
            rotation: 0.0,
            shift: [0.0; 3],
            shear: 0.0,
            zoom: [1.0; 3],
            flip: [false; 3],
        }
    }

    /// 是否为恒等变换.
    pub fn is_identity(&self) -> bool {
        self.rotation == 0.0
            && self.shear == 0.0
            && self.shift.iter().all(|&s| s == 0.0)
            && self.zoom.iter().all(|&z| z == 1.0)
            && self.flip.iter().all(|&f| !f)
    }
}

impl Default for TransformParameters {
    fn default() -> Self {
        Self::identity()
    }
}

/// 同一样本中需要保持几何一致的一组体数据.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplePair {
    /// 输入 (强度通道及每样本辅助通道).
    pub input: Volume,

    /// 分割标签.
    pub label: Option<Volume>,

    /// 来自文件的种子掩膜.
    pub seed: Option<Volume>,
}

impl SamplePair {
    /// 只有输入的样本.
    #[inline]
    pub fn new(input: Volume) -> Self {
        Self {
            input,
            label: None,
            seed: None,
        }
    }

    /// 附加标签.
    #[inline]
    pub fn with_label(mut self, label: Option<Volume>) -> Self {
        self.label = label;
        self
    }

    /// 附加种子.
    #[inline]
    pub fn with_seed(mut self, seed: Option<Volume>) -> Self {
        self.seed = seed;
        self
    }
}

/// 在 `[-range, range]` 内均匀采样. `range == 0` 时直接返回 0.
#[inline]
fn symmetric<R: Rng + ?Sized>(rng: &mut R, range: f32) -> f32 {
    if range == 0.0 {
        0.0
    } else {
        rng.gen_range(-range..=range)
    }
}

/// 随机几何变换器.
#[derive(Copy, Clone, Debug)]
pub struct GeometricTransformer {
    config: AugmentConfig,
}

impl GeometricTransformer {
    /// 构造变换器. 参数范围非法时返回配置错误.
    pub fn new(config: AugmentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 恒等变换器: 所有范围为 0, 不翻转.
    pub fn identity() -> Self {
        Self {
            config: AugmentConfig::identity(),
        }
    }

    /// 参数范围.
    #[inline]
    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    /// 按配置范围随机采样一组变换参数.
    pub fn sample_parameters<R: Rng + ?Sized>(&self, rng: &mut R) -> TransformParameters {
        let c = &self.config;
        let rotation_axis = match c.rotation_axis {
            RotationAxis::Fixed(axis) => axis,
            RotationAxis::Random => *Axis3::ALL.choose(rng).unwrap_or(&Axis3::Z),
        };
        let rotation = symmetric(rng, c.rotation_range);
        let shift = std::array::from_fn(|_| symmetric(rng, c.shift_range));
        let shear = symmetric(rng, c.shear_range);
        let zoom = std::array::from_fn(|_| 1.0 + symmetric(rng, c.zoom_range));
        let flip = if c.flip {
            let p = f64::from(c.flip_probability);
            std::array::from_fn(|_| rng.gen_bool(p))
        } else {
            [false; 3]
        };

        TransformParameters {
            rotation_axis,
            rotation,
            shift,
            shear,
            zoom,
            flip,
        }
    }

    /// 以给定的插值方式、填充方式和填充常量对体数据施加 `params`.
    ///
    /// 所有通道使用同一映射.
    pub fn apply_with(
        volume: ArrayView4<'_, f32>,
        params: &TransformParameters,
        interpolation: Interpolation,
        fill_mode: FillMode,
        fill_constant: f32,
    ) -> Volume {
        affine::resample(volume, params, interpolation, Fill::new(fill_mode, fill_constant))
    }

    /// 按配置中的填充方式对强度体数据施加 `params` (三线性插值).
    pub fn apply(&self, volume: ArrayView4<'_, f32>, params: &TransformParameters) -> Volume {
        Self::apply_with(
            volume,
            params,
            Interpolation::Linear,
            self.config.fill_mode,
            self.config.fill_constant,
        )
    }

    /// 对掩膜施加 `params` (最近邻插值). 常量填充时以背景值填充.
    pub fn apply_mask(&self, mask: ArrayView4<'_, f32>, params: &TransformParameters) -> Volume {
        Self::apply_with(
            mask,
            params,
            Interpolation::Nearest,
            self.config.fill_mode,
            BACKGROUND,
        )
    }

    /// 对同一样本的输入、标签与种子施加同一组 `params`.
    pub fn apply_sample(&self, sample: SamplePair, params: &TransformParameters) -> SamplePair {
        if params.is_identity() {
            return sample;
        }
        SamplePair {
            input: self.apply(sample.input.view(), params),
            label: sample.label.map(|l| self.apply_mask(l.view(), params)),
            seed: sample.seed.map(|s| self.apply_mask(s.view(), params)),
        }
    }

    /// 采样一组参数并施加到整个样本上. 返回变换后的样本及所用参数.
    pub fn augment<R: Rng + ?Sized>(
        &self,
        sample: SamplePair,
        rng: &mut R,
    ) -> (SamplePair, TransformParameters) {
        let params = self.sample_parameters(rng);
        (self.apply_sample(sample, &params), params)
    }
}
