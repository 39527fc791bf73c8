//! 单次运行期间的配置对象.
//!
//! 目标形状 (`TargetShape`) 和强度上限 (`max_value`) 不再作为进程级全局常量,
//! 而是在构造预处理器、几何变换器与迭代器时显式传入.

use crate::consts::{
    DEFAULT_FILL_CONSTANT, DEFAULT_FLIP_PROBABILITY, DEFAULT_ROTATION_RANGE, DEFAULT_SHEAR_RANGE,
    DEFAULT_SHIFT_RANGE, DEFAULT_ZOOM_RANGE,
};
use crate::error::{PipelineError, Result};
use crate::Shape3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 网络输入要求的固定空间形状 (X, Y, Z).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TargetShape {
    x: usize,
    y: usize,
    z: usize,
}

impl TargetShape {
    /// 构造目标形状. 任一维度为 0 时返回 `None`.
    pub fn new(x: usize, y: usize, z: usize) -> Option<Self> {
        (x > 0 && y > 0 && z > 0).then_some(Self { x, y, z })
    }

    /// 以元组形式返回 `(X, Y, Z)`.
    #[inline]
    pub fn dim(&self) -> Shape3 {
        (self.x, self.y, self.z)
    }

    /// `shape` 是否在每个轴上都不小于目标形状.
    #[inline]
    pub fn fits_in(&self, (x, y, z): Shape3) -> bool {
        x >= self.x && y >= self.y && z >= self.z
    }
}

/// 预处理和批处理共用的运行配置.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// 目标空间形状.
    pub target_shape: TargetShape,

    /// 强度归一化时的除数.
    pub max_value: f32,
}

impl PipelineConfig {
    /// 构造配置. `max_value` 必须是有限正数.
    pub fn new(target_shape: TargetShape, max_value: f32) -> Result<Self> {
        if !(max_value.is_finite() && max_value > 0.0) {
            return Err(PipelineError::config(format!(
                "max value must be a positive finite number, got {max_value}"
            )));
        }
        Ok(Self {
            target_shape,
            max_value,
        })
    }

    /// 计算模型输入的通道数.
    ///
    /// 通道顺序固定为 `[强度, 每样本辅助通道.., 共享拼接通道.., 种子通道]`.
    /// `aux_channels` 为强度通道之后所有辅助通道的数量.
    #[inline]
    pub fn model_input_channels(&self, seeded: bool, aux_channels: usize) -> usize {
        1 + aux_channels + usize::from(seeded)
    }
}

/// 越界采样点的填充方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FillMode {
    /// 取最近的边界体素值.
    #[default]
    Nearest,

    /// 填充常量.
    Constant,
}

/// 空间轴.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis3 {
    /// 第一空间轴.
    X,
    /// 第二空间轴.
    Y,
    /// 第三空间轴.
    Z,
}

impl Axis3 {
    /// 全部三个轴.
    pub const ALL: [Axis3; 3] = [Axis3::X, Axis3::Y, Axis3::Z];

    /// 垂直于该轴的平面上的两个轴 (旋转平面), 按升序排列.
    #[inline]
    pub const fn plane(self) -> (usize, usize) {
        match self {
            Axis3::X => (1, 2),
            Axis3::Y => (0, 2),
            Axis3::Z => (0, 1),
        }
    }
}

/// 旋转轴的选择方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RotationAxis {
    /// 每个样本随机选择一个轴.
    #[default]
    Random,

    /// 固定绕某个轴旋转.
    Fixed(Axis3),
}

/// 随机几何增强的参数范围.
///
/// 所有范围都允许为 0, 此时对应的变换退化为恒等变换.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AugmentConfig {
    /// 旋转角范围 (度), 采样自 `[-r, r]`.
    pub rotation_range: f32,

    /// 平移范围, 单位为该轴长度的比例, 采样自 `[-s, s]`.
    pub shift_range: f32,

    /// 剪切角范围 (度), 采样自 `[-s, s]`.
    pub shear_range: f32,

    /// 缩放范围, 每个轴独立采样自 `[1 - z, 1 + z]`.
    pub zoom_range: f32,

    /// 越界填充方式.
    pub fill_mode: FillMode,

    /// `FillMode::Constant` 时输入通道使用的填充值.
    pub fill_constant: f32,

    /// 是否启用随机翻转.
    pub flip: bool,

    /// 每个轴独立翻转的概率.
    pub flip_probability: f32,

    /// 旋转 (以及剪切) 所用的轴.
    pub rotation_axis: RotationAxis,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            rotation_range: DEFAULT_ROTATION_RANGE,
            shift_range: DEFAULT_SHIFT_RANGE,
            shear_range: DEFAULT_SHEAR_RANGE,
            zoom_range: DEFAULT_ZOOM_RANGE,
            fill_mode: FillMode::default(),
            fill_constant: DEFAULT_FILL_CONSTANT,
            flip: true,
            flip_probability: DEFAULT_FLIP_PROBABILITY,
            rotation_axis: RotationAxis::default(),
        }
    }
}

impl AugmentConfig {
    /// 所有范围都为 0 且不翻转的配置, 即恒等变换.
    pub fn identity() -> Self {
        Self {
            rotation_range: 0.0,
            shift_range: 0.0,
            shear_range: 0.0,
            zoom_range: 0.0,
            flip: false,
            ..Self::default()
        }
    }

    /// 检查参数范围.
    ///
    /// 范围本身必须非负且有限 (采样得到的值可正可负), 缩放下限 `1 - z`
    /// 必须为正, 翻转概率必须在 `[0, 1]` 内.
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("rotation_range", self.rotation_range),
            ("shift_range", self.shift_range),
            ("shear_range", self.shear_range),
            ("zoom_range", self.zoom_range),
        ];
        for (name, value) in ranges {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PipelineError::config(format!(
                    "{name} must be a non-negative finite number, got {value}"
                )));
            }
        }
        if self.zoom_range >= 1.0 {
            return Err(PipelineError::config(format!(
                "zoom_range must be below 1, got {}",
                self.zoom_range
            )));
        }
        if !(0.0..=1.0).contains(&self.flip_probability) {
            return Err(PipelineError::config(format!(
                "flip_probability must be within [0, 1], got {}",
                self.flip_probability
            )));
        }
        if !self.fill_constant.is_finite() {
            return Err(PipelineError::config("fill_constant must be finite"));
        }
        Ok(())
    }
}
