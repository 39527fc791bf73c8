//! 通用常量.

/// 标签与种子中的背景值.
pub const BACKGROUND: f32 = 0.0;

/// 默认批次大小.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// 默认旋转角范围 (度).
pub const DEFAULT_ROTATION_RANGE: f32 = 90.0;

/// 默认平移范围 (轴长比例).
pub const DEFAULT_SHIFT_RANGE: f32 = 0.1;

/// 默认剪切角范围 (度).
pub const DEFAULT_SHEAR_RANGE: f32 = 0.2;

/// 默认缩放范围.
pub const DEFAULT_ZOOM_RANGE: f32 = 0.2;

/// 默认常量填充值.
pub const DEFAULT_FILL_CONSTANT: f32 = 0.0;

/// 默认单轴翻转概率.
pub const DEFAULT_FLIP_PROBABILITY: f32 = 0.5;

/// 体素是否为前景 (非背景)?
#[inline]
pub fn is_foreground(v: f32) -> bool {
    v != BACKGROUND
}
