//! 三维仿射变换的组合与重采样.

use ndarray::{ArrayView4, Axis, Zip};

use super::{Interpolation, TransformParameters};
use crate::config::FillMode;
use crate::data::{spatial_shape, Volume};
use crate::Shape3;

type Mat3 = [[f64; 3]; 3];

type Sampler = for<'a, 'b> fn(&'a ArrayView4<'b, f32>, usize, [f64; 3], Fill) -> f32;

const IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// 判断采样点是否越界时允许的浮点误差.
const EPS: f64 = 1e-6;

#[inline]
fn matmul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// 越界采样点的实际填充策略.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum Fill {
    /// 钳位到最近的边界体素.
    Nearest,

    /// 填充给定常量.
    Constant(f32),
}

impl Fill {
    #[inline]
    pub(crate) fn new(mode: FillMode, constant: f32) -> Self {
        match mode {
            FillMode::Nearest => Fill::Nearest,
            FillMode::Constant => Fill::Constant(constant),
        }
    }
}

/// 输出坐标到输入坐标的仿射映射: `input = m · output + offset`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct Affine3 {
    m: Mat3,
    offset: [f64; 3],
}

impl Affine3 {
    /// 由变换参数构造以体数据中心为原点的仿射映射.
    ///
    /// 线性部分依次为旋转、剪切、缩放 (右乘先作用), 平移量为轴长乘以平移比例.
    /// 翻转不在此处处理.
    pub(crate) fn from_parameters(params: &TransformParameters, shape: Shape3) -> Self {
        let dims = [shape.0, shape.1, shape.2];
        let (i, j) = params.rotation_axis.plane();

        let theta = f64::from(params.rotation).to_radians();
        let mut rotation = IDENTITY;
        rotation[i][i] = theta.cos();
        rotation[i][j] = -theta.sin();
        rotation[j][i] = theta.sin();
        rotation[j][j] = theta.cos();

        let shear = f64::from(params.shear).to_radians();
        let mut shearing = IDENTITY;
        shearing[i][j] = -shear.sin();
        shearing[j][j] = shear.cos();

        let mut zoom = IDENTITY;
        for (k, row) in zoom.iter_mut().enumerate() {
            row[k] = f64::from(params.zoom[k]);
        }

        let m = matmul(&matmul(&rotation, &shearing), &zoom);

        let center: [f64; 3] = std::array::from_fn(|k| (dims[k] as f64 - 1.0) / 2.0);
        let offset = std::array::from_fn(|k| {
            let mc: f64 = (0..3).map(|l| m[k][l] * center[l]).sum();
            center[k] + f64::from(params.shift[k]) * dims[k] as f64 - mc
        });

        Self { m, offset }
    }

    /// 输出体素 `o` 对应的输入坐标.
    #[inline]
    pub(crate) fn map(&self, o: [f64; 3]) -> [f64; 3] {
        std::array::from_fn(|k| {
            self.m[k][0].mul_add(o[0], self.m[k][1].mul_add(o[1], self.m[k][2] * o[2]))
                + self.offset[k]
        })
    }

    /// 是否为恒等映射.
    pub(crate) fn is_identity(&self) -> bool {
        let linear = (0..3)
            .flat_map(|i| (0..3).map(move |j| (i, j)))
            .all(|(i, j)| (self.m[i][j] - IDENTITY[i][j]).abs() < EPS);
        linear && self.offset.iter().all(|v| v.abs() < EPS)
    }
}

/// 将单轴坐标钳位到合法范围. 越界且需常量填充时以 `Err` 返回填充值.
#[inline]
fn bound(p: f64, len: usize, fill: Fill) -> Result<f64, f32> {
    let max = (len - 1) as f64;
    match fill {
        Fill::Constant(v) if p < -EPS || p > max + EPS => Err(v),
        _ => Ok(p.clamp(0.0, max)),
    }
}

fn sample_nearest(src: &ArrayView4<'_, f32>, c: usize, p: [f64; 3], fill: Fill) -> f32 {
    let (x, y, z) = spatial_shape(src);
    let dims = [x, y, z];
    let mut idx = [0usize; 3];
    for k in 0..3 {
        match bound(p[k].round(), dims[k], fill) {
            Ok(v) => idx[k] = v as usize,
            Err(constant) => return constant,
        }
    }
    src[[idx[0], idx[1], idx[2], c]]
}

/// 三线性插值, 写法沿用双线性插值的 `mul_add` 形式.
fn sample_linear(src: &ArrayView4<'_, f32>, c: usize, p: [f64; 3], fill: Fill) -> f32 {
    let (x, y, z) = spatial_shape(src);
    let dims = [x, y, z];
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    let mut frac = [0f32; 3];
    for k in 0..3 {
        let v = match bound(p[k], dims[k], fill) {
            Ok(v) => v,
            Err(constant) => return constant,
        };
        let v0 = v.floor();
        lo[k] = v0 as usize;
        hi[k] = (lo[k] + 1).min(dims[k] - 1);
        frac[k] = (v - v0) as f32;
    }

    let at = |a: usize, b: usize, d: usize| src[[a, b, d, c]];
    let lerp = |v0: f32, v1: f32, t: f32| v0.mul_add(1.0 - t, v1 * t);

    let c00 = lerp(at(lo[0], lo[1], lo[2]), at(hi[0], lo[1], lo[2]), frac[0]);
    let c01 = lerp(at(lo[0], lo[1], hi[2]), at(hi[0], lo[1], hi[2]), frac[0]);
    let c10 = lerp(at(lo[0], hi[1], lo[2]), at(hi[0], hi[1], lo[2]), frac[0]);
    let c11 = lerp(at(lo[0], hi[1], hi[2]), at(hi[0], hi[1], hi[2]), frac[0]);

    let c0 = lerp(c00, c10, frac[1]);
    let c1 = lerp(c01, c11, frac[1]);
    lerp(c0, c1, frac[2])
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        /// 借助 `rayon`, 并行地按索引填充输出体数据.
        fn fill_indexed<F>(out: &mut Volume, f: F)
        where
            F: Fn((usize, usize, usize, usize)) -> f32 + Sync + Send,
        {
            Zip::indexed(out).par_for_each(|idx, o| *o = f(idx));
        }
    } else {
        /// 按索引填充输出体数据.
        fn fill_indexed<F>(out: &mut Volume, f: F)
        where
            F: Fn((usize, usize, usize, usize)) -> f32,
        {
            Zip::indexed(out).for_each(|idx, o| *o = f(idx));
        }
    }
}

/// 对 `src` 的每个通道施加同一仿射映射并重采样, 然后按参数翻转.
pub(crate) fn resample(
    src: ArrayView4<'_, f32>,
    params: &TransformParameters,
    interpolation: Interpolation,
    fill: Fill,
) -> Volume {
    let affine = Affine3::from_parameters(params, spatial_shape(&src));

    let mut out = if affine.is_identity() {
        src.to_owned()
    } else {
        let mut out = Volume::zeros(src.raw_dim());
        let sampler: Sampler = match interpolation {
            Interpolation::Linear => sample_linear,
            Interpolation::Nearest => sample_nearest,
        };
        fill_indexed(&mut out, |(x, y, z, c)| {
            let p = affine.map([x as f64, y as f64, z as f64]);
            sampler(&src, c, p, fill)
        });
        out
    };

    if params.flip.iter().any(|&f| f) {
        for k in (0..3).filter(|&k| params.flip[k]) {
            out.invert_axis(Axis(k));
        }
        out = out.as_standard_layout().into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Axis3;

    #[test]
    fn test_identity_parameters() {
        let a = Affine3::from_parameters(&TransformParameters::identity(), (5, 6, 7));
        assert!(a.is_identity());
        assert_eq!(a.map([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_rotation_keeps_center() {
        let params = TransformParameters {
            rotation_axis: Axis3::Z,
            rotation: 37.0,
            ..TransformParameters::identity()
        };
        let a = Affine3::from_parameters(&params, (9, 9, 9));
        let p = a.map([4.0, 4.0, 4.0]);
        assert!(p.iter().all(|v| (v - 4.0).abs() < 1e-9));
        // 绕 Z 轴旋转不改变 Z 坐标.
        let p = a.map([0.0, 3.0, 7.0]);
        assert!((p[2] - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_shift_offsets_by_extent() {
        let params = TransformParameters {
            shift: [0.5, 0.0, -0.25],
            ..TransformParameters::identity()
        };
        let a = Affine3::from_parameters(&params, (4, 4, 8));
        let p = a.map([0.0, 0.0, 4.0]);
        assert!((p[0] - 2.0).abs() < 1e-9);
        assert!((p[1] - 0.0).abs() < 1e-9);
        assert!((p[2] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_sampling_midpoint() {
        let src = Volume::from_shape_fn((2, 2, 2, 1), |(x, _, _, _)| x as f32 * 10.0);
        let v = sample_linear(&src.view(), 0, [0.5, 0.0, 0.0], Fill::Nearest);
        assert!((v - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_fill_out_of_bounds() {
        let src = Volume::ones((3, 3, 3, 1));
        let fill = Fill::Constant(-1.0);
        assert_eq!(sample_linear(&src.view(), 0, [-1.0, 0.0, 0.0], fill), -1.0);
        assert_eq!(sample_nearest(&src.view(), 0, [0.0, 3.0, 0.0], fill), -1.0);
        assert_eq!(sample_nearest(&src.view(), 0, [0.0, 3.0, 0.0], Fill::Nearest), 1.0);
    }

    #[test]
    fn test_flip_reverses_axis() {
        let src = Volume::from_shape_fn((3, 2, 2, 1), |(x, _, _, _)| x as f32);
        let params = TransformParameters {
            flip: [true, false, false],
            ..TransformParameters::identity()
        };
        let out = resample(src.view(), &params, Interpolation::Linear, Fill::Nearest);
        assert!(out.is_standard_layout());
        assert_eq!(out[[0, 0, 0, 0]], 2.0);
        assert_eq!(out[[2, 1, 1, 0]], 0.0);
    }
}
