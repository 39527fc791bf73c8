//! 类别权重.

use itertools::Itertools;
use log::{info, warn};
use ndarray::{ArrayBase, Data, Ix4};
use num::ToPrimitive;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 类别索引到权重的映射. 训练开始前计算一次, 之后不再改变.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassWeights {
    weights: Vec<f64>,
}

impl ClassWeights {
    /// 类别 `class` 的权重. 类别不存在时返回 `None`.
    #[inline]
    pub fn get(&self, class: usize) -> Option<f64> {
        self.weights.get(class).copied()
    }

    /// 类别数.
    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// 是否没有任何类别.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// 按类别索引升序迭代 `(类别, 权重)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.weights.iter().copied().enumerate()
    }

    /// 权重切片, 下标为类别索引.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }
}

/// 体素值对应的类别索引. 四舍五入到最近的非负整数, 非法值返回 `None`.
#[inline]
fn class_of(v: f32) -> Option<usize> {
    v.round().to_usize()
}

/// 单个标签中各类别的体素个数.
fn count_one<S: Data<Elem = f32>>(label: &ArrayBase<S, Ix4>) -> Vec<u64> {
    let mut counts = Vec::new();
    for c in label.iter().filter_map(|&v| class_of(v)) {
        if c >= counts.len() {
            counts.resize(c + 1, 0);
        }
        counts[c] += 1;
    }
    counts
}

/// 逐类别累加两组计数.
fn merge(mut a: Vec<u64>, b: Vec<u64>) -> Vec<u64> {
    if a.len() < b.len() {
        a.resize(b.len(), 0);
    }
    for (x, y) in a.iter_mut().zip(b) {
        *x += y;
    }
    a
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        /// 借助 `rayon`, 并行地统计所有标签的类别计数.
        fn count_classes<S: Data<Elem = f32> + Sync>(labels: &[&ArrayBase<S, Ix4>]) -> Vec<u64> {
            labels
                .par_iter()
                .map(|l| count_one(l))
                .reduce(Vec::new, merge)
        }
    } else {
        /// 统计所有标签的类别计数.
        fn count_classes<S: Data<Elem = f32>>(labels: &[&ArrayBase<S, Ix4>]) -> Vec<u64> {
            labels.iter().map(|l| count_one(l)).fold(Vec::new(), merge)
        }
    }
}

/// 统计全部标签的体素类别分布, 计算与频率成反比的权重:
///
/// `weight[c] = total / (num_classes * count[c])`
///
/// 其中 `num_classes` 为最大类别索引加一.
///
/// # 注意
///
/// 1. 某个类别在标签中一次也没有出现时, 其权重为 0 并输出警告.
/// 2. 负数或非有限的体素值不计入统计.
pub fn compute_weights<'a, S, I>(labels: I) -> ClassWeights
where
    S: Data<Elem = f32> + Sync + 'a,
    I: IntoIterator<Item = &'a ArrayBase<S, Ix4>>,
{
    let labels: Vec<_> = labels.into_iter().collect();
    let counts = count_classes(&labels);

    let total: u64 = counts.iter().sum();
    let num_classes = counts.len() as f64;
    let weights: Vec<f64> = counts
        .iter()
        .enumerate()
        .map(|(c, &n)| {
            if n == 0 {
                warn!("class {c} does not occur in the labels, weight set to 0");
                0.0
            } else {
                total as f64 / (num_classes * n as f64)
            }
        })
        .collect();

    info!(
        "class weights over {total} voxels: [{}]",
        weights.iter().map(|w| format!("{w:.4}")).join(", ")
    );
    ClassWeights { weights }
}
