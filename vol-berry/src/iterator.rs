//! 训练用的增强迭代器.
//!
//! [`VolumeIterator`] 在构造时把整个数据集预处理后载入内存, 每一轮 (pass)
//! 开始时重新打乱样本顺序, 对每个样本采样一组变换参数并同时施加到输入、
//! 标签与种子上, 最后交给 [`BatchAssembler`] 组装批次.
//!
//! # 迭代协议
//!
//! 迭代器实现了 [`Iterator`]: 越过最后一个批次时返回 `None` 表示本轮结束,
//! 调用 [`VolumeIterator::reset`] 开始新的一轮. 需要固定步数时使用
//! [`VolumeIterator::steps`], 它会在轮次之间自动重置.

use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::batch::{
    check_batch_size, get_rng, load_input, Batch, BatchAssembler, SeedMode, SharedVolume,
};
use crate::consts::DEFAULT_BATCH_SIZE;
use crate::data::{Volume, VolumeReader};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::preprocess::{Preprocessor, Step};
use crate::transform::{GeometricTransformer, SamplePair};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 增强策略.
#[derive(Copy, Clone, Debug)]
pub enum Augmentation {
    /// 不做增强.
    Identity,

    /// 对每个样本随机采样变换参数.
    Random(GeometricTransformer),
}

impl Augmentation {
    /// 对样本施加增强. 同一样本的所有体数据使用同一组参数.
    pub fn apply<R: Rng + ?Sized>(&self, sample: SamplePair, rng: &mut R) -> SamplePair {
        match self {
            Augmentation::Identity => sample,
            Augmentation::Random(t) => t.augment(sample, rng).0,
        }
    }
}

/// 迭代器配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct IteratorConfig {
    /// 批次大小.
    pub batch_size: usize,

    /// 每轮开始时是否打乱顺序.
    pub shuffle: bool,

    /// 随机数种子. `None` 时从系统熵初始化.
    pub seed: Option<u64>,

    /// 种子通道来源.
    pub seed_mode: SeedMode,

    /// 每样本辅助文件的预处理步骤.
    pub aux_steps: Vec<Step>,

    /// 追加到每个样本的共享体数据. 不参与增强.
    pub shared: Vec<SharedVolume>,
}

impl Default for IteratorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            shuffle: true,
            seed: None,
            seed_mode: SeedMode::None,
            aux_steps: Step::MASK.to_vec(),
            shared: Vec::new(),
        }
    }
}

/// 增强迭代器.
#[derive(Debug)]
pub struct VolumeIterator {
    inputs: Vec<Volume>,
    labels: Option<Vec<Volume>>,
    seeds: Option<Vec<Volume>>,
    augmentation: Augmentation,
    assembler: BatchAssembler,
    batch_size: usize,
    shuffle: bool,
    order: Vec<usize>,
    position: usize,
    epoch: usize,
    rng: ChaCha8Rng,
}

impl VolumeIterator {
    /// 通过 `reader` 预处理并载入 `dataset` 中的所有体数据.
    ///
    /// 输入按 `[Rescale, Crop]` 处理, 标签与种子按 `[Crop]` 处理.
    ///
    /// # 注意
    ///
    /// 种子来源与数据集不相容 (例如同时给出种子文件并要求从标签切片合成种子)
    /// 时, 在载入任何文件之前返回配置错误.
    pub fn new<R: VolumeReader + ?Sized>(
        preprocessor: &Preprocessor,
        reader: &R,
        dataset: &Dataset,
        augmentation: Augmentation,
        config: IteratorConfig,
    ) -> Result<Self> {
        check_batch_size(config.batch_size)?;
        let assembler =
            BatchAssembler::new(config.seed_mode, dataset.has_labels(), dataset.has_seeds())?
                .with_shared(preprocessor, reader, &config.shared)?;

        let n = dataset.len();
        let mut inputs = Vec::with_capacity(n);
        let mut labels = dataset.has_labels().then(|| Vec::with_capacity(n));
        let mut seeds = dataset.has_seeds().then(|| Vec::with_capacity(n));

        for entry in dataset.entries(0..n) {
            let aux = entry.aux.map(|p| (p, config.aux_steps.as_slice()));
            inputs.push(load_input(preprocessor, reader, entry.input, Step::INTENSITY, aux)?);
            if let (Some(labels), Some(path)) = (labels.as_mut(), entry.label) {
                labels.push(preprocessor.preprocess(reader, path, Step::MASK)?);
            }
            if let (Some(seeds), Some(path)) = (seeds.as_mut(), entry.seed) {
                seeds.push(preprocessor.preprocess(reader, path, Step::MASK)?);
            }
        }
        info!(
            "loaded {} volumes (labels: {}, seed files: {}, auxiliary: {})",
            n,
            labels.is_some(),
            seeds.is_some(),
            dataset.aux().is_some()
        );

        Self::build(inputs, labels, seeds, augmentation, assembler, &config)
    }

    /// 从已预处理的内存体数据构造迭代器.
    ///
    /// `labels` 长度必须与 `inputs` 一致. 不支持种子文件与共享体数据.
    pub fn from_volumes(
        inputs: Vec<Volume>,
        labels: Option<Vec<Volume>>,
        augmentation: Augmentation,
        config: IteratorConfig,
    ) -> Result<Self> {
        check_batch_size(config.batch_size)?;
        if let Some(l) = &labels {
            if l.len() != inputs.len() {
                return Err(PipelineError::config(format!(
                    "label list has {} volumes but there are {} inputs",
                    l.len(),
                    inputs.len()
                )));
            }
        }
        if !config.shared.is_empty() {
            return Err(PipelineError::config(
                "shared volumes need a reader, use `VolumeIterator::new`",
            ));
        }
        let assembler = BatchAssembler::new(config.seed_mode, labels.is_some(), false)?;
        Self::build(inputs, labels, None, augmentation, assembler, &config)
    }

    fn build(
        inputs: Vec<Volume>,
        labels: Option<Vec<Volume>>,
        seeds: Option<Vec<Volume>>,
        augmentation: Augmentation,
        assembler: BatchAssembler,
        config: &IteratorConfig,
    ) -> Result<Self> {
        let mut it = Self {
            order: (0..inputs.len()).collect(),
            inputs,
            labels,
            seeds,
            augmentation,
            assembler,
            batch_size: config.batch_size,
            shuffle: config.shuffle,
            position: 0,
            epoch: 0,
            rng: get_rng(config.seed),
        };
        it.reorder();
        Ok(it)
    }

    fn reorder(&mut self) {
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
    }

    /// 每轮的批次数, 即 `ceil(样本数 / 批次大小)`.
    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len().div_ceil(self.batch_size)
    }

    /// 是否没有任何批次.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// 样本个数.
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.inputs.len()
    }

    /// 批次大小.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 已经开始的轮数减一. 构造后为 0, 每次 [`Self::reset`] 加一.
    #[inline]
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// 当前轮内下一个批次的索引.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// 预处理后的 (未增强的) 标签. 用于计算类别权重.
    pub fn labels(&self) -> Option<&[Volume]> {
        self.labels.as_deref()
    }

    /// 种子通道来源.
    #[inline]
    pub fn seed_mode(&self) -> SeedMode {
        self.assembler.seed_mode()
    }

    /// 获取本轮的第 `index` 个批次.
    ///
    /// 每个样本采样一组变换参数, 同时施加到该样本的输入、标签与种子文件上.
    /// 由标签推导的种子取自增强之后的标签, 因此与增强后的输入几何一致.
    ///
    /// `index` 不在 `[0, len())` 内时返回 [`PipelineError::Index`].
    pub fn get_batch(&mut self, index: usize) -> Result<Batch> {
        let len = self.len();
        if index >= len {
            return Err(PipelineError::Index { index, len });
        }
        let start = index * self.batch_size;
        let end = start.saturating_add(self.batch_size).min(self.inputs.len());

        let mut samples = Vec::with_capacity(end - start);
        for &i in &self.order[start..end] {
            let sample = SamplePair::new(self.inputs[i].clone())
                .with_label(self.labels.as_ref().map(|l| l[i].clone()))
                .with_seed(self.seeds.as_ref().map(|s| s[i].clone()));
            samples.push(self.augmentation.apply(sample, &mut self.rng));
        }
        let batch = self.assembler.assemble(samples, true, &mut self.rng)?;
        debug!(
            "epoch {} batch {}/{}: {:?}",
            self.epoch,
            index + 1,
            len,
            batch.inputs.dim()
        );
        Ok(batch)
    }

    /// 开始新的一轮: 位置归零, 轮数加一, 并重新打乱顺序.
    pub fn reset(&mut self) {
        self.position = 0;
        self.epoch += 1;
        self.reorder();
        info!("starting pass {} over {} samples", self.epoch, self.inputs.len());
    }

    /// 恰好产生 `n` 个批次, 一轮结束时自动开始新的一轮.
    pub fn steps(&mut self, n: usize) -> Steps<'_> {
        Steps {
            iter: self,
            remaining: n,
        }
    }
}

impl Iterator for VolumeIterator {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.len() {
            return None;
        }
        let batch = self.get_batch(self.position);
        self.position += 1;
        Some(batch)
    }
}

/// 固定步数的批次迭代器, 见 [`VolumeIterator::steps`].
#[derive(Debug)]
pub struct Steps<'a> {
    iter: &'a mut VolumeIterator,
    remaining: usize,
}

impl Iterator for Steps<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.iter.is_empty() {
            return None;
        }
        if VolumeIterator::position(self.iter) >= self.iter.len() {
            self.iter.reset();
        }
        self.remaining -= 1;
        self.iter.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.iter.is_empty() { 0 } else { self.remaining };
        (n, Some(n))
    }
}

impl ExactSizeIterator for Steps<'_> {}
