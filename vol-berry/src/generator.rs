//! 验证与推理用的确定性批次生成器.
//!
//! [`VolumeGenerator`] 不做增强, 也不打乱顺序. 默认按需加载: 获取第 `i`
//! 个批次时只读取该批次涉及的文件. 开启 `load_files` 时在构造阶段一次性载入
//! 全部样本, 批次组装方式不变.

use std::path::PathBuf;

use log::{debug, info};
use rand_chacha::ChaCha8Rng;

use crate::batch::{
    check_batch_size, get_rng, load_input, Batch, BatchAssembler, SeedMode, SharedVolume,
};
use crate::consts::DEFAULT_BATCH_SIZE;
use crate::data::VolumeReader;
use crate::dataset::{Dataset, Entry};
use crate::error::{PipelineError, Result};
use crate::preprocess::{Preprocessor, Step};
use crate::transform::SamplePair;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 生成器配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct GeneratorConfig {
    /// 批次大小.
    pub batch_size: usize,

    /// 输入是否做强度归一化. 为假时只裁剪.
    pub rescale: bool,

    /// 是否随批次返回标签.
    pub include_labels: bool,

    /// 种子通道来源.
    pub seed_mode: SeedMode,

    /// 是否在构造时载入全部样本.
    pub load_files: bool,

    /// 切片种子的随机数种子. `None` 时从系统熵初始化.
    pub seed: Option<u64>,

    /// 每样本辅助文件的预处理步骤.
    pub aux_steps: Vec<Step>,

    /// 追加到每个样本的共享体数据.
    pub shared: Vec<SharedVolume>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            rescale: true,
            include_labels: true,
            seed_mode: SeedMode::None,
            load_files: false,
            seed: None,
            aux_steps: Step::MASK.to_vec(),
            shared: Vec::new(),
        }
    }
}

/// 确定性批次生成器.
#[derive(Debug)]
pub struct VolumeGenerator<R: VolumeReader> {
    reader: R,
    preprocessor: Preprocessor,
    dataset: Dataset,
    config: GeneratorConfig,
    assembler: BatchAssembler,
    cache: Option<Vec<SamplePair>>,
    position: usize,
    rng: ChaCha8Rng,
}

impl<R: VolumeReader> VolumeGenerator<R> {
    /// 构造生成器.
    ///
    /// # 注意
    ///
    /// 种子来源与数据集不相容时 (切片种子却没有标签, 或同时给出了种子文件)
    /// 立即返回配置错误, 不会等到请求第一个批次.
    pub fn new(
        preprocessor: Preprocessor,
        reader: R,
        dataset: Dataset,
        config: GeneratorConfig,
    ) -> Result<Self> {
        check_batch_size(config.batch_size)?;
        let assembler =
            BatchAssembler::new(config.seed_mode, dataset.has_labels(), dataset.has_seeds())?
                .with_shared(&preprocessor, &reader, &config.shared)?;

        let mut generator = Self {
            rng: get_rng(config.seed),
            reader,
            preprocessor,
            dataset,
            config,
            assembler,
            cache: None,
            position: 0,
        };
        if generator.config.load_files {
            let cache = generator
                .dataset
                .entries(0..generator.dataset.len())
                .map(|e| generator.load_sample(e))
                .collect::<Result<Vec<_>>>()?;
            info!("cached {} samples for evaluation", cache.len());
            generator.cache = Some(cache);
        }
        Ok(generator)
    }

    /// 输入的预处理步骤.
    #[inline]
    fn input_steps(&self) -> &'static [Step] {
        if self.config.rescale {
            Step::INTENSITY
        } else {
            Step::MASK
        }
    }

    /// 是否需要读取标签.
    #[inline]
    fn needs_labels(&self) -> bool {
        self.config.include_labels || self.config.seed_mode.derives_from_label()
    }

    fn load_sample(&self, entry: Entry<'_>) -> Result<SamplePair> {
        let (pre, reader) = (&self.preprocessor, &self.reader);
        let aux = entry.aux.map(|p| (p, self.config.aux_steps.as_slice()));
        let input = load_input(pre, reader, entry.input, self.input_steps(), aux)?;
        let label = match entry.label {
            Some(path) if self.needs_labels() => Some(pre.preprocess(reader, path, Step::MASK)?),
            _ => None,
        };
        let seed = entry
            .seed
            .map(|path| pre.preprocess(reader, path, Step::MASK))
            .transpose()?;
        Ok(SamplePair::new(input).with_label(label).with_seed(seed))
    }

    /// 批次数, 即 `ceil(样本数 / 批次大小)`.
    #[inline]
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.config.batch_size)
    }

    /// 是否没有任何批次.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// 数据集.
    #[inline]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// 当前位置.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    fn check_index(&self, index: usize) -> Result<std::ops::Range<usize>> {
        let len = self.len();
        if index >= len {
            return Err(PipelineError::Index { index, len });
        }
        let start = index * self.config.batch_size;
        Ok(start..start.saturating_add(self.config.batch_size).min(self.dataset.len()))
    }

    /// 第 `index` 个批次对应的输入文件, 用于把预测结果映射回源文件.
    pub fn batch_files(&self, index: usize) -> Result<&[PathBuf]> {
        let range = self.check_index(index)?;
        Ok(&self.dataset.inputs()[range])
    }

    /// 获取第 `index` 个批次.
    ///
    /// `index` 不在 `[0, len())` 内时返回 [`PipelineError::Index`].
    pub fn get_batch(&mut self, index: usize) -> Result<Batch> {
        let range = self.check_index(index)?;
        let samples = match &self.cache {
            Some(cache) => cache[range].to_vec(),
            None => self
                .dataset
                .entries(range)
                .map(|e| self.load_sample(e))
                .collect::<Result<Vec<_>>>()?,
        };
        let batch = self
            .assembler
            .assemble(samples, self.config.include_labels, &mut self.rng)?;
        debug!("batch {}/{}: {:?}", index + 1, self.len(), batch.inputs.dim());
        Ok(batch)
    }

    /// 位置归零, 开始新的一轮.
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl<R: VolumeReader> Iterator for VolumeGenerator<R> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, TargetShape};
    use crate::data::mem::MemReader;
    use crate::data::Volume;

    fn reader(n: usize) -> MemReader {
        let mut reader = MemReader::default();
        for i in 0..n {
            reader.insert(&format!("in{i}"), Volume::from_elem((6, 6, 6, 1), 100.0));
            let label = Volume::from_shape_fn((6, 6, 6, 1), |(x, _, _, _)| {
                if x == 3 {
                    1.0
                } else {
                    0.0
                }
            });
            reader.insert(&format!("lb{i}"), label);
            reader.insert(&format!("sd{i}"), Volume::ones((6, 6, 6, 1)));
        }
        reader
    }

    fn dataset(n: usize) -> Dataset {
        Dataset::new((0..n).map(|i| format!("in{i}")))
            .with_labels((0..n).map(|i| format!("lb{i}")))
            .unwrap()
    }

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(PipelineConfig::new(TargetShape::new(4, 4, 4).unwrap(), 100.0).unwrap())
    }

    #[test]
    fn test_huge_batch_size() {
        let r = reader(3);
        let mut g = VolumeGenerator::new(
            preprocessor(),
            &r,
            dataset(3),
            GeneratorConfig {
                batch_size: usize::MAX,
                ..GeneratorConfig::default()
            },
        )
        .unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.batch_files(0).unwrap().len(), 3);
        assert_eq!(g.get_batch(0).unwrap().len(), 3);
    }

    #[test]
    fn test_lazy_loading() {
        let r = reader(3);
        let mut g = VolumeGenerator::new(
            preprocessor(),
            &r,
            dataset(3),
            GeneratorConfig {
                batch_size: 2,
                ..GeneratorConfig::default()
            },
        )
        .unwrap();
        assert_eq!(r.reads(), 0);
        assert_eq!(g.len(), 2);

        let b = g.get_batch(1).unwrap();
        assert_eq!(r.reads(), 2);
        assert_eq!(b.len(), 1);
        assert_eq!(b.inputs.dim(), (1, 4, 4, 4, 1));
        assert!(b.inputs.iter().all(|&v| v == 1.0));
        assert_eq!(b.labels.unwrap().dim(), (1, 4, 4, 4, 1));

        assert_eq!(g.batch_files(1).unwrap(), &[PathBuf::from("in2")]);
        assert!(matches!(g.get_batch(2), Err(PipelineError::Index { .. })));
        assert!(g.batch_files(2).is_err());
    }

    #[test]
    fn test_load_files_caches() {
        let r = reader(3);
        let mut g = VolumeGenerator::new(
            preprocessor(),
            &r,
            dataset(3),
            GeneratorConfig {
                batch_size: 2,
                load_files: true,
                ..GeneratorConfig::default()
            },
        )
        .unwrap();
        assert_eq!(r.reads(), 6);
        let sizes: Vec<_> = g.by_ref().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![2, 1]);
        assert_eq!(r.reads(), 6);
        g.reset();
        assert_eq!(g.count(), 2);
    }

    #[test]
    fn test_rescale_toggle_and_no_labels() {
        let r = reader(1);
        let mut g = VolumeGenerator::new(
            preprocessor(),
            &r,
            dataset(1),
            GeneratorConfig {
                rescale: false,
                include_labels: false,
                ..GeneratorConfig::default()
            },
        )
        .unwrap();
        let b = g.get_batch(0).unwrap();
        assert!(b.inputs.iter().all(|&v| v == 100.0));
        assert!(b.labels.is_none());
        // 不需要标签时不读取标签文件.
        assert_eq!(r.reads(), 1);
    }

    #[test]
    fn test_slice_seed_from_ground_truth() {
        let r = reader(2);
        let mut g = VolumeGenerator::new(
            preprocessor(),
            &r,
            dataset(2),
            GeneratorConfig {
                batch_size: 2,
                include_labels: false,
                seed_mode: SeedMode::LabelSlice,
                seed: Some(3),
                ..GeneratorConfig::default()
            },
        )
        .unwrap();
        let b = g.get_batch(0).unwrap();
        assert_eq!(b.channels(), 2);
        assert!(b.labels.is_none());
        // 裁剪后唯一的非空切片为 x = 2.
        for s in b.inputs.outer_iter() {
            assert_eq!(s[[2, 0, 0, 1]], 1.0);
            assert_eq!(s.index_axis(ndarray::Axis(3), 1).sum(), 16.0);
        }
    }

    #[test]
    fn test_slice_seed_configuration_errors() {
        let r = reader(1);
        let cfg = GeneratorConfig {
            seed_mode: SeedMode::LabelSlice,
            ..GeneratorConfig::default()
        };
        let no_labels = Dataset::new(["in0"]);
        let err = VolumeGenerator::new(preprocessor(), &r, no_labels, cfg.clone()).unwrap_err();
        assert!(err.is_configuration());

        let with_seeds = dataset(1).with_seeds(["sd0"]).unwrap();
        let err = VolumeGenerator::new(preprocessor(), &r, with_seeds, cfg).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(r.reads(), 0);
    }

    #[test]
    fn test_seed_files() {
        let r = reader(2);
        let d = dataset(2).with_seeds(["sd0", "sd1"]).unwrap();
        let mut g = VolumeGenerator::new(
            preprocessor(),
            &r,
            d,
            GeneratorConfig {
                seed_mode: SeedMode::Files,
                ..GeneratorConfig::default()
            },
        )
        .unwrap();
        let b = g.get_batch(1).unwrap();
        assert_eq!(b.channels(), 2);
        assert_eq!(b.inputs[[0, 0, 0, 0, 1]], 1.0);
    }
}
