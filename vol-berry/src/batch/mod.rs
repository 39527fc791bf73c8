//! 批次组装.
//!
//! [`VolumeIterator`](crate::iterator::VolumeIterator) 与
//! [`VolumeGenerator`](crate::generator::VolumeGenerator) 共用同一个
//! [`BatchAssembler`], 两者只在样本来源 (是否增强、何时加载) 上不同.
//!
//! 输入批次的通道顺序固定为:
//!
//! `[强度, 每样本辅助.., 共享拼接.., 种子]`
//!
//! 种子通道 (若有) 永远在最后. 模型定义必须遵守同一顺序.

use std::path::{Path, PathBuf};

use ndarray::Axis;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::data::{concat_channels, stack_volumes, BatchArray, Volume, VolumeReader};
use crate::error::{PipelineError, Result};
use crate::preprocess::{Preprocessor, Step};
use crate::transform::SamplePair;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod seed;

/// 给定种子时构造可复现的随机源, 否则从系统熵构造.
pub(crate) fn get_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// 批次大小必须为正.
pub(crate) fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        Err(PipelineError::config("batch size must be positive"))
    } else {
        Ok(())
    }
}

/// 预处理强度输入, 并拼接其每样本辅助通道.
pub(crate) fn load_input<R: VolumeReader + ?Sized>(
    preprocessor: &Preprocessor,
    reader: &R,
    input: &Path,
    input_steps: &[Step],
    aux: Option<(&Path, &[Step])>,
) -> Result<Volume> {
    let volume = preprocessor.preprocess(reader, input, input_steps)?;
    match aux {
        Some((path, steps)) => {
            let aux = preprocessor.preprocess(reader, path, steps)?;
            concat_channels(volume.view(), aux.view())
        }
        None => Ok(volume),
    }
}

/// 一个批次.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// 输入批次, 轴顺序 `(N, X, Y, Z, C)`.
    pub inputs: BatchArray,

    /// 与输入逐样本对应的标签批次.
    pub labels: Option<BatchArray>,
}

impl Batch {
    /// 批次中的样本数.
    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len_of(Axis(0))
    }

    /// 是否为空批次. 正常组装出的批次永远非空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 输入通道数.
    #[inline]
    pub fn channels(&self) -> usize {
        self.inputs.len_of(Axis(4))
    }
}

/// 种子通道的来源.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SeedMode {
    /// 不附加种子通道.
    #[default]
    None,

    /// 使用每样本的种子文件.
    Files,

    /// 从标签中随机选取一个非空切片.
    LabelSlice,

    /// 以整个标签作为种子.
    LabelVolume,
}

impl SeedMode {
    /// 是否附加种子通道.
    #[inline]
    pub fn is_seeded(self) -> bool {
        self != SeedMode::None
    }

    /// 种子是否由标签推导.
    #[inline]
    pub fn derives_from_label(self) -> bool {
        matches!(self, SeedMode::LabelSlice | SeedMode::LabelVolume)
    }

    /// 检查种子来源与已有输入是否相容.
    ///
    /// - 由标签推导种子时必须有标签, 且不能同时给出种子文件;
    /// - [`SeedMode::Files`] 必须给出种子文件;
    /// - [`SeedMode::None`] 不能给出种子文件.
    pub fn validate(self, has_labels: bool, has_seed_files: bool) -> Result<()> {
        match self {
            SeedMode::LabelSlice | SeedMode::LabelVolume if has_seed_files => Err(
                PipelineError::config("seed files cannot be combined with label-derived seeds"),
            ),
            SeedMode::LabelSlice | SeedMode::LabelVolume if !has_labels => Err(
                PipelineError::config("no labels to derive seeds from"),
            ),
            SeedMode::Files if !has_seed_files => {
                Err(PipelineError::config("seed mode `Files` requires seed files"))
            }
            SeedMode::None if has_seed_files => Err(PipelineError::config(
                "seed files were given but the seed mode is `None`",
            )),
            _ => Ok(()),
        }
    }
}

/// 追加到每个样本的共享体数据 (例如参考扫描及其标签).
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SharedVolume {
    /// 文件路径.
    pub path: PathBuf,

    /// 预处理步骤.
    pub steps: Vec<Step>,
}

impl SharedVolume {
    /// 强度图像: 归一化后裁剪.
    pub fn intensity(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            steps: Step::INTENSITY.to_vec(),
        }
    }

    /// 掩膜: 只裁剪.
    pub fn mask(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            steps: Step::MASK.to_vec(),
        }
    }
}

/// 批次组装器.
///
/// 持有种子来源和预处理好的共享拼接体数据. 随机源 (切片种子选取) 由调用者传入.
#[derive(Clone, Debug)]
pub struct BatchAssembler {
    seed_mode: SeedMode,
    shared: Option<Volume>,
}

impl BatchAssembler {
    /// 构造组装器. 种子来源与已有输入不相容时返回配置错误.
    pub fn new(seed_mode: SeedMode, has_labels: bool, has_seed_files: bool) -> Result<Self> {
        seed_mode.validate(has_labels, has_seed_files)?;
        Ok(Self {
            seed_mode,
            shared: None,
        })
    }

    /// 预处理并按顺序拼接共享体数据. `shared` 为空时不做任何事.
    pub fn with_shared<R: VolumeReader + ?Sized>(
        mut self,
        preprocessor: &Preprocessor,
        reader: &R,
        shared: &[SharedVolume],
    ) -> Result<Self> {
        let mut acc: Option<Volume> = None;
        for s in shared {
            let v = preprocessor.preprocess(reader, &s.path, &s.steps)?;
            acc = Some(match acc {
                Some(a) => concat_channels(a.view(), v.view())?,
                None => v,
            });
        }
        self.shared = acc;
        Ok(self)
    }

    /// 种子来源.
    #[inline]
    pub fn seed_mode(&self) -> SeedMode {
        self.seed_mode
    }

    /// 共享拼接体数据的通道数.
    pub fn shared_channels(&self) -> usize {
        self.shared.as_ref().map_or(0, crate::data::channels)
    }

    /// 组装单个样本: 依次拼接共享体数据与种子通道. 返回 `(输入, 标签)`.
    ///
    /// 样本的输入应当已包含每样本辅助通道.
    pub fn assemble_sample<R: Rng + ?Sized>(
        &self,
        sample: SamplePair,
        rng: &mut R,
    ) -> Result<(Volume, Option<Volume>)> {
        let SamplePair {
            mut input,
            label,
            seed: seed_file,
        } = sample;

        if let Some(shared) = &self.shared {
            input = concat_channels(input.view(), shared.view())?;
        }

        let seed = match self.seed_mode {
            SeedMode::None => None,
            SeedMode::Files => Some(
                seed_file.ok_or_else(|| PipelineError::config("missing seed volume for sample"))?,
            ),
            SeedMode::LabelSlice | SeedMode::LabelVolume => {
                let label = label
                    .as_ref()
                    .ok_or_else(|| PipelineError::config("no labels to derive seeds from"))?;
                Some(if self.seed_mode == SeedMode::LabelSlice {
                    seed::slice_seed(label.view(), rng)?
                } else {
                    seed::volume_seed(label.view())
                })
            }
        };
        if let Some(seed) = seed {
            input = concat_channels(input.view(), seed.view())?;
        }
        Ok((input, label))
    }

    /// 组装整个批次.
    ///
    /// 任一样本出错则整个批次失败. `include_labels` 为真且每个样本都带标签时,
    /// 返回标签批次.
    pub fn assemble<R: Rng + ?Sized>(
        &self,
        samples: Vec<SamplePair>,
        include_labels: bool,
        rng: &mut R,
    ) -> Result<Batch> {
        let mut inputs = Vec::with_capacity(samples.len());
        let mut labels = Vec::with_capacity(samples.len());
        for sample in samples {
            let (input, label) = self.assemble_sample(sample, rng)?;
            inputs.push(input);
            labels.push(label);
        }

        let labels = if include_labels {
            labels
                .into_iter()
                .collect::<Option<Vec<_>>>()
                .map(|l| stack_volumes(&l))
                .transpose()?
        } else {
            None
        };
        Ok(Batch {
            inputs: stack_volumes(&inputs)?,
            labels,
        })
    }
}
