//! 数据集文件列表.
//!
//! [`Dataset`] 是按位置对应的 `(输入, 标签?, 种子?, 辅助?)` 文件引用序列.
//! 各列表长度必须一致, 索引 `i` 处的标签永远对应索引 `i` 处的输入.

use std::env;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 获取数据目录.
///
/// 1. 若环境变量 `var` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/{rest..}`. 无法确定主目录时返回 `None`.
pub fn dir_from_env_or_home<P: AsRef<Path>, I: IntoIterator<Item = P>>(
    var: &str,
    rest: I,
) -> Option<PathBuf> {
    match env::var(var) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_dataset_dir_with(rest),
    }
}

/// 数据集中的一条记录.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Entry<'a> {
    /// 输入文件.
    pub input: &'a Path,

    /// 标签文件.
    pub label: Option<&'a Path>,

    /// 种子文件.
    pub seed: Option<&'a Path>,

    /// 每样本辅助文件.
    pub aux: Option<&'a Path>,
}

/// 按位置对应的文件列表.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Dataset {
    inputs: Vec<PathBuf>,
    labels: Option<Vec<PathBuf>>,
    seeds: Option<Vec<PathBuf>>,
    aux: Option<Vec<PathBuf>>,
}

/// 检查伴随列表与输入列表长度一致.
fn check_len(what: &str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(PipelineError::config(format!(
            "{what} list has {got} files but there are {expected} inputs"
        )))
    }
}

impl Dataset {
    /// 从输入文件列表创建数据集.
    pub fn new<P: Into<PathBuf>, I: IntoIterator<Item = P>>(inputs: I) -> Self {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// 附加标签文件列表. 长度与输入不一致时返回配置错误.
    pub fn with_labels<P: Into<PathBuf>, I: IntoIterator<Item = P>>(
        mut self,
        labels: I,
    ) -> Result<Self> {
        let labels: Vec<PathBuf> = labels.into_iter().map(Into::into).collect();
        check_len("label", self.inputs.len(), labels.len())?;
        self.labels = Some(labels);
        Ok(self)
    }

    /// 附加种子文件列表. 长度与输入不一致时返回配置错误.
    pub fn with_seeds<P: Into<PathBuf>, I: IntoIterator<Item = P>>(
        mut self,
        seeds: I,
    ) -> Result<Self> {
        let seeds: Vec<PathBuf> = seeds.into_iter().map(Into::into).collect();
        check_len("seed", self.inputs.len(), seeds.len())?;
        self.seeds = Some(seeds);
        Ok(self)
    }

    /// 附加每样本辅助文件列表. 长度与输入不一致时返回配置错误.
    pub fn with_aux<P: Into<PathBuf>, I: IntoIterator<Item = P>>(mut self, aux: I) -> Result<Self> {
        let aux: Vec<PathBuf> = aux.into_iter().map(Into::into).collect();
        check_len("auxiliary", self.inputs.len(), aux.len())?;
        self.aux = Some(aux);
        Ok(self)
    }

    /// 从标签文件列表推导输入文件: 将每个标签路径中的 `label_dir` 前缀替换为
    /// `input_dir`, 若给出 `label_tag`, 再从文件名中删去它第一次出现的位置.
    ///
    /// 例如 `labels/s1/s1_2_brain.nii.gz` 在 `label_tag = Some("_brain")` 时
    /// 对应 `raw/s1/s1_2.nii.gz`. 任一标签不在 `label_dir` 下时返回配置错误.
    pub fn pair_by_substitution<P: AsRef<Path>, I: IntoIterator<Item = P>>(
        labels: I,
        label_dir: impl AsRef<Path>,
        input_dir: impl AsRef<Path>,
        label_tag: Option<&str>,
    ) -> Result<Self> {
        let (label_dir, input_dir) = (label_dir.as_ref(), input_dir.as_ref());
        let mut inputs = Vec::new();
        let mut label_files = Vec::new();
        for label in labels {
            let label = label.as_ref();
            let rest = label.strip_prefix(label_dir).map_err(|_| {
                PipelineError::config(format!(
                    "label {} is not under {}",
                    label.display(),
                    label_dir.display()
                ))
            })?;
            let mut input = input_dir.join(rest);
            let name = rest.file_name().and_then(|n| n.to_str());
            if let (Some(tag), Some(name)) = (label_tag, name) {
                input.set_file_name(name.replacen(tag, "", 1));
            }
            inputs.push(input);
            label_files.push(label.to_owned());
        }
        Self::new(inputs).with_labels(label_files)
    }

    /// 样本个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// 是否没有样本.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// 输入文件列表.
    #[inline]
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// 标签文件列表.
    #[inline]
    pub fn labels(&self) -> Option<&[PathBuf]> {
        self.labels.as_deref()
    }

    /// 种子文件列表.
    #[inline]
    pub fn seeds(&self) -> Option<&[PathBuf]> {
        self.seeds.as_deref()
    }

    /// 每样本辅助文件列表.
    #[inline]
    pub fn aux(&self) -> Option<&[PathBuf]> {
        self.aux.as_deref()
    }

    /// 是否带标签.
    #[inline]
    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    /// 是否带种子文件.
    #[inline]
    pub fn has_seeds(&self) -> bool {
        self.seeds.is_some()
    }

    /// 获取第 `index` 条记录. 越界时返回 `None`.
    pub fn entry(&self, index: usize) -> Option<Entry<'_>> {
        Some(Entry {
            input: self.inputs.get(index)?.as_path(),
            label: self.labels.as_ref().map(|l| l[index].as_path()),
            seed: self.seeds.as_ref().map(|l| l[index].as_path()),
            aux: self.aux.as_ref().map(|l| l[index].as_path()),
        })
    }

    /// 按升序迭代 `range` 内的记录. `range` 超出数据集的部分被忽略.
    pub fn entries(&self, range: Range<usize>) -> impl ExactSizeIterator<Item = Entry<'_>> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        (start..end).map(move |i| Entry {
            input: self.inputs[i].as_path(),
            label: self.labels.as_ref().map(|l| l[i].as_path()),
            seed: self.seeds.as_ref().map(|l| l[i].as_path()),
            aux: self.aux.as_ref().map(|l| l[i].as_path()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch() {
        let d = Dataset::new(["a.nii", "b.nii"]);
        assert!(d.clone().with_labels(["a_l.nii"]).unwrap_err().is_configuration());
        assert!(d.clone().with_seeds(["1", "2", "3"]).is_err());
        assert!(d.clone().with_aux(Vec::<PathBuf>::new()).is_err());
        assert!(d.with_labels(["a_l.nii", "b_l.nii"]).is_ok());
    }

    #[test]
    fn test_entries_position_correlated() {
        let d = Dataset::new(["a", "b", "c"])
            .with_labels(["la", "lb", "lc"])
            .unwrap();
        let e: Vec<_> = d.entries(1..10).collect();
        assert_eq!(e.len(), 2);
        assert_eq!(e[0].input, Path::new("b"));
        assert_eq!(e[0].label, Some(Path::new("lb")));
        assert_eq!(e[1].label, Some(Path::new("lc")));
        assert_eq!(e[1].seed, None);
        assert!(d.entry(3).is_none());
        assert_eq!(d.entries(5..9).len(), 0);
    }

    #[test]
    fn test_pair_by_substitution() {
        let d = Dataset::pair_by_substitution(
            ["data/labels/s1/a.nii.gz", "data/labels/s2/b.nii.gz"],
            "data/labels",
            "data/raw",
            None,
        )
        .unwrap();
        assert_eq!(d.inputs()[0], PathBuf::from("data/raw/s1/a.nii.gz"));
        assert_eq!(d.inputs()[1], PathBuf::from("data/raw/s2/b.nii.gz"));
        assert_eq!(d.labels().unwrap()[1], PathBuf::from("data/labels/s2/b.nii.gz"));

        let d = Dataset::pair_by_substitution(
            ["labels/s1/s1_2_brain.nii.gz"],
            "labels",
            "raw",
            Some("_brain"),
        )
        .unwrap();
        assert_eq!(d.inputs()[0], PathBuf::from("raw/s1/s1_2.nii.gz"));

        let err = Dataset::pair_by_substitution(["x/a.nii"], "data/labels", "data/raw", None);
        assert!(err.is_err());
    }

    #[test]
    fn test_entry() {
        let d = Dataset::new(["a", "b"])
            .with_labels(["la", "lb"])
            .unwrap()
            .with_aux(["xa", "xb"])
            .unwrap();
        let e = d.entry(1).unwrap();
        assert_eq!(e.input, Path::new("b"));
        assert_eq!(e.label, Some(Path::new("lb")));
        assert_eq!(e.aux, Some(Path::new("xb")));
        assert_eq!(e.seed, None);
        assert_eq!(d.entries(0..2).nth(1), Some(e));
        assert!(d.entry(2).is_none());
    }

    #[test]
    fn test_dir_from_env() {
        env::set_var("VOL_BERRY_TEST_DIR", "/tmp/vol-berry");
        assert_eq!(
            dir_from_env_or_home("VOL_BERRY_TEST_DIR", ["train"]),
            Some(PathBuf::from("/tmp/vol-berry"))
        );
    }
}
