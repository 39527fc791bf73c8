//! 训练 / 验证 / 推理流程的端到端测试.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

use log::LevelFilter;
use ndarray::Axis;
use simple_logger::SimpleLogger;
use vol_berry::prelude::*;
use vol_berry::{inference, Shape3};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        SimpleLogger::new()
            .with_level(LevelFilter::Debug)
            .init()
            .unwrap();
    });
}

#[derive(Debug, Default)]
struct MemReader {
    volumes: HashMap<PathBuf, Volume>,
}

impl MemReader {
    fn insert(&mut self, path: impl Into<PathBuf>, volume: Volume) {
        self.volumes.insert(path.into(), volume);
    }
}

impl VolumeReader for MemReader {
    fn read(&self, path: &Path) -> vol_berry::Result<Volume> {
        self.volumes.get(path).cloned().ok_or_else(|| {
            PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                path.display().to_string(),
            ))
        })
    }
}

/// 以 `(70, 70, 70)` 的原始扫描和位于中心区域的方块标签构造数据集.
fn fixture(n: usize) -> (MemReader, Dataset) {
    const RAW: Shape3 = (70, 70, 70);
    let mut reader = MemReader::default();
    let mut inputs = Vec::new();
    let mut labels = Vec::new();
    for i in 0..n {
        let scan = Volume::from_shape_fn((RAW.0, RAW.1, RAW.2, 1), |(x, y, z, _)| {
            ((x + y + z + i) % 256) as f32
        });
        let label = Volume::from_shape_fn((RAW.0, RAW.1, RAW.2, 1), |(x, y, z, _)| {
            if (25..45).contains(&x) && (25..45).contains(&y) && (30..40).contains(&z) {
                1.0
            } else {
                0.0
            }
        });
        let (input, label_path) = (format!("raw/s{i}.nii"), format!("labels/s{i}.nii"));
        reader.insert(&input, scan);
        reader.insert(&label_path, label);
        inputs.push(input);
        labels.push(label_path);
    }
    let dataset = Dataset::pair_by_substitution(&labels, "labels", "raw", None).unwrap();
    assert_eq!(dataset.inputs(), inputs.iter().map(PathBuf::from).collect::<Vec<_>>());
    (reader, dataset)
}

fn config() -> PipelineConfig {
    PipelineConfig::new(TargetShape::new(64, 64, 64).unwrap(), 255.0).unwrap()
}

#[test]
fn test_training_pass() {
    init_logger();
    let (reader, dataset) = fixture(3);
    let preprocessor = Preprocessor::new(config());
    let transformer = GeometricTransformer::new(AugmentConfig::default()).unwrap();

    let mut it = VolumeIterator::new(
        &preprocessor,
        &reader,
        &dataset,
        Augmentation::Random(transformer),
        IteratorConfig {
            batch_size: 2,
            seed: Some(2024),
            ..IteratorConfig::default()
        },
    )
    .unwrap();
    assert_eq!(it.len(), 2);

    let batches: Vec<Batch> = it.by_ref().map(|b| b.unwrap()).collect();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].inputs.dim(), (2, 64, 64, 64, 1));
    assert_eq!(batches[1].inputs.dim(), (1, 64, 64, 64, 1));
    let labels = batches[0].labels.as_ref().unwrap();
    assert_eq!(labels.dim(), (2, 64, 64, 64, 1));
    assert!(labels.iter().all(|&v| v == 0.0 || v == 1.0));
    // 强度已归一化.
    assert!(batches[0]
        .inputs
        .iter()
        .all(|&v| (-1e-6..=1.0 + 1e-6).contains(&v)));

    let weights = compute_weights(it.labels().unwrap());
    assert_eq!(weights.len(), 2);
    assert!(weights.get(1).unwrap() > weights.get(0).unwrap());

    // 固定步数跨越多轮.
    assert_eq!(it.steps(5).filter(|b| b.is_ok()).count(), 5);
}

#[test]
fn test_slice_seeding_channels() {
    init_logger();
    let (reader, dataset) = fixture(2);
    let preprocessor = Preprocessor::new(config());
    let transformer = GeometricTransformer::new(AugmentConfig::default()).unwrap();

    let mut it = VolumeIterator::new(
        &preprocessor,
        &reader,
        &dataset,
        Augmentation::Random(transformer),
        IteratorConfig {
            batch_size: 2,
            seed: Some(7),
            seed_mode: SeedMode::LabelSlice,
            ..IteratorConfig::default()
        },
    )
    .unwrap();
    let batch = it.get_batch(0).unwrap();
    assert_eq!(batch.channels(), config().model_input_channels(true, 0));

    for sample in batch.inputs.outer_iter() {
        let seed = sample.index_axis(Axis(3), 1);
        let slices: Vec<usize> = seed
            .axis_iter(Axis(0))
            .enumerate()
            .filter(|(_, s)| s.iter().any(|&v| v != 0.0))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(slices.len(), 1);
    }
}

#[test]
fn test_seed_files_with_slice_seeding_is_rejected() {
    init_logger();
    let (reader, dataset) = fixture(2);
    let dataset = dataset.with_seeds(["seed/s0.nii", "seed/s1.nii"]).unwrap();
    let preprocessor = Preprocessor::new(config());

    let err = VolumeIterator::new(
        &preprocessor,
        &reader,
        &dataset,
        Augmentation::Identity,
        IteratorConfig {
            seed_mode: SeedMode::LabelSlice,
            ..IteratorConfig::default()
        },
    )
    .unwrap_err();
    assert!(err.is_configuration());

    let err = VolumeGenerator::new(
        preprocessor,
        &reader,
        dataset,
        GeneratorConfig {
            seed_mode: SeedMode::LabelSlice,
            ..GeneratorConfig::default()
        },
    )
    .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_validation_and_inference() {
    init_logger();
    let (reader, dataset) = fixture(3);
    let preprocessor = Preprocessor::new(config());

    let mut val = VolumeGenerator::new(
        preprocessor,
        &reader,
        dataset.clone(),
        GeneratorConfig {
            batch_size: 2,
            load_files: true,
            ..GeneratorConfig::default()
        },
    )
    .unwrap();
    let sizes: Vec<usize> = val.by_ref().map(|b| b.unwrap().len()).collect();
    assert_eq!(sizes, vec![2, 1]);

    let mut pred = VolumeGenerator::new(
        preprocessor,
        &reader,
        dataset,
        GeneratorConfig {
            batch_size: 2,
            include_labels: false,
            ..GeneratorConfig::default()
        },
    )
    .unwrap();
    for index in 0..pred.len() {
        let batch = pred.get_batch(index).unwrap();
        assert!(batch.labels.is_none());
        // 以输入强度通道代替网络输出.
        let outputs = batch.inputs.map(|&v| if v > 0.5 { 1.0 } else { 0.0 });
        let sources = pred.batch_files(index).unwrap();
        let restored =
            inference::restore_batch(&preprocessor, &reader, outputs.view(), sources).unwrap();
        for v in &restored {
            assert_eq!(v.dim(), (70, 70, 70, 1));
            assert_eq!(v[[0, 0, 0, 0]], 0.0);
        }
    }
    assert!(matches!(
        pred.get_batch(2),
        Err(PipelineError::Index { index: 2, len: 2 })
    ));
}
