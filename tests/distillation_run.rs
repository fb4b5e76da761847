//! End-to-end runs of the distillation loop on tiny synthetic data

use std::sync::Arc;

use blackbox_distill::model::RECORD_EXTENSION;
use blackbox_distill::training::checkpoint::{CheckpointKind, CheckpointManager, CheckpointMetadata};
use blackbox_distill::training::{DistillSettings, Distiller, EpochSchedule, LRScheduler, RunSummary};
use blackbox_distill::utils::run_log::RunLog;
use blackbox_distill::{Classifier, ImageDataset, ImageLoader, LabeledImage};
use burn::backend::Autodiff;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::optim::AdamConfig;
use burn::prelude::*;
use burn_ndarray::NdArray;
use tempfile::TempDir;

type Inner = NdArray<f32>;
type TestBackend = Autodiff<Inner>;

const SIDE: usize = 2;
const INPUTS: usize = 3 * SIDE * SIDE;

#[derive(Module, Debug)]
struct TinyStudent<B: Backend> {
    fc: Linear<B>,
}

impl<B: Backend> Classifier<B> for TinyStudent<B> {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [n, c, h, w] = images.dims();
        self.fc.forward(images.reshape([n, c * h * w]))
    }
}

/// Predicts class 1 for images brighter than the dataset mean
struct BrightnessTeacher;

impl<B: Backend> Classifier<B> for BrightnessTeacher {
    fn logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [n, c, h, w] = images.dims();
        let mean = images.reshape([n, c * h * w]).mean_dim(1);
        Tensor::cat(vec![mean.clone().neg(), mean], 1)
    }
}

fn dataset(labels: &[usize]) -> Arc<ImageDataset> {
    let items = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| LabeledImage {
            pixels: vec![if label == 0 { (i * 7) as u8 } else { 240 - (i * 5) as u8 }; INPUTS],
            label,
        })
        .collect();
    Arc::new(ImageDataset::new(items, SIDE, SIDE))
}

fn run(epochs: usize, every: usize, dir: &TempDir, with_log: bool) -> RunSummary {
    let device = Default::default();
    let labels = [0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 1, 0];

    let train = ImageLoader::<TestBackend>::new(dataset(&labels), 4, Default::default()).shuffled(3);
    let test = ImageLoader::<Inner>::new(dataset(&labels), 5, Default::default());

    let student = TinyStudent {
        fc: LinearConfig::new(INPUTS, 2)
            .with_initializer(Initializer::Zeros)
            .init(&device),
    };
    let mut distiller = Distiller::new(
        student,
        BrightnessTeacher,
        AdamConfig::new().init(),
        EpochSchedule::new(LRScheduler::cosine_annealing(0.05, 0.0, epochs)),
        DistillSettings {
            epochs,
            log_every: 2,
            show_progress: false,
        },
        &device,
    );
    if with_log {
        let log = RunLog::create_with_timestamp(dir.path().join("logs"), "test").unwrap();
        distiller = distiller.with_run_log(log);
    }

    let checkpoints = CheckpointManager::new(dir.path().join("ckpt"), every).unwrap();
    distiller.run(&train, &test, &checkpoints).unwrap()
}

#[test]
fn metrics_stay_in_unit_interval() {
    let dir = TempDir::new().unwrap();
    let summary = run(4, 40, &dir, false);

    assert_eq!(summary.epochs, 4);
    assert_eq!(summary.history.len(), 4);
    for record in &summary.history {
        assert!((0.0..=1.0).contains(&record.accuracy));
        assert!((0.0..=1.0).contains(&record.fidelity));
        // teacher labels equal the true labels on this data
        assert_eq!(record.accuracy, record.fidelity);
    }
}

#[test]
fn best_checkpoint_follows_strict_improvements() {
    let dir = TempDir::new().unwrap();
    let summary = run(5, 40, &dir, false);

    let mut best = 0.0;
    let mut expected = Vec::new();
    for record in &summary.history {
        if record.fidelity > best {
            best = record.fidelity;
            expected.push(record.epoch);
        }
    }
    assert_eq!(summary.improvements, expected);
    assert_eq!(summary.best_fidelity, best);

    let manager = CheckpointManager::new(dir.path().join("ckpt"), 40).unwrap();
    let best_path = manager.best_path();
    if let Some(&last) = expected.last() {
        assert!(best_path.with_extension(RECORD_EXTENSION).exists());
        let meta = CheckpointMetadata::load(&CheckpointManager::metadata_path(&best_path)).unwrap();
        assert_eq!(meta.kind, CheckpointKind::Best);
        assert_eq!(meta.epoch, last);
        assert_eq!(meta.fidelity, best);
    } else {
        assert!(!best_path.with_extension(RECORD_EXTENSION).exists());
    }
}

#[test]
fn periodic_snapshots_on_interval_and_final_epoch() {
    let dir = TempDir::new().unwrap();
    run(5, 2, &dir, false);

    let ckpt = dir.path().join("ckpt");
    for epoch in 1..=5 {
        let exists = ckpt.join(format!("addernet_{epoch}.mpk")).exists();
        assert_eq!(exists, epoch == 2 || epoch == 4 || epoch == 5, "epoch {epoch}");
    }
    assert!(ckpt.join("run_summary.json").exists());
}

#[test]
fn run_log_has_one_csv_row_per_epoch() {
    let dir = TempDir::new().unwrap();
    let summary = run(3, 40, &dir, true);

    let logs = dir.path().join("logs");
    let csv = std::fs::read_to_string(logs.join("training_test.csv")).unwrap();
    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows.len(), 3);
    for (row, record) in rows.iter().zip(&summary.history) {
        let fields: Vec<f64> = row.split(',').map(|f| f.parse().unwrap()).collect();
        assert_eq!(fields.len(), 4);
        assert!((fields[0] - record.train_loss).abs() < 1e-6);
        assert!((fields[3] - record.fidelity).abs() < 1e-6);
    }

    let text = std::fs::read_to_string(logs.join("training_test.log")).unwrap();
    // 12 samples in batches of 4: lines at batch 2 and at the final batch 3
    assert!(text.contains("[1 | 2] Loss: "));
    assert!(text.contains("[1 | 3] Loss: "));
    assert!(!text.contains("[1 | 1] Loss: "));
    assert_eq!(text.matches("Train - Epoch ").count(), 3);
    assert_eq!(text.matches("Test Avg. Loss: ").count(), 3);
    assert_eq!(text.matches("Best Accuracy: ").count(), 3);
}

#[test]
fn same_seed_same_history() {
    let a = run(2, 40, &TempDir::new().unwrap(), false);
    let b = run(2, 40, &TempDir::new().unwrap(), false);
    for (x, y) in a.history.iter().zip(&b.history) {
        assert!((x.train_loss - y.train_loss).abs() < 1e-9);
        assert_eq!(x.fidelity, y.fidelity);
    }
}
