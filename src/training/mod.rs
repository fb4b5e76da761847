//! Training module
//!
//! - [`distill`]: the per-epoch train/evaluate loop
//! - [`checkpoint`]: best and periodic student snapshots
//! - [`scheduler`]: epoch-level learning-rate schedules
//!
//! [`run_distillation`] wires these together with the CIFAR-10 pipeline and
//! the ResNet models for the command-line entry point.

pub mod checkpoint;
pub mod distill;
pub mod scheduler;

use std::sync::Arc;

use burn::optim::AdamConfig;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::DistillConfig;
use crate::dataset::cifar10::{self, Split, NUM_CLASSES};
use crate::dataset::{AugmentationConfig, ImageLoader};
use crate::model::{load_teacher, ResNet, ResNetConfig};
use crate::utils::error::Result;
use crate::utils::metrics::EpochRecord;
use crate::utils::run_log::RunLog;

pub use checkpoint::{CheckpointKind, CheckpointManager, CheckpointMetadata};
pub use distill::{DistillSettings, Distiller, TrainOutcome};
pub use scheduler::{EpochSchedule, LRScheduler, ScheduleKind};

/// Mutable bookkeeping for one run, owned by the [`Distiller`]
#[derive(Debug, Clone, Default)]
pub struct RunState {
    epoch: usize,
    best_fidelity: f64,
    best_accuracy: f64,
    best_epoch: Option<usize>,
    improvements: Vec<usize>,
    history: Vec<EpochRecord>,
}

impl RunState {
    /// Append a finished epoch.
    ///
    /// Returns `true` when its fidelity is strictly above every earlier
    /// epoch (and above zero), i.e. when the best checkpoint must be
    /// replaced.
    pub fn record(&mut self, record: EpochRecord) -> bool {
        self.epoch = record.epoch;
        self.best_accuracy = self.best_accuracy.max(record.accuracy);

        let improved = record.fidelity > self.best_fidelity;
        if improved {
            self.best_fidelity = record.fidelity;
            self.best_epoch = Some(record.epoch);
            self.improvements.push(record.epoch);
        }
        self.history.push(record);
        improved
    }

    /// Last completed epoch (0 before the first)
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn best_fidelity(&self) -> f64 {
        self.best_fidelity
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Epochs at which the best checkpoint was written
    pub fn improvements(&self) -> &[usize] {
        &self.improvements
    }

    pub fn history(&self) -> &[EpochRecord] {
        &self.history
    }

    pub fn summary(&self, elapsed_secs: f64) -> RunSummary {
        RunSummary {
            epochs: self.epoch,
            best_fidelity: self.best_fidelity,
            best_accuracy: self.best_accuracy,
            best_epoch: self.best_epoch,
            improvements: self.improvements.clone(),
            elapsed_secs,
            history: self.history.clone(),
        }
    }
}

/// Written to the save directory when a run completes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub epochs: usize,
    pub best_fidelity: f64,
    pub best_accuracy: f64,
    pub best_epoch: Option<usize>,
    pub improvements: Vec<usize>,
    pub elapsed_secs: f64,
    pub history: Vec<EpochRecord>,
}

/// Full CIFAR-10 distillation run: ResNet-20 student against a ResNet-20
/// teacher record.
pub fn run_distillation<B: AutodiffBackend>(
    config: &DistillConfig,
    device: &B::Device,
) -> Result<RunSummary> {
    config.validate()?;
    B::seed(config.seed);

    let train_set = Arc::new(cifar10::load_split(&config.paths.data_dir, Split::Train)?);
    let test_set = Arc::new(cifar10::load_split(&config.paths.data_dir, Split::Test)?);

    let train_loader = ImageLoader::<B>::new(train_set, config.data.batch_size, device.clone())
        .shuffled(config.seed)
        .with_augmentation(AugmentationConfig {
            crop_padding: config.data.crop_padding,
            horizontal_flip_prob: config.data.flip_probability,
        })
        .with_workers(config.data.num_workers)?;
    let test_loader =
        ImageLoader::<B::InnerBackend>::new(test_set, config.data.test_batch_size, device.clone());

    let teacher = load_teacher::<B::InnerBackend>(&config.paths.teacher, NUM_CLASSES, device)?;
    let student_config = ResNetConfig::new().with_num_classes(NUM_CLASSES);
    let student: ResNet<B> = student_config.init(device);
    info!(
        "Student: ResNet-{} with {} residual blocks",
        student_config.depth(),
        student.num_blocks()
    );

    let schedule = EpochSchedule::new(LRScheduler::from_kind(
        &config.training.schedule,
        config.training.learning_rate,
        config.training.epochs,
    ));
    let settings = DistillSettings {
        epochs: config.training.epochs,
        log_every: config.training.log_every,
        show_progress: config.training.progress,
    };
    let checkpoints =
        CheckpointManager::new(&config.paths.save_dir, config.training.checkpoint_every)?;

    let mut distiller = Distiller::new(
        student,
        teacher,
        AdamConfig::new().init(),
        schedule,
        settings,
        device,
    );
    if config.log {
        let run_log = RunLog::create(&config.paths.log_dir)?;
        info!(
            "Logging to {} and {}",
            run_log.log_path().display(),
            run_log.csv_path().display()
        );
        distiller = distiller.with_run_log(run_log);
    }

    distiller.run(&train_loader, &test_loader, &checkpoints)
}
