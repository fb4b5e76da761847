//! Run configuration.
//!
//! Defaults reproduce the reference distillation run: CIFAR-10 under
//! `data/`, Adam at 0.05 with cosine annealing over 400 epochs, batches of
//! 128, a checkpoint every 40 epochs. A TOML file may override any field;
//! command-line flags are applied on top of that in `main`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::training::scheduler::ScheduleKind;
use crate::utils::error::{DistillError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillConfig {
    pub paths: PathsConfig,
    pub training: TrainingParams,
    pub data: DataConfig,
    /// Physical GPU exposed to the process through `CUDA_VISIBLE_DEVICES`
    pub gpu: usize,
    /// Write the timestamped `.log` / `.csv` run files
    pub log: bool,
    /// Random seed for shuffling, augmentation and weight init
    pub seed: u64,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            training: TrainingParams::default(),
            data: DataConfig::default(),
            gpu: 2,
            log: false,
            seed: 42,
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the CIFAR-10 binary batches
    pub data_dir: PathBuf,
    /// Teacher record (without the `.mpk` extension)
    pub teacher: PathBuf,
    /// Output directory for student checkpoints
    pub save_dir: PathBuf,
    /// Where the run log files are created
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/"),
            teacher: PathBuf::from("models_finetune/addernet_best"),
            save_dir: PathBuf::from("models_black_box_training/"),
            log_dir: PathBuf::from("."),
        }
    }
}

/// Optimization hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub epochs: usize,
    pub learning_rate: f64,
    pub schedule: ScheduleKind,
    /// Periodic snapshot interval in epochs
    pub checkpoint_every: usize,
    /// Training batches between run-log loss lines
    pub log_every: usize,
    /// Show the per-epoch progress bar
    pub progress: bool,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: 400,
            learning_rate: 0.05,
            schedule: ScheduleKind::default(),
            checkpoint_every: 40,
            log_every: 30,
            progress: true,
        }
    }
}

/// Data pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub batch_size: usize,
    pub test_batch_size: usize,
    /// Worker threads transforming training samples (0 = inline)
    pub num_workers: usize,
    /// Zero padding before the random crop
    pub crop_padding: u32,
    pub flip_probability: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            test_batch_size: 128,
            num_workers: 8,
            crop_padding: 4,
            flip_probability: 0.5,
        }
    }
}

impl DistillConfig {
    /// Read a TOML file; missing fields take their defaults
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DistillError::PathNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(DistillError::Config(msg.to_string()));

        if self.training.epochs == 0 {
            return fail("epochs must be greater than 0");
        }
        if !(self.training.learning_rate > 0.0 && self.training.learning_rate.is_finite()) {
            return fail("learning_rate must be a positive finite number");
        }
        if self.training.log_every == 0 {
            return fail("log_every must be greater than 0");
        }
        if self.data.batch_size == 0 || self.data.test_batch_size == 0 {
            return fail("batch sizes must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.data.flip_probability) {
            return fail("flip_probability must be in [0.0, 1.0]");
        }
        if let ScheduleKind::Step { step_size: 0, .. } = self.training.schedule {
            return fail("step schedule needs step_size > 0");
        }
        Ok(())
    }
}
