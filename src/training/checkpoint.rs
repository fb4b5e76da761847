//! Student checkpoints.
//!
//! Two kinds of snapshot are written to the save directory:
//! - `addernet_best`: overwritten whenever test fidelity improves
//! - `addernet_<epoch>`: every `every` epochs and at the last epoch
//!
//! Weights go through [`CompactRecorder`] (which appends `.mpk`); a JSON
//! metadata file with the same stem records the metrics at save time.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::training::RunSummary;
use crate::utils::error::{DistillError, Result};
use crate::utils::metrics::EpochRecord;

/// Stem shared by every student checkpoint file
pub const CHECKPOINT_PREFIX: &str = "addernet";
pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Best,
    Periodic,
}

/// Sidecar written next to every weight file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub kind: CheckpointKind,
    pub epoch: usize,
    pub fidelity: f64,
    pub accuracy: f64,
    pub test_loss: f64,
    pub train_loss: f64,
    pub learning_rate: f64,
    pub saved_at: DateTime<Utc>,
}

impl CheckpointMetadata {
    pub fn new(kind: CheckpointKind, record: &EpochRecord) -> Self {
        Self {
            kind,
            epoch: record.epoch,
            fidelity: record.fidelity,
            accuracy: record.accuracy,
            test_loss: record.test_loss,
            train_loss: record.train_loss,
            learning_rate: record.learning_rate,
            saved_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

pub struct CheckpointManager {
    dir: PathBuf,
    every: usize,
}

impl CheckpointManager {
    /// Use `dir` for all checkpoints, creating it if needed.
    ///
    /// `every = 0` disables periodic snapshots except at the final epoch.
    pub fn new(dir: impl Into<PathBuf>, every: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, every })
    }

    /// Weight path of the best student, without the recorder extension
    pub fn best_path(&self) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_PREFIX}_best"))
    }

    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_PREFIX}_{epoch}"))
    }

    pub fn metadata_path(weights: &Path) -> PathBuf {
        weights.with_extension("json")
    }

    /// Periodic snapshots land on multiples of `every` and on the final epoch
    pub fn is_snapshot_epoch(&self, epoch: usize, total_epochs: usize) -> bool {
        (self.every > 0 && epoch % self.every == 0) || epoch == total_epochs
    }

    pub fn save_best<B, M>(&self, model: &M, record: &EpochRecord) -> Result<PathBuf>
    where
        B: Backend,
        M: Module<B>,
    {
        let path = self.best_path();
        self.save(model, &path, CheckpointKind::Best, record)?;
        info!(
            "Saved best student (epoch {}, fidelity {:.4}) to {}",
            record.epoch,
            record.fidelity,
            path.display()
        );
        Ok(path)
    }

    pub fn save_epoch<B, M>(&self, model: &M, record: &EpochRecord) -> Result<PathBuf>
    where
        B: Backend,
        M: Module<B>,
    {
        let path = self.epoch_path(record.epoch);
        self.save(model, &path, CheckpointKind::Periodic, record)?;
        info!("Saved epoch {} snapshot to {}", record.epoch, path.display());
        Ok(path)
    }

    fn save<B, M>(&self, model: &M, path: &Path, kind: CheckpointKind, record: &EpochRecord) -> Result<()>
    where
        B: Backend,
        M: Module<B>,
    {
        model
            .clone()
            .save_file(path.to_path_buf(), &CompactRecorder::new())
            .map_err(|e| DistillError::Checkpoint(path.to_path_buf(), e.to_string()))?;

        let metadata = CheckpointMetadata::new(kind, record);
        let meta_path = Self::metadata_path(path);
        fs::write(&meta_path, serde_json::to_string_pretty(&metadata)?)
            .map_err(|e| DistillError::Checkpoint(meta_path.clone(), e.to_string()))?;
        debug!("Wrote {}", meta_path.display());
        Ok(())
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.dir.join(SUMMARY_FILE);
        fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        Ok(path)
    }
}
