//! # Black-box distillation
//!
//! Trains a ResNet-20 student to reproduce the predictions of a frozen
//! CIFAR-10 teacher using only the teacher's predicted labels. Built on the
//! Burn framework; runs on the CPU (NdArray) or CUDA.
//!
//! ## Modules
//!
//! - `dataset`: CIFAR-10 binary reader, crop/flip augmentation, batching
//! - `model`: the `Classifier` contract and the CIFAR ResNet
//! - `training`: distillation loop, checkpoints, learning-rate schedules
//! - `config`: TOML-backed run configuration
//! - `utils`: errors, logging, run files and metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use blackbox_distill::backend::{default_device, TrainingBackend};
//! use blackbox_distill::{run_distillation, DistillConfig};
//!
//! let config = DistillConfig::default();
//! let summary = run_distillation::<TrainingBackend>(&config, &default_device())?;
//! println!("best fidelity {:.4}", summary.best_fidelity);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

pub use config::DistillConfig;
pub use dataset::{BatchSource, ImageBatch, ImageDataset, ImageLoader, LabeledImage};
pub use model::{Classifier, ResNet, ResNetConfig};
pub use training::{run_distillation, Distiller, RunState, RunSummary};
pub use utils::error::{DistillError, Result};
pub use utils::metrics::{EpochRecord, EvalMetrics};

/// CIFAR-10 classes
pub const NUM_CLASSES: usize = dataset::cifar10::NUM_CLASSES;
