//! Black-box distillation CLI
//!
//! Trains a ResNet-20 student on CIFAR-10 against the labels predicted by a
//! frozen teacher, checkpointing the student with the best teacher agreement.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

use blackbox_distill::backend::{backend_name, default_device, select_gpu, visible_gpus, TrainingBackend};
use blackbox_distill::utils::logging::{init_logging, LogConfig};
use blackbox_distill::{run_distillation, DistillConfig};

/// Distill a CIFAR-10 classifier into a ResNet-20 using only its predictions
#[derive(Parser, Debug)]
#[command(name = "blackbox_distill")]
#[command(version = "0.1.0")]
#[command(about = "Black-box knowledge distillation with Burn", long_about = None)]
struct Cli {
    /// Directory holding the CIFAR-10 binary batches
    #[arg(long = "data")]
    data: Option<PathBuf>,

    /// Teacher record to distill from
    #[arg(long = "load_dir")]
    load_dir: Option<PathBuf>,

    /// Output directory for student checkpoints
    #[arg(long = "save_dir")]
    save_dir: Option<PathBuf>,

    /// Write timestamped .log/.csv run files
    #[arg(long, default_value = "false")]
    log: bool,

    /// Physical GPU index to expose to the process
    #[arg(long)]
    gpu: Option<usize>,

    /// TOML run configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    epochs: Option<usize>,

    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Base learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Loader worker threads for the training set
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Directory for the run log files
    #[arg(long = "log-dir")]
    log_dir: Option<PathBuf>,

    /// Hide the per-epoch progress bar
    #[arg(long, default_value = "false")]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<DistillConfig> {
        let mut config = match &self.config {
            Some(path) => DistillConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => DistillConfig::default(),
        };

        if let Some(data) = self.data {
            config.paths.data_dir = data;
        }
        if let Some(teacher) = self.load_dir {
            config.paths.teacher = teacher;
        }
        if let Some(save_dir) = self.save_dir {
            config.paths.save_dir = save_dir;
        }
        if let Some(log_dir) = self.log_dir {
            config.paths.log_dir = log_dir;
        }
        if self.log {
            config.log = true;
        }
        if let Some(gpu) = self.gpu {
            config.gpu = gpu;
        }
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(lr) = self.lr {
            config.training.learning_rate = lr;
        }
        if let Some(batch_size) = self.batch_size {
            config.data.batch_size = batch_size;
        }
        if let Some(workers) = self.workers {
            config.data.num_workers = workers;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.no_progress {
            config.training.progress = false;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    let config = cli.into_config()?;

    // The GPU mask has to be in place before the CUDA runtime starts.
    select_gpu(config.gpu);

    let log_config = if verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();
    info!("Backend: {}", backend_name());
    info!(
        "CUDA_VISIBLE_DEVICES={}",
        visible_gpus().unwrap_or_else(|| "<unset>".to_string())
    );
    info!("Data: {}", config.paths.data_dir.display());
    info!("Teacher: {}", config.paths.teacher.display());
    info!("Checkpoints: {}", config.paths.save_dir.display());

    let device = default_device();
    let summary = run_distillation::<TrainingBackend>(&config, &device)
        .context("Distillation run failed")?;

    println!();
    println!("{}", "Distillation complete".green().bold());
    println!(
        "  Best fidelity: {}",
        format!("{:.2}%", summary.best_fidelity * 100.0).cyan()
    );
    println!(
        "  Best accuracy: {}",
        format!("{:.2}%", summary.best_accuracy * 100.0).cyan()
    );
    if let Some(epoch) = summary.best_epoch {
        println!("  Best epoch:    {}", epoch);
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ======================================================
   Black-box distillation
   ResNet-20 student vs. frozen CIFAR-10 teacher (Burn)
 ======================================================
  "#
        .green()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_progress_flag_disables_bar() {
        let config = Cli::try_parse_from(["blackbox_distill", "--no-progress", "--epochs", "3"])
            .unwrap()
            .into_config()
            .unwrap();
        assert!(!config.training.progress);
        assert_eq!(config.training.epochs, 3);

        let config = Cli::try_parse_from(["blackbox_distill"])
            .unwrap()
            .into_config()
            .unwrap();
        assert!(config.training.progress);
    }
}
