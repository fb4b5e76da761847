//! Black-box distillation loop.
//!
//! The student is trained on the teacher's argmax labels only: the teacher
//! is queried as an opaque classifier on the non-autodiff backend, so no
//! gradient ever reaches it and its parameters never change. Each epoch is a
//! training pass followed by a test pass that reports
//! - loss of the student against teacher labels
//! - accuracy against the true labels
//! - fidelity (agreement with the teacher)

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::dataset::BatchSource;
use crate::model::Classifier;
use crate::training::checkpoint::CheckpointManager;
use crate::training::scheduler::EpochSchedule;
use crate::training::{RunState, RunSummary};
use crate::utils::error::{DistillError, Result};
use crate::utils::format_duration;
use crate::utils::metrics::{EpochRecord, EvalMetrics, RunningMetrics};
use crate::utils::run_log::RunLog;

/// Loop settings that are not optimizer hyperparameters
#[derive(Debug, Clone)]
pub struct DistillSettings {
    pub epochs: usize,
    /// Training batches between run-log loss lines
    pub log_every: usize,
    pub show_progress: bool,
}

impl Default for DistillSettings {
    fn default() -> Self {
        Self {
            epochs: 400,
            log_every: 30,
            show_progress: true,
        }
    }
}

/// Result of one training pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOutcome {
    /// Loss of the final batch; the value reported for the epoch
    pub last_loss: f64,
    pub mean_loss: f64,
    pub batches: usize,
    pub learning_rate: f64,
}

pub struct Distiller<B, S, T, O>
where
    B: AutodiffBackend,
    S: AutodiffModule<B> + Classifier<B>,
    S::InnerModule: Classifier<B::InnerBackend>,
    T: Classifier<B::InnerBackend>,
    O: Optimizer<S, B>,
{
    student: S,
    teacher: T,
    optimizer: O,
    schedule: EpochSchedule,
    train_loss: CrossEntropyLoss<B>,
    eval_loss: CrossEntropyLoss<B::InnerBackend>,
    settings: DistillSettings,
    state: RunState,
    run_log: Option<RunLog>,
}

impl<B, S, T, O> Distiller<B, S, T, O>
where
    B: AutodiffBackend,
    S: AutodiffModule<B> + Classifier<B>,
    S::InnerModule: Classifier<B::InnerBackend>,
    T: Classifier<B::InnerBackend>,
    O: Optimizer<S, B>,
{
    pub fn new(
        student: S,
        teacher: T,
        optimizer: O,
        schedule: EpochSchedule,
        settings: DistillSettings,
        device: &B::Device,
    ) -> Self {
        Self {
            student,
            teacher,
            optimizer,
            schedule,
            train_loss: CrossEntropyLossConfig::new().init(device),
            eval_loss: CrossEntropyLossConfig::new().init(device),
            settings,
            state: RunState::default(),
            run_log: None,
        }
    }

    /// Mirror progress into a run log file
    pub fn with_run_log(mut self, run_log: RunLog) -> Self {
        self.run_log = Some(run_log);
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn current_lr(&self) -> f64 {
        self.schedule.current_lr()
    }

    /// Teacher argmax labels, computed without gradient tracking
    fn pseudo_labels(&self, images: Tensor<B, 4>) -> Tensor<B, 1, Int> {
        Tensor::from_inner(self.teacher.predict(images.inner()))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar
    }

    /// One pass over the training batches.
    ///
    /// Every batch: teacher labels, student forward, cross-entropy against
    /// the teacher labels, backward, one optimizer step. The learning-rate
    /// schedule advances once, after the last batch.
    pub fn train_epoch<D>(&mut self, epoch: usize, data: &D) -> Result<TrainOutcome>
    where
        D: BatchSource<B> + ?Sized,
    {
        let lr = self.schedule.current_lr();
        let num_batches = data.num_batches();
        let log_every = self.settings.log_every.max(1);
        let progress = self.progress_bar(num_batches);

        let mut loss_sum = 0.0;
        let mut last_loss = None;
        let mut batches = 0usize;

        for (i, batch) in data.batches(epoch).enumerate() {
            let step = i + 1;

            let targets = self.pseudo_labels(batch.images.clone());
            let logits = self.student.logits(batch.images);
            let loss = self.train_loss.forward(logits, targets);
            let loss_value: f64 = loss.clone().into_scalar().elem();

            let grads = GradientsParams::from_grads(loss.backward(), &self.student);
            self.student = self.optimizer.step(lr, self.student.clone(), grads);

            loss_sum += loss_value;
            last_loss = Some(loss_value);
            batches = step;

            progress.inc(1);
            progress.set_message(format!(
                "Epoch: {}, Loss: {:.8}, lr: {:.6}",
                epoch,
                loss_sum / step as f64,
                lr
            ));

            if step % log_every == 0 || step == num_batches {
                debug!("[{} | {}] Loss: {:.6}", epoch, step, loss_value);
                if let Some(log) = self.run_log.as_mut() {
                    log.batch_loss(epoch, step, loss_value)?;
                }
            }
        }
        progress.finish_and_clear();

        let last_loss = last_loss.ok_or_else(|| {
            DistillError::Training(format!("epoch {epoch}: training data produced no batches"))
        })?;
        self.schedule.step();

        let outcome = TrainOutcome {
            last_loss,
            mean_loss: loss_sum / batches as f64,
            batches,
            learning_rate: lr,
        };

        info!(
            "Train - Epoch {}, Loss: {:.6} (mean {:.6}, lr {:.6})",
            epoch, outcome.last_loss, outcome.mean_loss, lr
        );
        if let Some(log) = self.run_log.as_mut() {
            log.train_summary(epoch, outcome.last_loss)?;
        }

        Ok(outcome)
    }

    /// One pass over the test batches with the student in inference mode.
    ///
    /// Only returns the metrics; [`run`](Self::run) passes them to
    /// [`RunState::record`], which owns the best-fidelity mark.
    pub fn evaluate<D>(&mut self, epoch: usize, data: &D) -> Result<EvalMetrics>
    where
        D: BatchSource<B::InnerBackend> + ?Sized,
    {
        let student = self.student.valid();
        let mut running = RunningMetrics::new();

        for batch in data.batches(epoch) {
            let batch_size = batch.len();

            let teacher_labels = self.teacher.predict(batch.images.clone());
            let logits = student.logits(batch.images);
            let loss: f64 = self
                .eval_loss
                .forward(logits.clone(), teacher_labels.clone())
                .into_scalar()
                .elem();

            let predictions = logits.argmax(1).squeeze::<1>(1);
            let correct: i64 = predictions
                .clone()
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem();
            let agree: i64 = predictions
                .equal(teacher_labels)
                .int()
                .sum()
                .into_scalar()
                .elem();

            running.update(loss, batch_size, correct as usize, agree as usize);
        }

        let metrics = running.finalize(data.num_items())?;
        info!(
            "Test Avg. Loss: {:.6}, Acc_correct: {:.6}, Acc_equal: {:.6}",
            metrics.loss, metrics.accuracy, metrics.fidelity
        );
        if let Some(log) = self.run_log.as_mut() {
            log.test_summary(metrics.loss, metrics.accuracy, metrics.fidelity)?;
        }

        Ok(metrics)
    }

    /// Train then evaluate for every remaining epoch, checkpointing as it goes.
    ///
    /// Checkpoint and log write failures abort the run.
    pub fn run<TD, VD>(
        &mut self,
        train: &TD,
        test: &VD,
        checkpoints: &CheckpointManager,
    ) -> Result<RunSummary>
    where
        TD: BatchSource<B> + ?Sized,
        VD: BatchSource<B::InnerBackend> + ?Sized,
    {
        let total = self.settings.epochs;
        let started = Instant::now();
        info!(
            "Distilling for {} epochs: {} training batches, {} test samples",
            total,
            train.num_batches(),
            test.num_items()
        );

        for epoch in (self.state.epoch() + 1)..=total {
            let outcome = self.train_epoch(epoch, train)?;
            let metrics = self.evaluate(epoch, test)?;

            let record = EpochRecord {
                epoch,
                train_loss: outcome.last_loss,
                mean_train_loss: outcome.mean_loss,
                test_loss: metrics.loss,
                accuracy: metrics.accuracy,
                fidelity: metrics.fidelity,
                learning_rate: outcome.learning_rate,
            };
            if let Some(log) = self.run_log.as_mut() {
                log.csv_row(record.train_loss, record.test_loss, record.accuracy, record.fidelity)?;
            }

            if self.state.record(record) {
                checkpoints.save_best(&self.student, &record)?;
            }
            if checkpoints.is_snapshot_epoch(epoch, total) {
                checkpoints.save_epoch(&self.student, &record)?;
            }

            info!("Best Accuracy: {:.6}", self.state.best_fidelity());
            if let Some(log) = self.run_log.as_mut() {
                log.best(self.state.best_fidelity())?;
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            "Finished {} epochs in {} | best fidelity {:.4} (epoch {:?}) | best accuracy {:.4}",
            self.state.epoch(),
            format_duration(elapsed),
            self.state.best_fidelity(),
            self.state.best_epoch(),
            self.state.best_accuracy()
        );

        let summary = self.state.summary(elapsed);
        checkpoints.write_summary(&summary)?;
        Ok(summary)
    }
}
