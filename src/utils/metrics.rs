//! Metrics Module for Distillation Evaluation
//!
//! Per-epoch accumulators for the test pass:
//! - loss of student scores against teacher pseudo-labels
//! - accuracy (student prediction == true label)
//! - fidelity (student prediction == teacher prediction)

use serde::{Deserialize, Serialize};

use crate::utils::error::{DistillError, Result};

/// Finalized test metrics for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Average loss vs. pseudo-labels
    pub loss: f64,
    /// Fraction of samples whose prediction matches the true label
    pub accuracy: f64,
    /// Fraction of samples whose prediction matches the teacher
    pub fidelity: f64,
    pub samples: usize,
}

/// Running sums reset at the start of every evaluation pass.
///
/// Losses are batch means, so they are weighted by batch size before being
/// summed; everything is divided by the dataset size in [`finalize`].
///
/// [`finalize`]: RunningMetrics::finalize
#[derive(Debug, Clone, Default)]
pub struct RunningMetrics {
    loss_sum: f64,
    correct: usize,
    agree: usize,
}

impl RunningMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one batch worth of results
    pub fn update(&mut self, mean_loss: f64, batch_size: usize, correct: usize, agree: usize) {
        self.loss_sum += mean_loss * batch_size as f64;
        self.correct += correct;
        self.agree += agree;
    }

    /// Divide every accumulator by the dataset size
    pub fn finalize(&self, dataset_size: usize) -> Result<EvalMetrics> {
        if dataset_size == 0 {
            return Err(DistillError::Dataset(
                "cannot evaluate on an empty test set".to_string(),
            ));
        }
        let n = dataset_size as f64;
        Ok(EvalMetrics {
            loss: self.loss_sum / n,
            accuracy: self.correct as f64 / n,
            fidelity: self.agree as f64 / n,
            samples: dataset_size,
        })
    }
}

/// Everything recorded about one completed epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    /// Loss of the final training batch
    pub train_loss: f64,
    /// Mean loss over all training batches
    pub mean_train_loss: f64,
    pub test_loss: f64,
    pub accuracy: f64,
    pub fidelity: f64,
    /// Learning rate used for this epoch's steps
    pub learning_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_loss() {
        let mut m = RunningMetrics::new();
        m.update(1.0, 3, 3, 2);
        m.update(4.0, 1, 0, 1);

        let out = m.finalize(4).unwrap();
        assert!((out.loss - 7.0 / 4.0).abs() < 1e-12);
        assert!((out.accuracy - 0.75).abs() < 1e-12);
        assert!((out.fidelity - 0.75).abs() < 1e-12);
        assert_eq!(out.samples, 4);
    }

    #[test]
    fn test_divides_by_dataset_size() {
        let mut m = RunningMetrics::new();
        m.update(2.0, 5, 5, 5);
        let out = m.finalize(10).unwrap();
        assert!((out.accuracy - 0.5).abs() < 1e-12);
        assert!((out.loss - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_dataset_is_error() {
        let m = RunningMetrics::new();
        assert!(matches!(m.finalize(0), Err(DistillError::Dataset(_))));
    }
}
