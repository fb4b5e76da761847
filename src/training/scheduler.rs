//! Learning Rate Scheduler Module
//!
//! Epoch-level schedules. The rate is a closed-form function of the number of
//! completed epochs; [`EpochSchedule`] tracks that count and is advanced once
//! after every training epoch.

use serde::{Deserialize, Serialize};

/// Shape of the schedule, as selected in the run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Fixed rate for the whole run
    Constant,

    /// Multiply by `gamma` every `step_size` epochs
    Step { step_size: usize, gamma: f64 },

    /// Cosine annealing from the base rate to `min_lr` over `t_max` epochs.
    /// `t_max = None` anneals over the whole run.
    Cosine {
        #[serde(default)]
        t_max: Option<usize>,
        #[serde(default)]
        min_lr: f64,
    },
}

impl Default for ScheduleKind {
    fn default() -> Self {
        ScheduleKind::Cosine {
            t_max: None,
            min_lr: 0.0,
        }
    }
}

/// Learning rate scheduler with a concrete base rate and horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LRScheduler {
    Constant {
        lr: f64,
    },

    StepDecay {
        initial_lr: f64,
        step_size: usize,
        gamma: f64,
    },

    CosineAnnealing {
        initial_lr: f64,
        min_lr: f64,
        t_max: usize,
    },
}

impl LRScheduler {
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    pub fn step_decay(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self::StepDecay {
            initial_lr,
            step_size,
            gamma,
        }
    }

    pub fn cosine_annealing(initial_lr: f64, min_lr: f64, t_max: usize) -> Self {
        Self::CosineAnnealing {
            initial_lr,
            min_lr,
            t_max,
        }
    }

    /// Build from the configured kind for a run of `total_epochs`
    pub fn from_kind(kind: &ScheduleKind, base_lr: f64, total_epochs: usize) -> Self {
        match kind {
            ScheduleKind::Constant => Self::constant(base_lr),
            ScheduleKind::Step { step_size, gamma } => {
                Self::step_decay(base_lr, *step_size, *gamma)
            }
            ScheduleKind::Cosine { t_max, min_lr } => {
                Self::cosine_annealing(base_lr, *min_lr, t_max.unwrap_or(total_epochs))
            }
        }
    }

    /// Learning rate after `completed` epochs
    pub fn get_lr(&self, completed: usize) -> f64 {
        match self {
            Self::Constant { lr } => *lr,

            Self::StepDecay {
                initial_lr,
                step_size,
                gamma,
            } => {
                if *step_size == 0 {
                    return *initial_lr;
                }
                initial_lr * gamma.powi((completed / step_size) as i32)
            }

            Self::CosineAnnealing {
                initial_lr,
                min_lr,
                t_max,
            } => {
                if *t_max == 0 {
                    return *min_lr;
                }
                let progress = (completed.min(*t_max) as f64) / (*t_max as f64);
                let cosine_factor = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                min_lr + (initial_lr - min_lr) * cosine_factor
            }
        }
    }
}

/// Scheduler plus the number of epochs it has been stepped
#[derive(Debug, Clone)]
pub struct EpochSchedule {
    scheduler: LRScheduler,
    completed: usize,
}

impl EpochSchedule {
    pub fn new(scheduler: LRScheduler) -> Self {
        Self {
            scheduler,
            completed: 0,
        }
    }

    /// Rate for the epoch currently in progress
    pub fn current_lr(&self) -> f64 {
        self.scheduler.get_lr(self.completed)
    }

    /// Mark one epoch as finished and return the next rate
    pub fn step(&mut self) -> f64 {
        self.completed += 1;
        self.current_lr()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }
}
