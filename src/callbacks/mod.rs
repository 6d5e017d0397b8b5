//! Callback system for training hooks.

mod checkpoint;
mod early_stopping;
mod model_saver;

pub use checkpoint::ModelCheckpoint;
pub use early_stopping::EarlyStopping;
pub use model_saver::ModelSaver;

use crate::{StepOutput, Trainer};
use candle::Result;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Min,
    Max,
}

/// Aggregated results of one epoch, handed to callbacks and schedulers.
#[derive(Clone, Debug, Default)]
pub struct EpochMetrics {
    pub train_loss: f32,
    pub val_loss: Option<f32>,
    /// Per-epoch means of the metrics reported from `training_step`.
    pub train_metrics: HashMap<String, f64>,
    /// Per-epoch means of the metrics reported from `validation_step`.
    pub val_metrics: HashMap<String, f64>,
}

impl EpochMetrics {
    /// Look up a monitored quantity by name. `"train_loss"` and `"val_loss"`
    /// resolve to the losses; any other name is searched in the validation
    /// metrics first, then the training metrics.
    pub fn monitored(&self, name: &str) -> Option<f32> {
        match name {
            "train_loss" => Some(self.train_loss),
            "val_loss" => self.val_loss,
            _ => self
                .val_metrics
                .get(name)
                .or_else(|| self.train_metrics.get(name))
                .map(|v| *v as f32),
        }
    }
}

pub trait Callback: Send {
    fn on_fit_start(&mut self, _trainer: &Trainer) -> Result<()> {
        Ok(())
    }

    fn on_fit_end(&mut self, _trainer: &Trainer) -> Result<()> {
        Ok(())
    }

    fn on_epoch_start(&mut self, _trainer: &Trainer, _epoch: usize) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(
        &mut self,
        _trainer: &Trainer,
        _epoch: usize,
        _metrics: &EpochMetrics,
    ) -> Result<()> {
        Ok(())
    }

    fn on_train_batch_end(
        &mut self,
        _trainer: &Trainer,
        _batch_idx: usize,
        _output: &StepOutput,
    ) -> Result<()> {
        Ok(())
    }

    fn should_stop(&self) -> bool {
        false
    }
}
