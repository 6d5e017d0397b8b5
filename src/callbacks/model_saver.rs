//! Periodic model saving and restoring.

use super::{Callback, EpochMetrics};
use crate::Trainer;
use candle::Result;
use candle_nn::VarMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Unconditionally saves the model weights every `every_n_epoch` epochs and on
/// the final epoch. Each save writes an epoch-tagged file plus a rolling
/// `{name}.safetensors` holding the latest weights.
pub struct ModelSaver {
    varmap: Arc<Mutex<VarMap>>,
    to_dir: PathBuf,
    name: String,
    epochs: usize,
    every_n_epoch: usize,
}

impl ModelSaver {
    /// `epochs` is the total number of epochs the model will be trained for,
    /// so the final state is saved even when it falls between intervals.
    pub fn new(
        varmap: Arc<Mutex<VarMap>>,
        to_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        epochs: usize,
    ) -> Self {
        Self {
            varmap,
            to_dir: to_dir.into(),
            name: name.into(),
            epochs,
            every_n_epoch: 1,
        }
    }

    pub fn every_n_epoch(mut self, n: usize) -> Self {
        self.every_n_epoch = n.max(1);
        self
    }

    /// Restore weights from `file` into an existing `VarMap`. The map must
    /// already contain variables with matching names and shapes.
    pub fn restore(varmap: &mut VarMap, file: impl AsRef<Path>) -> Result<()> {
        varmap.load(file)
    }

    fn latest_path(&self) -> PathBuf {
        self.to_dir.join(format!("{}.safetensors", self.name))
    }
}

impl Callback for ModelSaver {
    fn on_epoch_end(
        &mut self,
        _trainer: &Trainer,
        epoch: usize,
        _metrics: &EpochMetrics,
    ) -> Result<()> {
        let is_last = epoch + 1 == self.epochs;
        if (epoch + 1) % self.every_n_epoch != 0 && !is_last {
            return Ok(());
        }

        std::fs::create_dir_all(&self.to_dir).map_err(candle::Error::wrap)?;
        let tagged = self
            .to_dir
            .join(format!("{}_epoch-{}.safetensors", self.name, epoch + 1));
        let varmap = self.varmap.lock().unwrap();
        varmap.save(&tagged)?;
        // Overwrites the previous rolling copy.
        varmap.save(self.latest_path())?;
        drop(varmap);
        info!(dir = %self.to_dir.display(), epoch, "model saved");
        Ok(())
    }
}
