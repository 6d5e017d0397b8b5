//! Model checkpointing callback.

use super::{Callback, EpochMetrics, Mode};
use crate::Trainer;
use candle::Result;
use candle_nn::VarMap;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

struct CheckpointEntry {
    metric: f32,
    path: PathBuf,
    mode: Mode,
}

impl PartialEq for CheckpointEntry {
    fn eq(&self, other: &Self) -> bool {
        self.metric == other.metric
    }
}

impl Eq for CheckpointEntry {}

impl PartialOrd for CheckpointEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CheckpointEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // The heap top is the first checkpoint to evict: worst metric under
        // the configured mode.
        let ordering = self
            .metric
            .partial_cmp(&other.metric)
            .unwrap_or(std::cmp::Ordering::Equal);
        match self.mode {
            Mode::Min => ordering,
            Mode::Max => ordering.reverse(),
        }
    }
}

/// Saves the monitored-best model weights, keeping at most `save_top_k`
/// checkpoint files on disk.
pub struct ModelCheckpoint {
    varmap: Arc<Mutex<VarMap>>,
    dirpath: PathBuf,
    monitor: String,
    save_top_k: usize,
    mode: Mode,
    checkpoints: BinaryHeap<CheckpointEntry>,
    best_metric: Option<f32>,
}

impl ModelCheckpoint {
    pub fn new(varmap: Arc<Mutex<VarMap>>, dirpath: impl Into<PathBuf>) -> Self {
        Self {
            varmap,
            dirpath: dirpath.into(),
            monitor: "val_loss".to_string(),
            save_top_k: 1,
            mode: Mode::Min,
            checkpoints: BinaryHeap::new(),
            best_metric: None,
        }
    }

    pub fn monitor(mut self, metric: impl Into<String>) -> Self {
        self.monitor = metric.into();
        self
    }

    pub fn save_top_k(mut self, k: usize) -> Self {
        self.save_top_k = k;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    fn is_better(&self, current: f32, best: f32) -> bool {
        match self.mode {
            Mode::Min => current < best,
            Mode::Max => current > best,
        }
    }

    fn save_checkpoint(&mut self, epoch: usize, metric: f32) -> Result<()> {
        std::fs::create_dir_all(&self.dirpath).map_err(candle::Error::wrap)?;

        let filename = format!(
            "epoch_{:04}_{}_{:.4}.safetensors",
            epoch, self.monitor, metric
        );
        let path = self.dirpath.join(&filename);

        let varmap = self.varmap.lock().unwrap();
        varmap.save(&path)?;
        drop(varmap);
        debug!(?path, metric, "saved checkpoint");

        self.checkpoints.push(CheckpointEntry {
            metric,
            path,
            mode: self.mode,
        });

        // Prune old checkpoints if we exceed save_top_k
        while self.checkpoints.len() > self.save_top_k {
            if let Some(entry) = self.checkpoints.pop() {
                let _ = std::fs::remove_file(&entry.path);
            }
        }

        Ok(())
    }
}

impl Callback for ModelCheckpoint {
    fn on_epoch_end(
        &mut self,
        _trainer: &Trainer,
        epoch: usize,
        metrics: &EpochMetrics,
    ) -> Result<()> {
        let Some(current) = metrics.monitored(&self.monitor) else {
            return Ok(());
        };

        let should_save = match self.best_metric {
            None => true,
            Some(best) => self.is_better(current, best),
        };

        if should_save {
            self.best_metric = Some(current);
            self.save_checkpoint(epoch, current)?;
        }

        Ok(())
    }
}
