//! Learning-rate schedulers.
//!
//! Schedulers are registered on the [`Trainer`](crate::Trainer) with
//! `with_scheduler` and consulted once per epoch; a returned value is applied
//! to the optimizer through `Optimizer::set_learning_rate`.

use crate::callbacks::{EpochMetrics, Mode};
use tracing::info;

pub trait LrScheduler: Send {
    /// Called after every epoch with the epoch's aggregated metrics and the
    /// optimizer's current learning rate. Return `Some(lr)` to change it.
    fn on_epoch_end(&mut self, epoch: usize, metrics: &EpochMetrics, current_lr: f64)
        -> Option<f64>;
}

/// Reduce the learning rate when a monitored quantity has stopped improving.
///
/// Models often benefit from reducing the learning rate by a factor of 2-10
/// once learning stagnates: if no improvement is seen for `patience` epochs,
/// the learning rate is multiplied by `factor`.
pub struct ReduceLrOnPlateau {
    monitor: String,
    mode: Mode,
    factor: f64,
    patience: usize,
    threshold: f32,
    cooldown: usize,
    min_lr: f64,
    eps: f64,
    best: Option<f32>,
    num_bad_epochs: usize,
    cooldown_counter: usize,
}

impl ReduceLrOnPlateau {
    pub fn new() -> Self {
        Self {
            monitor: "train_loss".to_string(),
            mode: Mode::Min,
            factor: 0.1,
            patience: 10,
            threshold: 1e-4,
            cooldown: 0,
            min_lr: 0.0,
            eps: 1e-8,
            best: None,
            num_bad_epochs: 0,
            cooldown_counter: 0,
        }
    }

    pub fn monitor(mut self, metric: impl Into<String>) -> Self {
        self.monitor = metric.into();
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Factor by which the learning rate is reduced: `new_lr = lr * factor`.
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    /// Relative threshold for measuring a new optimum, to only focus on
    /// significant changes.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Number of epochs to wait before resuming normal operation after a
    /// reduction.
    pub fn cooldown(mut self, cooldown: usize) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Lower bound on the learning rate.
    pub fn min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    fn is_improvement(&self, current: f32, best: f32) -> bool {
        match self.mode {
            Mode::Min => current < best * (1.0 - self.threshold),
            Mode::Max => current > best * (1.0 + self.threshold),
        }
    }
}

impl Default for ReduceLrOnPlateau {
    fn default() -> Self {
        Self::new()
    }
}

impl LrScheduler for ReduceLrOnPlateau {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        metrics: &EpochMetrics,
        current_lr: f64,
    ) -> Option<f64> {
        let current = metrics.monitored(&self.monitor)?;

        match self.best {
            None => {
                self.best = Some(current);
                return None;
            }
            Some(best) if self.is_improvement(current, best) => {
                self.best = Some(current);
                self.num_bad_epochs = 0;
                return None;
            }
            Some(_) => {}
        }

        if self.cooldown_counter > 0 {
            self.cooldown_counter -= 1;
            self.num_bad_epochs = 0;
            return None;
        }

        self.num_bad_epochs += 1;
        if self.num_bad_epochs <= self.patience {
            return None;
        }

        self.num_bad_epochs = 0;
        self.cooldown_counter = self.cooldown;
        let new_lr = (current_lr * self.factor).max(self.min_lr);
        if current_lr - new_lr <= self.eps {
            return None;
        }
        info!(epoch, new_lr, "reducing learning rate on plateau");
        Some(new_lr)
    }
}

/// Cosine-annealed learning rate over `t_max` epochs, from the rate observed
/// on the first invocation down to `eta_min`.
pub struct CosineAnnealing {
    t_max: usize,
    eta_min: f64,
    base_lr: Option<f64>,
}

impl CosineAnnealing {
    pub fn new(t_max: usize) -> Self {
        Self {
            t_max: t_max.max(1),
            eta_min: 0.0,
            base_lr: None,
        }
    }

    pub fn eta_min(mut self, eta_min: f64) -> Self {
        self.eta_min = eta_min;
        self
    }
}

impl LrScheduler for CosineAnnealing {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        _metrics: &EpochMetrics,
        current_lr: f64,
    ) -> Option<f64> {
        let base = *self.base_lr.get_or_insert(current_lr);
        let progress = ((epoch + 1).min(self.t_max)) as f64 / self.t_max as f64;
        let new_lr =
            self.eta_min + (base - self.eta_min) * (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
        Some(new_lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch_with_train_loss(loss: f32) -> EpochMetrics {
        EpochMetrics {
            train_loss: loss,
            ..Default::default()
        }
    }

    #[test]
    fn plateau_reduces_after_patience() {
        let mut scheduler = ReduceLrOnPlateau::new().patience(2).factor(0.5);
        let flat = epoch_with_train_loss(1.0);

        // First observation just seeds the best value.
        assert_eq!(scheduler.on_epoch_end(0, &flat, 0.1), None);
        assert_eq!(scheduler.on_epoch_end(1, &flat, 0.1), None);
        assert_eq!(scheduler.on_epoch_end(2, &flat, 0.1), None);
        let reduced = scheduler.on_epoch_end(3, &flat, 0.1);
        assert_eq!(reduced, Some(0.05));
    }

    #[test]
    fn plateau_resets_on_improvement() {
        let mut scheduler = ReduceLrOnPlateau::new().patience(1);
        assert_eq!(scheduler.on_epoch_end(0, &epoch_with_train_loss(1.0), 0.1), None);
        assert_eq!(scheduler.on_epoch_end(1, &epoch_with_train_loss(1.0), 0.1), None);
        // Improvement resets the bad-epoch counter.
        assert_eq!(scheduler.on_epoch_end(2, &epoch_with_train_loss(0.5), 0.1), None);
        assert_eq!(scheduler.on_epoch_end(3, &epoch_with_train_loss(0.5), 0.1), None);
        assert!(scheduler.on_epoch_end(4, &epoch_with_train_loss(0.5), 0.1).is_some());
    }

    #[test]
    fn plateau_respects_min_lr() {
        let mut scheduler = ReduceLrOnPlateau::new().patience(0).min_lr(0.09);
        let flat = epoch_with_train_loss(1.0);
        assert_eq!(scheduler.on_epoch_end(0, &flat, 0.1), None);
        assert_eq!(scheduler.on_epoch_end(1, &flat, 0.1), Some(0.09));
        // Already at the floor, no further update is emitted.
        assert_eq!(scheduler.on_epoch_end(2, &flat, 0.09), None);
    }

    #[test]
    fn cosine_reaches_eta_min_at_t_max() {
        let mut scheduler = CosineAnnealing::new(10).eta_min(0.001);
        let metrics = EpochMetrics::default();

        let first = scheduler.on_epoch_end(0, &metrics, 0.1).unwrap();
        assert!(first < 0.1 && first > 0.001);

        let last = scheduler.on_epoch_end(9, &metrics, first).unwrap();
        assert!((last - 0.001).abs() < 1e-9);

        // Past t_max the schedule stays pinned at eta_min.
        let beyond = scheduler.on_epoch_end(20, &metrics, last).unwrap();
        assert!((beyond - 0.001).abs() < 1e-9);
    }
}
