//! Training loop implementation.

use std::collections::HashMap;

use candle::backprop::GradStore;
use candle::{DType, Result, Tensor, Var};
use candle_nn::Optimizer;
use tracing::{debug, info};

use crate::callbacks::EpochMetrics;
use crate::metrics::AverageMeter;
use crate::{Callback, LrScheduler, TrainModule, TrainerConfig};

pub struct Trainer {
    config: TrainerConfig,
    callbacks: Vec<Box<dyn Callback>>,
    schedulers: Vec<Box<dyn LrScheduler>>,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            callbacks: Vec::new(),
            schedulers: Vec::new(),
        }
    }

    pub fn with_callback(mut self, callback: impl Callback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn with_scheduler(mut self, scheduler: impl LrScheduler + 'static) -> Self {
        self.schedulers.push(Box::new(scheduler));
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Run the full training loop: for each epoch, train on all batches, run
    /// validation when `val_batches` is given, step the LR schedulers and fire
    /// callbacks. Stops early as soon as any callback's `should_stop` is true.
    pub fn fit<M, O>(
        &mut self,
        model: &mut M,
        optimizer: &mut O,
        train_batches: Vec<M::Batch>,
        val_batches: Option<Vec<M::Batch>>,
    ) -> Result<()>
    where
        M: TrainModule,
        O: Optimizer,
    {
        // Callbacks receive `&Trainer`, so they cannot stay borrowed inside
        // `self` while the loop runs.
        let mut callbacks = std::mem::take(&mut self.callbacks);
        let mut schedulers = std::mem::take(&mut self.schedulers);
        let result = self.run_fit(
            model,
            optimizer,
            train_batches,
            val_batches,
            &mut callbacks,
            &mut schedulers,
        );
        self.callbacks = callbacks;
        self.schedulers = schedulers;
        result
    }

    fn run_fit<M, O>(
        &self,
        model: &mut M,
        optimizer: &mut O,
        train_batches: Vec<M::Batch>,
        val_batches: Option<Vec<M::Batch>>,
        callbacks: &mut [Box<dyn Callback>],
        schedulers: &mut [Box<dyn LrScheduler>],
    ) -> Result<()>
    where
        M: TrainModule,
        O: Optimizer,
    {
        let params = model.parameters();
        for cb in callbacks.iter_mut() {
            cb.on_fit_start(self)?;
        }

        for epoch in 0..self.config.max_epochs {
            for cb in callbacks.iter_mut() {
                cb.on_epoch_start(self, epoch)?;
            }

            let mut loss_meter = AverageMeter::new();
            let mut metric_sums = MetricSums::default();
            for (batch_idx, batch) in train_batches.iter().cloned().enumerate() {
                let output = model.training_step(batch, batch_idx)?;
                let mut grads = output.loss.backward()?;
                if let Some(max_norm) = self.config.clip_grad_norm {
                    clip_grad_norm(&params, &mut grads, max_norm)?;
                }
                optimizer.step(&grads)?;

                let loss = scalar_loss(&output.loss)?;
                loss_meter.update(loss as f64);
                metric_sums.update(&output.metrics);
                if self.config.log_every_n_steps > 0
                    && batch_idx % self.config.log_every_n_steps == 0
                {
                    debug!(epoch, batch_idx, loss, "train step");
                }
                for cb in callbacks.iter_mut() {
                    cb.on_train_batch_end(self, batch_idx, &output)?;
                }
            }
            let train_loss = loss_meter.avg() as f32;

            let (val_loss, val_metrics) = match &val_batches {
                Some(batches) => {
                    let (loss, metrics) = self.run_validation(model, batches)?;
                    (Some(loss), metrics)
                }
                None => (None, HashMap::new()),
            };

            let metrics = EpochMetrics {
                train_loss,
                val_loss,
                train_metrics: metric_sums.means(),
                val_metrics,
            };

            for scheduler in schedulers.iter_mut() {
                if let Some(new_lr) =
                    scheduler.on_epoch_end(epoch, &metrics, optimizer.learning_rate())
                {
                    optimizer.set_learning_rate(new_lr);
                }
            }

            if self.config.log_every_n_steps > 0 {
                info!(epoch, train_loss, val_loss = ?metrics.val_loss, "epoch complete");
            }
            for cb in callbacks.iter_mut() {
                cb.on_epoch_end(self, epoch, &metrics)?;
            }
            if callbacks.iter().any(|cb| cb.should_stop()) {
                info!(epoch, "stop requested by callback");
                break;
            }
        }

        for cb in callbacks.iter_mut() {
            cb.on_fit_end(self)?;
        }
        Ok(())
    }

    /// Run a standalone validation pass, returning the mean validation loss.
    pub fn validate<M: TrainModule>(&self, model: &M, batches: &[M::Batch]) -> Result<f32> {
        let (loss, _) = self.run_validation(model, batches)?;
        Ok(loss)
    }

    fn run_validation<M: TrainModule>(
        &self,
        model: &M,
        batches: &[M::Batch],
    ) -> Result<(f32, HashMap<String, f64>)> {
        let mut loss_meter = AverageMeter::new();
        let mut metric_sums = MetricSums::default();
        for (batch_idx, batch) in batches.iter().cloned().enumerate() {
            let output = model.validation_step(batch, batch_idx)?;
            loss_meter.update(scalar_loss(&output.loss)? as f64);
            metric_sums.update(&output.metrics);
        }
        Ok((loss_meter.avg() as f32, metric_sums.means()))
    }
}

/// Per-epoch mean of every metric reported through [`StepOutput`](crate::StepOutput).
#[derive(Default)]
struct MetricSums {
    sums: HashMap<String, (f64, usize)>,
}

impl MetricSums {
    fn update(&mut self, metrics: &HashMap<String, f64>) {
        for (name, value) in metrics {
            let entry = self.sums.entry(name.clone()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    fn means(&self) -> HashMap<String, f64> {
        self.sums
            .iter()
            .map(|(name, (sum, count))| (name.clone(), sum / *count as f64))
            .collect()
    }
}

fn scalar_loss(loss: &Tensor) -> Result<f32> {
    loss.to_dtype(DType::F32)?.reshape(())?.to_scalar::<f32>()
}

fn clip_grad_norm(params: &[Var], grads: &mut GradStore, max_norm: f64) -> Result<()> {
    let mut total_sq = 0f64;
    for var in params {
        if let Some(grad) = grads.get(var) {
            total_sq += grad
                .sqr()?
                .sum_all()?
                .to_dtype(DType::F64)?
                .to_scalar::<f64>()?;
        }
    }
    let norm = total_sq.sqrt();
    if norm <= max_norm {
        return Ok(());
    }
    let scale = max_norm / (norm + 1e-6);
    for var in params {
        let clipped = match grads.get(var) {
            Some(grad) => (grad * scale)?,
            None => continue,
        };
        grads.insert(var, clipped);
    }
    Ok(())
}
