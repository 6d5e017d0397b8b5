//! High-level training framework for Candle, inspired by Keras and PyTorch
//! Lightning.
//!
//! Torchlight layers ergonomic training loops, callbacks, learning-rate
//! schedulers and metrics on top of [candle]. It does not load data: batches
//! are whatever your [`TrainModule`] declares them to be, materialized by you
//! before calling [`Trainer::fit`].
//!
//! ```no_run
//! use candle::{Result, Tensor, Var};
//! use candle_nn::{Linear, Module, Optimizer, SGD};
//! use torchlight::{StepOutput, TrainModule, Trainer, TrainerConfig};
//!
//! struct Model {
//!     linear: Linear,
//!     w: Var,
//!     b: Var,
//! }
//!
//! impl TrainModule for Model {
//!     type Batch = (Tensor, Tensor);
//!
//!     fn training_step(&mut self, (xs, ys): Self::Batch, _idx: usize) -> Result<StepOutput> {
//!         let loss = self.linear.forward(&xs)?.sub(&ys)?.sqr()?.sum_all()?;
//!         Ok(StepOutput::new(loss))
//!     }
//!
//!     fn parameters(&self) -> Vec<Var> {
//!         vec![self.w.clone(), self.b.clone()]
//!     }
//! }
//!
//! # fn run(model: &mut Model, batches: Vec<(Tensor, Tensor)>) -> anyhow::Result<()> {
//! let mut optimizer = SGD::new(model.parameters(), 0.01)?;
//! let config = TrainerConfig::new().max_epochs(100);
//! let mut trainer = Trainer::new(config);
//! trainer.fit(model, &mut optimizer, batches, None)?;
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod config;
pub mod losses;
pub mod metrics;
pub mod models;
pub mod module;
pub mod schedulers;
pub mod tools;
pub mod trainer;

pub use callbacks::{Callback, EarlyStopping, EpochMetrics, Mode, ModelCheckpoint, ModelSaver};
pub use config::TrainerConfig;
pub use metrics::{Accuracy, AverageMeter, Metric};
pub use module::{StepOutput, TrainModule};
pub use schedulers::{CosineAnnealing, LrScheduler, ReduceLrOnPlateau};
pub use trainer::Trainer;

pub use candle::{Module, ModuleT};
