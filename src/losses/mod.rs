//! Loss functions for the reference models.

pub mod srgan;

pub use srgan::{GeneratorLoss, TvLoss};
