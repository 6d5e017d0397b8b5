//! Trainer configuration.

use candle::Device;

pub struct TrainerConfig {
    pub max_epochs: usize,
    pub device: Device,
    pub log_every_n_steps: usize,
    /// Clip gradients to this global L2 norm before each optimizer step.
    pub clip_grad_norm: Option<f64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_epochs: 1000,
            device: Device::Cpu,
            log_every_n_steps: 50,
            clip_grad_norm: None,
        }
    }
}

impl TrainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = epochs;
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn log_every_n_steps(mut self, n: usize) -> Self {
        self.log_every_n_steps = n;
        self
    }

    pub fn clip_grad_norm(mut self, max_norm: f64) -> Self {
        self.clip_grad_norm = Some(max_norm);
        self
    }
}
