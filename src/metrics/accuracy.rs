//! Classification accuracy.

use super::Metric;
use candle::{DType, Result, Tensor, D};

/// Fraction of predictions matching the targets. Accepts either raw logits
/// (argmax is taken over the last dimension) or pre-computed class indices.
#[derive(Debug, Default)]
pub struct Accuracy {
    correct: usize,
    total: usize,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metric for Accuracy {
    fn update(&mut self, preds: &Tensor, targets: &Tensor) -> Result<()> {
        let preds = if preds.rank() > targets.rank() {
            preds.argmax(D::Minus1)?
        } else {
            preds.clone()
        };
        let correct = preds
            .to_dtype(DType::U32)?
            .eq(&targets.to_dtype(DType::U32)?)?
            .to_dtype(DType::F32)?
            .sum_all()?
            .to_scalar::<f32>()?;
        self.correct += correct as usize;
        self.total += targets.elem_count();
        Ok(())
    }

    fn compute(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
