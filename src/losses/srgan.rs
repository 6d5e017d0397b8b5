//! SRGAN generator losses.

use candle::{Result, Tensor};

/// Total-variation loss over a BCHW image batch: squared differences of
/// adjacent pixels, normalized per axis and averaged over the batch.
pub struct TvLoss {
    weight: f64,
}

impl TvLoss {
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, _c, h, w) = xs.dims4()?;
        if h < 2 || w < 2 {
            candle::bail!("tv loss requires images of at least 2x2, got {h}x{w}")
        }
        let h_diff = (xs.narrow(2, 1, h - 1)? - xs.narrow(2, 0, h - 1)?)?;
        let w_diff = (xs.narrow(3, 1, w - 1)? - xs.narrow(3, 0, w - 1)?)?;
        let count_h = (h_diff.elem_count() / b) as f64;
        let count_w = (w_diff.elem_count() / b) as f64;
        let h_tv = (h_diff.sqr()?.sum_all()? / count_h)?;
        let w_tv = (w_diff.sqr()?.sum_all()? / count_w)?;
        (h_tv + w_tv)? * (2.0 * self.weight / b as f64)
    }
}

/// Loss driving the SRGAN generator: pixel-space MSE against the target plus
/// a weighted adversarial term and a total-variation regularizer.
pub struct GeneratorLoss {
    adversarial_weight: f64,
    tv_weight: f64,
    tv: TvLoss,
}

impl GeneratorLoss {
    pub fn new() -> Self {
        Self {
            adversarial_weight: 1e-3,
            tv_weight: 2e-8,
            tv: TvLoss::new(1.0),
        }
    }

    /// `fake_score` is the mean discriminator output for the generated batch.
    pub fn forward(
        &self,
        fake_score: &Tensor,
        fake_imgs: &Tensor,
        target_imgs: &Tensor,
    ) -> Result<Tensor> {
        let image_loss = candle_nn::loss::mse(fake_imgs, target_imgs)?;
        // Generator wants D(G(z)) -> 1, i.e. minimize 1 - D(G(z)).
        let adversarial = fake_score.affine(-1.0, 1.0)?;
        let tv = self.tv.forward(fake_imgs)?;
        let loss = (image_loss + (adversarial * self.adversarial_weight)?)?;
        loss + (tv * self.tv_weight)?
    }
}

impl Default for GeneratorLoss {
    fn default() -> Self {
        Self::new()
    }
}
