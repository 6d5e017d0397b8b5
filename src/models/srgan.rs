//! SRGAN super-resolution networks (<https://arxiv.org/abs/1609.04802>).

use candle::{DType, Device, Module, ModuleT, Result, Tensor, D};
use candle_nn::ops;
use candle_nn::{
    batch_norm, conv2d, AdamW, BatchNorm, Conv2d, Conv2dConfig, Optimizer, PReLU, ParamsAdamW,
    VarBuilder, VarMap,
};

use crate::losses::GeneratorLoss;

/// Rearrange a `(b, c*r*r, h, w)` tensor into `(b, c, h*r, w*r)`.
/// Candle has no built-in pixel shuffle.
pub fn pixel_shuffle(xs: &Tensor, upscale: usize) -> Result<Tensor> {
    let (b, c, h, w) = xs.dims4()?;
    let r = upscale;
    if c % (r * r) != 0 {
        candle::bail!("pixel_shuffle: {c} channels not divisible by {}", r * r)
    }
    let c_out = c / (r * r);
    xs.reshape(vec![b, c_out, r, r, h, w])?
        .permute(vec![0, 1, 4, 2, 5, 3])?
        .reshape(vec![b, c_out, h * r, w * r])
}

struct ResidualBlock {
    conv1: Conv2d,
    bn1: BatchNorm,
    prelu: PReLU,
    conv2: Conv2d,
    bn2: BatchNorm,
}

impl ResidualBlock {
    fn new(channels: usize, vb: VarBuilder) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv1: conv2d(channels, channels, 3, cfg, vb.pp("conv1"))?,
            bn1: batch_norm(channels, 1e-5, vb.pp("bn1"))?,
            prelu: candle_nn::prelu(Some(channels), vb.pp("prelu"))?,
            conv2: conv2d(channels, channels, 3, cfg, vb.pp("conv2"))?,
            bn2: batch_norm(channels, 1e-5, vb.pp("bn2"))?,
        })
    }
}

impl ModuleT for ResidualBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let residual = self.bn1.forward_t(&self.conv1.forward(xs)?, train)?;
        let residual = self.prelu.forward(&residual)?;
        let residual = self.bn2.forward_t(&self.conv2.forward(&residual)?, train)?;
        xs + residual
    }
}

struct UpsampleBlock {
    conv: Conv2d,
    prelu: PReLU,
    up_scale: usize,
}

impl UpsampleBlock {
    fn new(in_channels: usize, up_scale: usize, vb: VarBuilder) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv: conv2d(
                in_channels,
                in_channels * up_scale * up_scale,
                3,
                cfg,
                vb.pp("conv"),
            )?,
            prelu: candle_nn::prelu(Some(in_channels), vb.pp("prelu"))?,
            up_scale,
        })
    }
}

impl Module for UpsampleBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = pixel_shuffle(&self.conv.forward(xs)?, self.up_scale)?;
        self.prelu.forward(&xs)
    }
}

/// SRGAN generator: a deep residual network that upscales an RGB image by a
/// power-of-two factor, with outputs in `[0, 1]`.
pub struct Generator {
    head_conv: Conv2d,
    head_prelu: PReLU,
    res_blocks: Vec<ResidualBlock>,
    post_conv: Conv2d,
    post_bn: BatchNorm,
    upsample: Vec<UpsampleBlock>,
    tail: Conv2d,
}

impl Generator {
    /// `scale_factor` must be a power of two. Fewer residual blocks means
    /// faster inference at the cost of capacity.
    pub fn new(scale_factor: usize, res_blocks_count: usize, vb: VarBuilder) -> Result<Self> {
        if !scale_factor.is_power_of_two() || scale_factor < 2 {
            candle::bail!("scale factor must be a power of two >= 2, got {scale_factor}")
        }
        let upsample_count = scale_factor.trailing_zeros() as usize;
        let cfg9 = Conv2dConfig {
            padding: 4,
            ..Default::default()
        };
        let cfg3 = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };

        let head_conv = conv2d(3, 64, 9, cfg9, vb.pp("head.conv"))?;
        let head_prelu = candle_nn::prelu(Some(64), vb.pp("head.prelu"))?;
        let mut res_blocks = Vec::with_capacity(res_blocks_count);
        for i in 0..res_blocks_count {
            res_blocks.push(ResidualBlock::new(64, vb.pp(format!("res.{i}")))?);
        }
        let post_conv = conv2d(64, 64, 3, cfg3, vb.pp("post.conv"))?;
        let post_bn = batch_norm(64, 1e-5, vb.pp("post.bn"))?;
        let mut upsample = Vec::with_capacity(upsample_count);
        for i in 0..upsample_count {
            upsample.push(UpsampleBlock::new(64, 2, vb.pp(format!("up.{i}")))?);
        }
        let tail = conv2d(64, 3, 9, cfg9, vb.pp("tail"))?;

        Ok(Self {
            head_conv,
            head_prelu,
            res_blocks,
            post_conv,
            post_bn,
            upsample,
            tail,
        })
    }
}

impl ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let head = self.head_prelu.forward(&self.head_conv.forward(xs)?)?;
        let mut ys = head.clone();
        for block in &self.res_blocks {
            ys = block.forward_t(&ys, train)?;
        }
        let ys = self.post_bn.forward_t(&self.post_conv.forward(&ys)?, train)?;
        let mut ys = (head + ys)?;
        for block in &self.upsample {
            ys = block.forward(&ys)?;
        }
        let ys = self.tail.forward(&ys)?;
        (ys.tanh()? + 1.0)? / 2.0
    }
}

struct ConvBlock {
    conv: Conv2d,
    bn: Option<BatchNorm>,
}

impl ConvBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let ys = self.conv.forward(xs)?;
        let ys = match &self.bn {
            Some(bn) => bn.forward_t(&ys, train)?,
            None => ys,
        };
        ops::leaky_relu(&ys, 0.2)
    }
}

/// SRGAN discriminator: a VGG-style convolutional net producing one
/// real/fake score per image.
pub struct Discriminator {
    features: Vec<ConvBlock>,
    fc1: Conv2d,
    fc2: Conv2d,
}

impl Discriminator {
    pub fn new(vb: VarBuilder) -> Result<Self> {
        // (in, out, stride, batch norm)
        let specs: [(usize, usize, usize, bool); 8] = [
            (3, 64, 1, false),
            (64, 64, 2, true),
            (64, 128, 1, true),
            (128, 128, 2, true),
            (128, 256, 1, true),
            (256, 256, 2, true),
            (256, 512, 1, true),
            (512, 512, 2, true),
        ];
        let mut features = Vec::with_capacity(specs.len());
        for (i, (in_c, out_c, stride, with_bn)) in specs.into_iter().enumerate() {
            let cfg = Conv2dConfig {
                padding: 1,
                stride,
                ..Default::default()
            };
            let conv = conv2d(in_c, out_c, 3, cfg, vb.pp(format!("features.{i}.conv")))?;
            let bn = if with_bn {
                Some(batch_norm(out_c, 1e-5, vb.pp(format!("features.{i}.bn")))?)
            } else {
                None
            };
            features.push(ConvBlock { conv, bn });
        }
        let fc1 = conv2d(512, 1024, 1, Default::default(), vb.pp("classifier.0"))?;
        let fc2 = conv2d(1024, 1, 1, Default::default(), vb.pp("classifier.1"))?;
        Ok(Self { features, fc1, fc2 })
    }
}

impl ModuleT for Discriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut ys = xs.clone();
        for block in &self.features {
            ys = block.forward_t(&ys, train)?;
        }
        // Global average pooling down to 1x1 keeps the net size-agnostic.
        let ys = ys.mean_keepdim(D::Minus1)?.mean_keepdim(D::Minus2)?;
        let ys = ops::leaky_relu(&self.fc1.forward(&ys)?, 0.2)?;
        let ys = self.fc2.forward(&ys)?;
        ops::sigmoid(&ys.flatten_all()?)
    }
}

/// Losses and scores from one adversarial step.
#[derive(Clone, Copy, Debug)]
pub struct SrganStep {
    pub d_loss: f32,
    pub g_loss: f32,
    pub real_score: f32,
    pub fake_score: f32,
}

/// Adversarial training wrapper owning both networks and their optimizers.
///
/// GAN updates alternate between two objectives, which does not fit the
/// single-loss [`Trainer`](crate::Trainer) loop; `train_step` performs the
/// full discriminator-then-generator update itself, and inference goes
/// through the read-only [`generate`](Self::generate).
pub struct Srgan {
    generator: Generator,
    discriminator: Discriminator,
    g_varmap: VarMap,
    d_varmap: VarMap,
    g_opt: AdamW,
    d_opt: AdamW,
    loss: GeneratorLoss,
}

impl Srgan {
    pub fn new(
        scale_factor: usize,
        res_blocks_count: usize,
        lr: f64,
        device: &Device,
    ) -> Result<Self> {
        let g_varmap = VarMap::new();
        let g_vb = VarBuilder::from_varmap(&g_varmap, DType::F32, device);
        let generator = Generator::new(scale_factor, res_blocks_count, g_vb)?;

        let d_varmap = VarMap::new();
        let d_vb = VarBuilder::from_varmap(&d_varmap, DType::F32, device);
        let discriminator = Discriminator::new(d_vb)?;

        let params = ParamsAdamW {
            lr,
            ..Default::default()
        };
        let g_opt = AdamW::new(g_varmap.all_vars(), params.clone())?;
        let d_opt = AdamW::new(d_varmap.all_vars(), params)?;

        Ok(Self {
            generator,
            discriminator,
            g_varmap,
            d_varmap,
            g_opt,
            d_opt,
            loss: GeneratorLoss::new(),
        })
    }

    pub fn generator_varmap(&self) -> &VarMap {
        &self.g_varmap
    }

    pub fn discriminator_varmap(&self) -> &VarMap {
        &self.d_varmap
    }

    /// One alternating adversarial update on a (low-res, high-res) batch:
    /// the discriminator maximizes `D(hr) - D(G(lr))`, then the generator
    /// minimizes its composite loss against the updated scores.
    pub fn train_step(&mut self, lr_imgs: &Tensor, hr_imgs: &Tensor) -> Result<SrganStep> {
        let fake = self.generator.forward_t(lr_imgs, true)?;

        let real_score = self.discriminator.forward_t(hr_imgs, true)?.mean_all()?;
        let fake_score = self
            .discriminator
            .forward_t(&fake.detach(), true)?
            .mean_all()?;
        let d_loss = (real_score.affine(-1.0, 1.0)? + &fake_score)?;
        self.d_opt.backward_step(&d_loss)?;

        let fake_score_g = self.discriminator.forward_t(&fake, true)?.mean_all()?;
        let g_loss = self.loss.forward(&fake_score_g, &fake, hr_imgs)?;
        self.g_opt.backward_step(&g_loss)?;

        Ok(SrganStep {
            d_loss: d_loss.to_scalar::<f32>()?,
            g_loss: g_loss.to_scalar::<f32>()?,
            real_score: real_score.to_scalar::<f32>()?,
            fake_score: fake_score.to_scalar::<f32>()?,
        })
    }

    /// Upscale a batch in eval mode, leaving optimizer and batch-norm state
    /// untouched.
    pub fn generate(&self, lr_imgs: &Tensor) -> Result<Tensor> {
        self.generator.forward_t(lr_imgs, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_shuffle_rearranges_channels() -> Result<()> {
        let device = Device::Cpu;
        let xs = Tensor::arange(0f32, 16.0, &device)?.reshape((1, 4, 2, 2))?;
        let ys = pixel_shuffle(&xs, 2)?;
        assert_eq!(ys.dims(), &[1, 1, 4, 4]);
        // Channel c of the input lands at offset (c / r, c % r) in each
        // output block.
        assert_eq!(
            ys.squeeze(0)?.squeeze(0)?.to_vec2::<f32>()?,
            vec![
                vec![0.0, 4.0, 1.0, 5.0],
                vec![8.0, 12.0, 9.0, 13.0],
                vec![2.0, 6.0, 3.0, 7.0],
                vec![10.0, 14.0, 11.0, 15.0],
            ]
        );
        Ok(())
    }

    #[test]
    fn generator_upscales_by_scale_factor() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let generator = Generator::new(2, 1, vb)?;
        let lr_imgs = Tensor::zeros((1, 3, 8, 8), DType::F32, &device)?;
        let sr_imgs = generator.forward_t(&lr_imgs, false)?;
        assert_eq!(sr_imgs.dims(), &[1, 3, 16, 16]);
        // Output range is pinned to [0, 1] by the tanh mapping.
        let max = sr_imgs.max_all()?.to_scalar::<f32>()?;
        let min = sr_imgs.min_all()?.to_scalar::<f32>()?;
        assert!((0.0..=1.0).contains(&min) && (0.0..=1.0).contains(&max));
        Ok(())
    }

    #[test]
    fn generator_rejects_non_power_of_two_scales() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        assert!(Generator::new(3, 1, vb).is_err());
    }

    #[test]
    fn discriminator_scores_one_per_image() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let discriminator = Discriminator::new(vb)?;
        let imgs = Tensor::zeros((2, 3, 16, 16), DType::F32, &device)?;
        let scores = discriminator.forward_t(&imgs, false)?;
        assert_eq!(scores.dims(), &[2]);
        let scores = scores.to_vec1::<f32>()?;
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
        Ok(())
    }
}
