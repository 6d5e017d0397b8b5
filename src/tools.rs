//! Tensor utilities shared by models and training code.

use candle::{DType, Result, Tensor};

/// One-hot encode a rank-1 tensor of class indices into an
/// `(n, num_classes)` float tensor.
pub fn to_onehot(indices: &Tensor, num_classes: usize) -> Result<Tensor> {
    let indices = indices.to_dtype(DType::U32)?;
    Tensor::eye(num_classes, DType::F32, indices.device())?.index_select(&indices, 0)
}

/// Normalize a CHW image tensor with per-channel mean and standard deviation.
pub fn normalize_image(image: &Tensor, mean: &[f32], std: &[f32]) -> Result<Tensor> {
    let (c, _h, _w) = image.dims3()?;
    if mean.len() != c || std.len() != c {
        candle::bail!(
            "normalize_image: got {} channels but {} means and {} stds",
            c,
            mean.len(),
            std.len()
        )
    }
    let mean = Tensor::from_slice(mean, (c, 1, 1), image.device())?;
    let std = Tensor::from_slice(std, (c, 1, 1), image.device())?;
    image.broadcast_sub(&mean)?.broadcast_div(&std)
}

/// Reverse the normalization done to a CHW image tensor, returning an HWC
/// u8 tensor with values clamped to `[0, 255]`.
pub fn denormalize_image(image: &Tensor, mean: &[f32], std: &[f32]) -> Result<Tensor> {
    let (c, _h, _w) = image.dims3()?;
    if mean.len() != c || std.len() != c {
        candle::bail!(
            "denormalize_image: got {} channels but {} means and {} stds",
            c,
            mean.len(),
            std.len()
        )
    }
    let mean = Tensor::from_slice(mean, (c, 1, 1), image.device())?;
    let std = Tensor::from_slice(std, (c, 1, 1), image.device())?;
    let image = image.broadcast_mul(&std)?.broadcast_add(&mean)?;
    (image.permute((1, 2, 0))? * 255.0)?
        .clamp(0f32, 255f32)?
        .to_dtype(DType::U8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle::Device;

    #[test]
    fn onehot_rows_match_indices() -> Result<()> {
        let device = Device::Cpu;
        let indices = Tensor::new(&[0u32, 2, 1], &device)?;
        let onehot = to_onehot(&indices, 3)?;
        assert_eq!(
            onehot.to_vec2::<f32>()?,
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![0.0, 1.0, 0.0],
            ]
        );
        Ok(())
    }

    #[test]
    fn normalize_then_denormalize_recovers_pixels() -> Result<()> {
        let device = Device::Cpu;
        // A 1x2x2 image with values already in [0, 1].
        let image = Tensor::new(&[[[0.0f32, 0.25], [0.5, 1.0]]], &device)?;
        let normalized = normalize_image(&image, &[0.5], &[0.25])?;
        let restored = denormalize_image(&normalized, &[0.5], &[0.25])?;
        assert_eq!(
            restored.to_vec3::<u8>()?,
            vec![vec![vec![0], vec![63]], vec![vec![127], vec![255]]]
        );
        Ok(())
    }

    #[test]
    fn channel_count_mismatch_is_an_error() -> Result<()> {
        let device = Device::Cpu;
        let image = Tensor::zeros((3, 2, 2), DType::F32, &device)?;
        assert!(normalize_image(&image, &[0.5], &[0.25]).is_err());
        Ok(())
    }
}
