use anyhow::Result;
use candle::{DType, Device, Tensor};
use candle_nn::{Init, VarMap};
use std::sync::{Arc, Mutex};
use torchlight::{Callback, EpochMetrics, ModelCheckpoint, ModelSaver, Trainer, TrainerConfig};

fn varmap_with_weight(value: f64) -> Result<VarMap> {
    let varmap = VarMap::new();
    varmap.get((2,), "w", Init::Const(value), DType::F32, &Device::Cpu)?;
    Ok(varmap)
}

#[test]
fn model_checkpoint_keeps_top_k() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let varmap = Arc::new(Mutex::new(varmap_with_weight(1.0)?));
    let trainer = Trainer::new(TrainerConfig::new());

    let mut checkpoint = ModelCheckpoint::new(varmap, dir.path()).save_top_k(2);
    for (epoch, val_loss) in [1.0f32, 0.8, 0.9, 0.5, 0.3].into_iter().enumerate() {
        let metrics = EpochMetrics {
            train_loss: val_loss,
            val_loss: Some(val_loss),
            ..Default::default()
        };
        checkpoint.on_epoch_end(&trainer, epoch, &metrics)?;
    }

    // 0.9 was not an improvement over 0.8, so epochs 0, 1, 3 and 4 saved;
    // pruning keeps only the two best.
    let mut files: Vec<String> = std::fs::read_dir(dir.path())?
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    assert_eq!(
        files,
        vec![
            "epoch_0003_val_loss_0.5000.safetensors",
            "epoch_0004_val_loss_0.3000.safetensors",
        ]
    );

    Ok(())
}

#[test]
fn model_checkpoint_ignores_missing_monitor() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let varmap = Arc::new(Mutex::new(varmap_with_weight(1.0)?));
    let trainer = Trainer::new(TrainerConfig::new());

    // Monitoring val_loss while training without validation data.
    let mut checkpoint = ModelCheckpoint::new(varmap, dir.path());
    let metrics = EpochMetrics {
        train_loss: 0.5,
        ..Default::default()
    };
    checkpoint.on_epoch_end(&trainer, 0, &metrics)?;

    assert!(std::fs::read_dir(dir.path()).map(|mut d| d.next().is_none())?);
    Ok(())
}

#[test]
fn model_saver_saves_periodically_and_restores() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let varmap = varmap_with_weight(1.0)?;
    let shared = Arc::new(Mutex::new(varmap.clone()));
    let trainer = Trainer::new(TrainerConfig::new());

    let mut saver = ModelSaver::new(shared.clone(), dir.path(), "linear", 4).every_n_epoch(2);
    for epoch in 0..4 {
        saver.on_epoch_end(&trainer, epoch, &EpochMetrics::default())?;
    }

    let mut files: Vec<String> = std::fs::read_dir(dir.path())?
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    assert_eq!(
        files,
        vec![
            "linear.safetensors",
            "linear_epoch-2.safetensors",
            "linear_epoch-4.safetensors",
        ]
    );

    // Clobber the weights, then restore the rolling copy.
    let var = varmap.all_vars().pop().unwrap();
    var.set(&Tensor::zeros((2,), DType::F32, &Device::Cpu)?)?;
    assert_eq!(var.to_vec1::<f32>()?, vec![0.0, 0.0]);

    let mut guard = shared.lock().unwrap();
    ModelSaver::restore(&mut guard, dir.path().join("linear.safetensors"))?;
    drop(guard);
    assert_eq!(var.to_vec1::<f32>()?, vec![1.0, 1.0]);

    Ok(())
}

#[test]
fn model_saver_always_saves_final_epoch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let shared = Arc::new(Mutex::new(varmap_with_weight(1.0)?));
    let trainer = Trainer::new(TrainerConfig::new());

    // 5 epochs with a stride of 3: epoch 3 hits the interval, epoch 5 is
    // saved because it is the last one.
    let mut saver = ModelSaver::new(shared, dir.path(), "m", 5).every_n_epoch(3);
    for epoch in 0..5 {
        saver.on_epoch_end(&trainer, epoch, &EpochMetrics::default())?;
    }

    let mut files: Vec<String> = std::fs::read_dir(dir.path())?
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    files.sort();
    assert_eq!(
        files,
        vec![
            "m.safetensors",
            "m_epoch-3.safetensors",
            "m_epoch-5.safetensors",
        ]
    );

    Ok(())
}
