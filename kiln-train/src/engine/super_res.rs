//! Voxel super-resolution driver.

use crate::checkpoint::{save_module, save_optimizer};
use crate::engine::{
    EngineConfig, History, VoxelLoader, mean, progress_bar, require_batches, should_print,
    voxel_batch,
};
use crate::error::TrainError;
use crate::loss::{nll_loss, occupied_probability};
use crate::metrics::voxel_iou;
use crate::nn::{Module, Optimizer};
use crate::run_dir::RunDir;
use kiln_data::voxel::{down_sample, up_sample};
use ndarray::{Array4, ArrayD};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuperResConfig {
    /// NLL weights for empty and occupied voxels.
    pub class_weights: [f32; 2],
    /// Average-pool factor producing the low-resolution input.
    pub down_factor: usize,
    /// Pooled cells above this become occupied.
    pub threshold: f32,
}

impl Default for SuperResConfig {
    fn default() -> Self {
        Self {
            class_weights: [0.0586, 0.9414],
            down_factor: 2,
            threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrainStats {
    pub loss: f32,
    pub iou: f32,
    pub batches: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ValidationStats {
    pub loss: f32,
    pub iou: f32,
    /// IoU of plain nearest-neighbour upsampling.
    pub iou_nn: f32,
    pub batches: usize,
}

#[derive(Serialize)]
struct SuperResSummary<'a> {
    epoch: usize,
    best_iou: f32,
    train_loss: &'a [f32],
    val_iou: &'a [f32],
    train_metrics: [&'static str; 2],
    val_metrics: [&'static str; 3],
}

struct Prediction {
    input: Array4<f32>,
    loss: f32,
    grad: ArrayD<f32>,
    iou: f32,
}

pub struct SuperResEngine {
    model: Box<dyn Module>,
    optimizer: Box<dyn Optimizer>,
    train_loader: VoxelLoader,
    val_loader: VoxelLoader,
    run_dir: RunDir,
    config: EngineConfig,
    sr: SuperResConfig,
    history: History,
}

fn predict(
    model: &mut dyn Module,
    sr: &SuperResConfig,
    target: &Array4<f32>,
) -> Result<Prediction, TrainError> {
    let input = down_sample(target, sr.down_factor, sr.threshold);
    let log_probs = model.forward(input.view().into_dyn())?;
    let target = target.view().into_dyn();
    let (loss, grad) = nll_loss(log_probs.view(), target.view(), &sr.class_weights)?;
    let iou = voxel_iou(occupied_probability(log_probs.view())?.view(), target, 0.5)?;
    Ok(Prediction {
        input,
        loss,
        grad,
        iou,
    })
}

impl SuperResEngine {
    pub fn new(
        model: Box<dyn Module>,
        optimizer: Box<dyn Optimizer>,
        train_loader: VoxelLoader,
        val_loader: VoxelLoader,
        run_dir: RunDir,
        config: EngineConfig,
        sr: SuperResConfig,
    ) -> Self {
        Self {
            model,
            optimizer,
            train_loader,
            val_loader,
            run_dir,
            config,
            sr,
            history: History::default(),
        }
    }

    /// Resume counting epochs from `epoch`.
    pub fn with_epoch(mut self, epoch: usize) -> Self {
        self.history.epoch = epoch;
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn epoch(&self) -> usize {
        self.history.epoch
    }

    pub fn model(&self) -> &dyn Module {
        &*self.model
    }

    /// One pass over the training set with one optimizer step per batch.
    #[instrument(skip(self), fields(epoch = self.history.epoch))]
    pub fn train(&mut self) -> Result<TrainStats, TrainError> {
        require_batches(&self.train_loader, "training")?;
        self.model.set_training(true);

        let pb = progress_bar(self.train_loader.num_batches(), self.config.progress)?;
        pb.set_message(format!("train {}", self.history.epoch));

        let mut totals = TrainStats::default();
        for (i, batch) in self.train_loader.iter().enumerate() {
            let target = voxel_batch(&batch?)?;

            self.model.zero_grad();
            let pred = predict(&mut *self.model, &self.sr, &target)?;
            self.model.backward(pred.grad.view())?;

            if should_print(&self.config, i) {
                pb.suspend(|| {
                    info!(
                        "[TRAIN] Epoch {:03}, Batch {:03}: Loss: {}",
                        self.history.epoch, i, pred.loss
                    );
                    info!("Metric iou: {}", pred.iou);
                });
            }
            self.optimizer.step(self.model.parameters_mut())?;

            totals.loss += pred.loss;
            totals.iou += pred.iou;
            totals.batches += 1;
            pb.inc(1);
        }
        pb.finish_and_clear();

        let stats = TrainStats {
            loss: mean(totals.loss, totals.batches),
            iou: mean(totals.iou, totals.batches),
            batches: totals.batches,
        };
        self.history.train_loss.push(stats.loss);
        self.history.epoch += 1;
        Ok(stats)
    }

    /// Score the validation set against the target grids and against the
    /// nearest-neighbour baseline. No gradients are kept.
    #[instrument(skip(self), fields(epoch = self.history.epoch))]
    pub fn validate(&mut self) -> Result<ValidationStats, TrainError> {
        require_batches(&self.val_loader, "validation")?;
        self.model.set_training(false);

        let pb = progress_bar(self.val_loader.num_batches(), self.config.progress)?;
        pb.set_message(format!("val {}", self.history.epoch));

        let mut totals = ValidationStats::default();
        let mut last = 0;
        for (i, batch) in self.val_loader.iter().enumerate() {
            let target = voxel_batch(&batch?)?;
            let pred = predict(&mut *self.model, &self.sr, &target)?;

            let (_, x, y, z) = target.dim();
            let baseline = up_sample(&pred.input, [x, y, z]);
            let iou_nn = voxel_iou(baseline.view().into_dyn(), target.view().into_dyn(), 0.5)?;

            totals.loss += pred.loss;
            totals.iou += pred.iou;
            totals.iou_nn += iou_nn;
            totals.batches += 1;
            last = i;

            if should_print(&self.config, i) {
                let (iou, iou_nn) = (
                    mean(totals.iou, totals.batches),
                    mean(totals.iou_nn, totals.batches),
                );
                pb.suspend(|| {
                    info!(
                        "[VAL] Epoch {:03}, Batch {:03}: IoU: {}, Iou Base: {}",
                        self.history.epoch, i, iou, iou_nn
                    )
                });
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        self.model.set_training(true);

        let stats = ValidationStats {
            loss: mean(totals.loss, totals.batches),
            iou: mean(totals.iou, totals.batches),
            iou_nn: mean(totals.iou_nn, totals.batches),
            batches: totals.batches,
        };
        info!(
            "[VAL Total] Epoch {:03}, Batch {:03}: IoU: {}, Iou Base: {}",
            self.history.epoch, last, stats.iou, stats.iou_nn
        );
        self.history.val_iou.push(stats.iou);
        Ok(stats)
    }

    /// Write `recent.*`, and `best.*` when the latest validation IoU is at
    /// least the best so far. Returns whether a new best was recorded.
    pub fn save(&mut self) -> Result<bool, TrainError> {
        let save_best = match self.history.val_iou.last() {
            Some(&latest) if latest >= self.history.best_val => {
                self.history.best_val = latest;
                true
            }
            _ => false,
        };

        let summary = SuperResSummary {
            epoch: self.history.epoch,
            best_iou: self.history.best_val,
            train_loss: &self.history.train_loss,
            val_iou: &self.history.val_iou,
            train_metrics: ["NLLLoss", "iou"],
            val_metrics: ["NLLLoss", "iou", "iou_NN"],
        };

        self.write_set("recent", &summary)?;
        info!("====== Saved recent model ======>");
        if save_best {
            self.write_set("best", &summary)?;
            info!("====== Overwrote best model ======>");
        }
        Ok(save_best)
    }

    fn write_set(&self, prefix: &str, summary: &SuperResSummary<'_>) -> Result<(), TrainError> {
        if self.config.save_model {
            save_module(&self.run_dir.join(&format!("{}.ckpt", prefix)), &*self.model)?;
            save_optimizer(
                &self.run_dir.join(&format!("{}_optim.ckpt", prefix)),
                &*self.optimizer,
            )?;
        }
        self.run_dir.write_summary(&format!("{}.log", prefix), summary)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{blob_loader, quiet, scratch_dir};
    use crate::models::VoxelUpsampler;
    use crate::nn::Adam;
    use serde_json::Value;
    use std::fs;

    fn engine(tag: &str) -> SuperResEngine {
        SuperResEngine::new(
            Box::new(VoxelUpsampler::new([4, 4, 4])),
            Box::new(Adam::with_lr(1e-2)),
            blob_loader(5, 4, 2, 7),
            blob_loader(3, 4, 2, 8),
            RunDir::create(&scratch_dir(tag), "NLLL").unwrap(),
            quiet(),
            SuperResConfig::default(),
        )
    }

    fn read_log(engine: &SuperResEngine, name: &str) -> Value {
        serde_json::from_str(&fs::read_to_string(engine.run_dir.join(name)).unwrap()).unwrap()
    }

    #[test]
    fn test_epoch_and_loss_bookkeeping() {
        let mut sr = engine("sr-epochs").with_epoch(2);
        for k in 1..=3 {
            let stats = sr.train().unwrap();
            assert_eq!(stats.batches, 3);
            assert!(stats.loss.is_finite() && stats.loss > 0.0);
            assert!((0.0..=1.0).contains(&stats.iou));
            assert_eq!(sr.epoch(), 2 + k);
            assert_eq!(sr.history().train_loss.len(), k);
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut sr = engine("sr-loss");
        let first = sr.train().unwrap().loss;
        let mut last = first;
        for _ in 0..10 {
            last = sr.train().unwrap().loss;
        }
        assert!(last < first, "loss went from {} to {}", first, last);
    }

    #[test]
    fn test_validate_records_iou() {
        let mut sr = engine("sr-val");
        sr.train().unwrap();
        let stats = sr.validate().unwrap();
        assert_eq!(stats.batches, 2);
        assert!((0.0..=1.0).contains(&stats.iou_nn));
        assert_eq!(sr.history().val_iou, vec![stats.iou]);
        // validation does not advance the epoch
        assert_eq!(sr.epoch(), 1);
    }

    #[test]
    fn test_save_tracks_best() {
        let mut sr = engine("sr-save");
        sr.train().unwrap();
        sr.validate().unwrap();
        assert!(sr.save().unwrap());
        for name in [
            "recent.ckpt",
            "recent_optim.ckpt",
            "recent.log",
            "best.ckpt",
            "best_optim.ckpt",
            "best.log",
        ] {
            assert!(sr.run_dir.join(name).is_file(), "missing {}", name);
        }
        let log = read_log(&sr, "recent.log");
        assert_eq!(log["epoch"], 1);
        assert_eq!(log["val_metrics"][2], "iou_NN");
        let best = log["best_iou"].as_f64().unwrap();
        assert!((best - sr.history.best_val as f64).abs() < 1e-6);
        assert!(log.get("bestval").is_none());

        // a worse validation result leaves best.* alone
        fs::remove_file(sr.run_dir.join("best.log")).unwrap();
        sr.history.val_iou.push(sr.history.best_val - 0.5);
        assert!(!sr.save().unwrap());
        assert!(!sr.run_dir.join("best.log").exists());
        assert!(sr.run_dir.join("recent.log").is_file());
    }

    #[test]
    fn test_save_before_validation_skips_best() {
        let mut sr = engine("sr-noval");
        sr.train().unwrap();
        assert!(!sr.save().unwrap());
        assert!(sr.run_dir.join("recent.log").is_file());
        assert!(!sr.run_dir.join("best.log").exists());
    }
}
