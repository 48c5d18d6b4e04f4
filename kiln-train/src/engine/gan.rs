//! Voxel GAN driver.

use crate::checkpoint::{save_module, save_optimizer};
use crate::engine::{
    EngineConfig, History, VoxelLoader, mean, progress_bar, require_batches, should_print,
    voxel_batch,
};
use crate::error::TrainError;
use crate::loss::{discriminator_loss, generator_loss};
use crate::nn::adam::AdamConfig;
use crate::nn::{Adam, Module, Optimizer};
use crate::run_dir::RunDir;
use kiln_data::SeededRng;
use kiln_data::voxel::pad_batch;
use ndarray::{ArrayD, ArrayView1, Axis, Ix1, concatenate};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GanConfig {
    pub latent_dim: usize,
    pub latent_std: f32,
    /// The discriminator is only stepped while its accuracy is below this.
    pub dis_accuracy_ceiling: f32,
    pub seed: u64,
}

impl Default for GanConfig {
    fn default() -> Self {
        Self {
            latent_dim: 200,
            latent_std: 0.33,
            dis_accuracy_ceiling: 0.8,
            seed: 0,
        }
    }
}

impl GanConfig {
    pub fn generator_optimizer() -> Adam {
        Adam::new(AdamConfig {
            lr: 0.0025,
            betas: (0.5, 0.5),
            ..Default::default()
        })
    }

    pub fn discriminator_optimizer() -> Adam {
        Adam::new(AdamConfig {
            lr: 0.00005,
            betas: (0.5, 0.5),
            ..Default::default()
        })
    }
}

/// Means over the batches of one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GanEpochStats {
    pub gen_loss: f32,
    pub dis_loss: f32,
    pub gen_accuracy: f32,
    pub dis_accuracy: f32,
    pub batches: usize,
    /// Batches on which the discriminator was updated.
    pub dis_steps: usize,
}

#[derive(Serialize)]
struct GanSummary<'a> {
    epoch: usize,
    train_loss: &'a [f32],
    train_metrics: [&'static str; 3],
}

pub struct GanEngine {
    generator: Box<dyn Module>,
    discriminator: Box<dyn Module>,
    optim_g: Box<dyn Optimizer>,
    optim_d: Box<dyn Optimizer>,
    loader: VoxelLoader,
    run_dir: RunDir,
    config: EngineConfig,
    gan: GanConfig,
    history: History,
    rng: SeededRng,
}

fn latent(rng: &mut SeededRng, gan: &GanConfig, n: usize) -> ArrayD<f32> {
    rng.normal_array((n, gan.latent_dim), 0.0, gan.latent_std).into_dyn()
}

fn fraction(scores: ArrayView1<'_, f32>, pred: impl Fn(f32) -> bool) -> f32 {
    scores.iter().filter(|&&p| pred(p)).count() as f32 / scores.len().max(1) as f32
}

impl GanEngine {
    /// The generator must produce grids two cells larger per axis than the
    /// dataset's, matching the zero border added to real samples.
    pub fn new(
        generator: Box<dyn Module>,
        discriminator: Box<dyn Module>,
        loader: VoxelLoader,
        run_dir: RunDir,
        config: EngineConfig,
        gan: GanConfig,
    ) -> Self {
        Self {
            generator,
            discriminator,
            optim_g: Box::new(GanConfig::generator_optimizer()),
            optim_d: Box::new(GanConfig::discriminator_optimizer()),
            loader,
            run_dir,
            config,
            rng: SeededRng::new(gan.seed),
            gan,
            history: History::default(),
        }
    }

    pub fn with_optimizers(mut self, optim_g: Box<dyn Optimizer>, optim_d: Box<dyn Optimizer>) -> Self {
        self.optim_g = optim_g;
        self.optim_d = optim_d;
        self
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

    pub fn generator(&self) -> &dyn Module {
        &*self.generator
    }

    pub fn discriminator(&self) -> &dyn Module {
        &*self.discriminator
    }

    /// One pass over the training set.
    #[instrument(skip(self), fields(epoch = self.history.epoch))]
    pub fn train(&mut self) -> Result<GanEpochStats, TrainError> {
        require_batches(&self.loader, "training")?;
        self.generator.set_training(true);
        self.discriminator.set_training(true);

        let pb = progress_bar(self.loader.num_batches(), self.config.progress)?;
        pb.set_message(format!("epoch {}", self.history.epoch));

        let mut totals = GanEpochStats::default();
        for (i, batch) in self.loader.iter().enumerate() {
            let data = voxel_batch(&batch?)?;
            let n = data.len_of(Axis(0));

            // real grids get an empty one-cell border
            let real = pad_batch(&data, 1).into_dyn();

            let z = latent(&mut self.rng, &self.gan, n);
            let fake = self.generator.forward(z.view())?;
            let both = concatenate(Axis(0), &[real.view(), fake.view()])?;
            let scores = self
                .discriminator
                .forward(both.view())?
                .into_dimensionality::<Ix1>()?;
            let (d_real, d_fake) = scores.view().split_at(Axis(0), n);

            let (d_loss, grad_real, grad_fake) = discriminator_loss(d_real, d_fake)?;
            let d_accuracy =
                (fraction(d_real, |p| p >= 0.5) + fraction(d_fake, |p| p < 0.5)) / 2.0;
            let g_accuracy = fraction(d_fake, |p| p > 0.5);

            if d_accuracy < self.gan.dis_accuracy_ceiling {
                self.discriminator.zero_grad();
                let grad = concatenate(Axis(0), &[grad_real.view(), grad_fake.view()])?;
                self.discriminator.backward(grad.into_dyn().view())?;
                self.optim_d.step(self.discriminator.parameters_mut())?;
                totals.dis_steps += 1;
            }

            let z = latent(&mut self.rng, &self.gan, n);
            let fake = self.generator.forward(z.view())?;
            let scores = self
                .discriminator
                .forward(fake.view())?
                .into_dimensionality::<Ix1>()?;
            let (g_loss, grad) = generator_loss(scores.view())?;

            self.discriminator.zero_grad();
            self.generator.zero_grad();
            let grad_fake = self.discriminator.backward(grad.into_dyn().view())?;
            self.generator.backward(grad_fake.view())?;
            self.optim_g.step(self.generator.parameters_mut())?;

            totals.gen_loss += g_loss;
            totals.dis_loss += d_loss;
            totals.gen_accuracy += g_accuracy;
            totals.dis_accuracy += d_accuracy;
            totals.batches += 1;

            if should_print(&self.config, i) {
                pb.suspend(|| {
                    info!(
                        "[TRAIN] Epoch {:03}, Batch {:03}: gen: {:2.3}, dis = {:2.3}",
                        self.history.epoch, i, g_accuracy, d_accuracy
                    )
                });
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        let stats = GanEpochStats {
            gen_loss: mean(totals.gen_loss, totals.batches),
            dis_loss: mean(totals.dis_loss, totals.batches),
            gen_accuracy: mean(totals.gen_accuracy, totals.batches),
            dis_accuracy: mean(totals.dis_accuracy, totals.batches),
            ..totals
        };
        self.history.train_loss.push(stats.gen_loss);
        self.history.epoch += 1;
        Ok(stats)
    }

    /// Write the latest models and optimizer states plus `recent.log`.
    pub fn save(&self) -> Result<(), TrainError> {
        if self.config.save_model {
            save_module(&self.run_dir.join("gen.ckpt"), &*self.generator)?;
            save_module(&self.run_dir.join("dis.ckpt"), &*self.discriminator)?;
            save_optimizer(&self.run_dir.join("g_optim.ckpt"), &*self.optim_g)?;
            save_optimizer(&self.run_dir.join("d_optim.ckpt"), &*self.optim_d)?;
        }
        self.run_dir.write_summary(
            "recent.log",
            &GanSummary {
                epoch: self.history.epoch,
                train_loss: &self.history.train_loss,
                train_metrics: ["GenLoss", "gen_accuracy", "dis_accuracy"],
            },
        )?;
        info!("====== Saved recent model ======>");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::load_module;
    use crate::engine::testutil::{blob_loader, quiet, scratch_dir};
    use crate::models::{LinearDiscriminator, LinearGenerator};
    use serde_json::Value;

    fn engine(tag: &str, save_model: bool) -> GanEngine {
        engine_with_ceiling(tag, save_model, GanConfig::default().dis_accuracy_ceiling)
    }

    fn engine_with_ceiling(tag: &str, save_model: bool, ceiling: f32) -> GanEngine {
        let mut rng = SeededRng::new(3);
        let gan = GanConfig {
            latent_dim: 8,
            dis_accuracy_ceiling: ceiling,
            ..Default::default()
        };
        let run_dir = RunDir::create(&scratch_dir(tag), "GAN").unwrap();
        GanEngine::new(
            Box::new(LinearGenerator::new(8, [6, 6, 6], &mut rng)),
            Box::new(LinearDiscriminator::new([6, 6, 6], &mut rng)),
            blob_loader(5, 4, 2, 1),
            run_dir,
            EngineConfig {
                save_model,
                ..quiet()
            },
            gan,
        )
    }

    #[test]
    fn test_epoch_and_loss_bookkeeping() {
        let mut gan = engine("gan-epochs", true).with_epoch(4);
        for k in 1..=3 {
            let stats = gan.train().unwrap();
            assert_eq!(stats.batches, 3);
            assert!(stats.dis_steps <= 3);
            assert!(stats.gen_loss.is_finite());
            assert!((0.0..=1.0).contains(&stats.dis_accuracy));
            assert_eq!(gan.epoch(), 4 + k);
            assert_eq!(gan.history().train_loss.len(), k);
        }
    }

    fn discriminator_values(gan: &GanEngine) -> Vec<ArrayD<f32>> {
        gan.discriminator()
            .parameters()
            .iter()
            .map(|p| p.value.clone())
            .collect()
    }

    #[test]
    fn test_discriminator_frozen_at_zero_ceiling() {
        let mut gan = engine_with_ceiling("gan-ceiling-zero", false, 0.0);
        let before = discriminator_values(&gan);
        let stats = gan.train().unwrap();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.dis_steps, 0);
        assert_eq!(discriminator_values(&gan), before);
    }

    #[test]
    fn test_discriminator_stepped_every_batch_above_ceiling() {
        let mut gan = engine_with_ceiling("gan-ceiling-high", false, 1.1);
        let before = discriminator_values(&gan);
        let stats = gan.train().unwrap();
        assert_eq!(stats.dis_steps, stats.batches);
        assert_eq!(stats.dis_steps, 3);
        assert_ne!(discriminator_values(&gan), before);
    }

    #[test]
    fn test_training_moves_generator() {
        let mut gan = engine("gan-moves", true);
        let before = gan.generator().parameters()[0].value.clone();
        gan.train().unwrap();
        assert_ne!(gan.generator().parameters()[0].value, before);
    }

    #[test]
    fn test_save_writes_files() {
        let mut gan = engine("gan-save", true);
        gan.train().unwrap();
        gan.save().unwrap();
        for name in ["gen.ckpt", "dis.ckpt", "g_optim.ckpt", "d_optim.ckpt", "recent.log"] {
            assert!(gan.run_dir.join(name).is_file(), "missing {}", name);
        }
        let log: Value =
            serde_json::from_str(&std::fs::read_to_string(gan.run_dir.join("recent.log")).unwrap())
                .unwrap();
        assert_eq!(log["epoch"], 1);
        assert_eq!(log["train_loss"].as_array().unwrap().len(), 1);

        let mut rng = SeededRng::new(99);
        let mut restored = LinearGenerator::new(8, [6, 6, 6], &mut rng);
        load_module(&gan.run_dir.join("gen.ckpt"), &mut restored).unwrap();
        assert_eq!(
            restored.parameters()[0].value,
            gan.generator().parameters()[0].value
        );
    }

    #[test]
    fn test_save_without_models() {
        let gan = engine("gan-nosave", false);
        gan.save().unwrap();
        assert!(gan.run_dir.join("recent.log").is_file());
        assert!(!gan.run_dir.join("gen.ckpt").exists());
    }

    #[test]
    fn test_wrong_generator_size_fails() {
        let mut rng = SeededRng::new(3);
        let mut gan = GanEngine::new(
            Box::new(LinearGenerator::new(4, [4, 4, 4], &mut rng)),
            Box::new(LinearDiscriminator::new([6, 6, 6], &mut rng)),
            blob_loader(2, 4, 2, 1),
            RunDir::create(&scratch_dir("gan-size"), "GAN").unwrap(),
            quiet(),
            GanConfig {
                latent_dim: 4,
                ..Default::default()
            },
        );
        assert!(gan.train().is_err());
        assert_eq!(gan.epoch(), 0);
    }
}
