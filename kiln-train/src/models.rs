//! Small reference models for the two training drivers.
//!
//! These are deliberately shallow: a single dense layer per network for the
//! GAN and a per-voxel classifier on top of nearest-neighbour upsampling for
//! super-resolution. Deeper architectures plug in through [`Module`].

use crate::error::TrainError;
use crate::nn::{Linear, Module, Parameter, sigmoid};
use kiln_data::SeededRng;
use kiln_data::voxel::{nearest_index, up_sample};
use ndarray::{Array2, Array4, Array5, ArrayD, ArrayViewD, Axis, Ix2, Ix4, Ix5, s};

fn grid_len(dims: [usize; 3]) -> usize {
    dims.iter().product()
}

/// Maps a latent code `(B, latent)` to occupancy grids `(B, X, Y, Z)` in (0, 1).
#[derive(Debug, Clone)]
pub struct LinearGenerator {
    layer: Linear,
    dims: [usize; 3],
    output: Option<Array2<f32>>,
    training: bool,
}

impl LinearGenerator {
    pub fn new(latent_dim: usize, dims: [usize; 3], rng: &mut SeededRng) -> Self {
        Self {
            layer: Linear::new("gen.fc", latent_dim, grid_len(dims), rng),
            dims,
            output: None,
            training: true,
        }
    }

    pub fn latent_dim(&self) -> usize {
        self.layer.in_features()
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }
}

impl Module for LinearGenerator {
    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError> {
        let logits = self.layer.forward(input)?;
        let probs = logits.mapv(sigmoid).into_dimensionality::<Ix2>()?;
        let batch = probs.nrows();
        self.output = self.training.then(|| probs.clone());
        let [x, y, z] = self.dims;
        Ok(probs.into_shape_with_order((batch, x, y, z))?.into_dyn())
    }

    fn backward(&mut self, grad_output: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError> {
        let probs = self
            .output
            .as_ref()
            .ok_or(TrainError::NoForward("LinearGenerator"))?;
        let grad = grad_output
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(probs.raw_dim())?;
        let grad_logits = grad * probs.mapv(|p| p * (1.0 - p));
        self.layer.backward(grad_logits.into_dyn().view())
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.layer.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.layer.parameters_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.layer.set_training(training);
        if !training {
            self.output = None;
        }
    }
}

/// Scores occupancy grids `(B, X, Y, Z)` with the probability `(B)` that each
/// one is real.
#[derive(Debug, Clone)]
pub struct LinearDiscriminator {
    layer: Linear,
    dims: [usize; 3],
    output: Option<Array2<f32>>,
    training: bool,
}

impl LinearDiscriminator {
    pub fn new(dims: [usize; 3], rng: &mut SeededRng) -> Self {
        Self {
            layer: Linear::new("dis.fc", grid_len(dims), 1, rng),
            dims,
            output: None,
            training: true,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }
}

impl Module for LinearDiscriminator {
    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError> {
        let shape = input.shape();
        let [x, y, z] = self.dims;
        if shape.len() != 4 || shape[1..] != [x, y, z] {
            return Err(TrainError::shape(
                "discriminator input",
                &[shape.first().copied().unwrap_or(0), x, y, z],
                shape,
            ));
        }
        let batch = shape[0];
        let flat = input
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((batch, grid_len(self.dims)))?;
        let probs = self.layer.forward(flat.into_dyn().view())?.mapv(sigmoid);
        let probs = probs.into_dimensionality::<Ix2>()?;
        self.output = self.training.then(|| probs.clone());
        Ok(probs.index_axis(Axis(1), 0).to_owned().into_dyn())
    }

    fn backward(&mut self, grad_output: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError> {
        let probs = self
            .output
            .as_ref()
            .ok_or(TrainError::NoForward("LinearDiscriminator"))?;
        let grad = grad_output
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(probs.raw_dim())?;
        let grad_logits = grad * probs.mapv(|p| p * (1.0 - p));
        let batch = probs.nrows();
        let grad_input = self.layer.backward(grad_logits.into_dyn().view())?;
        let [x, y, z] = self.dims;
        Ok(grad_input.into_shape_with_order(vec![batch, x, y, z])?)
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.layer.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.layer.parameters_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.layer.set_training(training);
        if !training {
            self.output = None;
        }
    }
}

/// Super-resolves low-resolution grids `(B, x, y, z)` to class
/// log-probabilities `(B, 2, X, Y, Z)` (class 1 = occupied).
///
/// The input is resampled to the output size by nearest neighbour, then every
/// output voxel applies its own affine map to two logits, followed by a
/// log-softmax over the class axis.
#[derive(Debug, Clone)]
pub struct VoxelUpsampler {
    dims: [usize; 3],
    weight: Parameter,
    bias: Parameter,
    cache: Option<UpsamplerCache>,
    training: bool,
}

#[derive(Debug, Clone)]
struct UpsamplerCache {
    input_dims: [usize; 4],
    upsampled: Array4<f32>,
    log_probs: Array5<f32>,
}

impl VoxelUpsampler {
    /// Starts out equivalent to the nearest-neighbour baseline: an upsampled
    /// occupied cell scores class 1, an empty one class 0.
    pub fn new(dims: [usize; 3]) -> Self {
        let [x, y, z] = dims;
        let mut weight = ArrayD::<f32>::zeros(vec![2, x, y, z]);
        let mut bias = ArrayD::<f32>::zeros(vec![2, x, y, z]);
        weight.index_axis_mut(Axis(0), 0).fill(-2.0);
        weight.index_axis_mut(Axis(0), 1).fill(2.0);
        bias.index_axis_mut(Axis(0), 0).fill(1.0);
        bias.index_axis_mut(Axis(0), 1).fill(-1.0);
        Self {
            dims,
            weight: Parameter::new("upsampler.weight", weight),
            bias: Parameter::new("upsampler.bias", bias),
            cache: None,
            training: true,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }
}

impl Module for VoxelUpsampler {
    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError> {
        let input = input.into_dimensionality::<Ix4>()?;
        let (batch, ix, iy, iz) = input.dim();
        if ix == 0 || iy == 0 || iz == 0 {
            return Err(TrainError::InvalidArgument(format!(
                "VoxelUpsampler input grid {:?} has an empty axis",
                [ix, iy, iz]
            )));
        }
        let [x, y, z] = self.dims;
        let upsampled = up_sample(&input, self.dims);
        let weight = self.weight.value.view().into_dimensionality::<Ix4>()?;
        let bias = self.bias.value.view().into_dimensionality::<Ix4>()?;

        let mut log_probs = Array5::<f32>::zeros((batch, 2, x, y, z));
        for b in 0..batch {
            let u = upsampled.index_axis(Axis(0), b);
            let mut out = log_probs.index_axis_mut(Axis(0), b);
            for c in 0..2 {
                ndarray::Zip::from(out.index_axis_mut(Axis(0), c))
                    .and(&u)
                    .and(&weight.index_axis(Axis(0), c))
                    .and(&bias.index_axis(Axis(0), c))
                    .for_each(|logit, &occ, &w, &b0| *logit = w * occ + b0);
            }
        }
        // log-softmax over the class axis
        for mut pair in log_probs.lanes_mut(Axis(1)) {
            let max = pair[0].max(pair[1]);
            let lse = max + ((pair[0] - max).exp() + (pair[1] - max).exp()).ln();
            pair.mapv_inplace(|l| l - lse);
        }

        self.cache = self.training.then(|| UpsamplerCache {
            input_dims: [batch, ix, iy, iz],
            upsampled,
            log_probs: log_probs.clone(),
        });
        Ok(log_probs.into_dyn())
    }

    fn backward(&mut self, grad_output: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError> {
        let cache = self
            .cache
            .as_ref()
            .ok_or(TrainError::NoForward("VoxelUpsampler"))?;
        let grad = grad_output.into_dimensionality::<Ix5>()?;
        if grad.shape() != cache.log_probs.shape() {
            return Err(TrainError::shape(
                "upsampler gradient",
                cache.log_probs.shape(),
                grad.shape(),
            ));
        }

        // d logit_c = g_c - softmax_c * sum_k g_k
        let mut grad_logits = grad.to_owned();
        for (mut g, lp) in grad_logits
            .lanes_mut(Axis(1))
            .into_iter()
            .zip(cache.log_probs.lanes(Axis(1)))
        {
            let total = g[0] + g[1];
            g[0] -= lp[0].exp() * total;
            g[1] -= lp[1].exp() * total;
        }

        let [batch, ix, iy, iz] = cache.input_dims;
        let [x, y, z] = self.dims;
        let weight = self.weight.value.view().into_dimensionality::<Ix4>()?;
        let mut weight_grad = self.weight.grad.view_mut().into_dimensionality::<Ix4>()?;
        let mut bias_grad = self.bias.grad.view_mut().into_dimensionality::<Ix4>()?;
        let mut grad_input = Array4::<f32>::zeros((batch, ix, iy, iz));
        for b in 0..batch {
            let u = cache.upsampled.index_axis(Axis(0), b);
            let gl = grad_logits.index_axis(Axis(0), b);
            for c in 0..2 {
                let gl_c = gl.index_axis(Axis(0), c);
                ndarray::Zip::from(weight_grad.index_axis_mut(Axis(0), c))
                    .and(&gl_c)
                    .and(&u)
                    .for_each(|wg, &g, &occ| *wg += g * occ);
                bias_grad
                    .index_axis_mut(Axis(0), c)
                    .zip_mut_with(&gl_c, |bg, &g| *bg += g);
            }

            // adjoint of the nearest-neighbour resample
            let w0 = weight.index_axis(Axis(0), 0);
            let w1 = weight.index_axis(Axis(0), 1);
            let mut gi = grad_input.slice_mut(s![b, .., .., ..]);
            for i in 0..x {
                for j in 0..y {
                    for k in 0..z {
                        let du = w0[[i, j, k]] * gl[[0, i, j, k]] + w1[[i, j, k]] * gl[[1, i, j, k]];
                        gi[[
                            nearest_index(i, ix, x),
                            nearest_index(j, iy, y),
                            nearest_index(k, iz, z),
                        ]] += du;
                    }
                }
            }
        }
        Ok(grad_input.into_dyn())
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight, &mut self.bias]
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        if !training {
            self.cache = None;
        }
    }
}
