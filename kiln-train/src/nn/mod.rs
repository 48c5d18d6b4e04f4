//! Trainable modules and optimizers.
//!
//! Modules carry their own hand-derived backward pass: `forward` caches what
//! the gradient needs, `backward` takes the gradient of the loss with respect
//! to the last output, accumulates parameter gradients and returns the
//! gradient with respect to the last input.

pub mod adam;
pub mod linear;

use crate::error::TrainError;
use ndarray::{ArrayD, ArrayViewD};
use serde_json::Value;

pub use adam::Adam;
pub use linear::Linear;

/// A named tensor with an accumulated gradient of the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: ArrayD<f32>,
    pub grad: ArrayD<f32>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ArrayD<f32>) -> Self {
        let grad = ArrayD::zeros(value.raw_dim());
        Self {
            name: name.into(),
            value,
            grad,
        }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

pub trait Module {
    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError>;

    fn backward(&mut self, grad_output: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError>;

    fn parameters(&self) -> Vec<&Parameter>;

    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    fn zero_grad(&mut self) {
        for param in self.parameters_mut() {
            param.zero_grad();
        }
    }

    /// In evaluation mode `forward` keeps no cache and `backward` fails.
    fn set_training(&mut self, _training: bool) {}

    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}

/// Serializable optimizer or module state: JSON metadata plus named tensors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateDict {
    pub metadata: Value,
    pub tensors: Vec<(String, ArrayD<f32>)>,
}

pub trait Optimizer {
    /// Apply one update from the gradients currently stored in `params`.
    fn step(&mut self, params: Vec<&mut Parameter>) -> Result<(), TrainError>;

    fn state_dict(&self) -> StateDict;

    fn load_state_dict(&mut self, state: StateDict) -> Result<(), TrainError>;
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
