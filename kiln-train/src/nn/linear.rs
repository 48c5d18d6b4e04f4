use crate::error::TrainError;
use crate::nn::{Module, Parameter};
use kiln_data::SeededRng;
use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Axis, Ix1, Ix2};

/// Fully connected layer `y = x W^T + b` over `(B, in)` inputs.
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Parameter,
    bias: Parameter,
    input: Option<Array2<f32>>,
    training: bool,
}

impl Linear {
    /// Weights uniform in `±1/sqrt(in)`, bias zero.
    pub fn new(name: &str, in_features: usize, out_features: usize, rng: &mut SeededRng) -> Self {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let weight: Array2<f32> = rng.uniform_array((out_features, in_features), -bound, bound);
        Self {
            weight: Parameter::new(format!("{}.weight", name), weight.into_dyn()),
            bias: Parameter::new(
                format!("{}.bias", name),
                Array1::<f32>::zeros(out_features).into_dyn(),
            ),
            input: None,
            training: true,
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.value.shape()[1]
    }

    pub fn out_features(&self) -> usize {
        self.weight.value.shape()[0]
    }

    fn weight(&self) -> Result<ndarray::ArrayView2<'_, f32>, TrainError> {
        Ok(self.weight.value.view().into_dimensionality::<Ix2>()?)
    }
}

impl Module for Linear {
    fn forward(&mut self, input: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError> {
        let x = input.into_dimensionality::<Ix2>()?;
        if x.ncols() != self.in_features() {
            return Err(TrainError::shape(
                "linear input",
                &[x.nrows(), self.in_features()],
                x.shape(),
            ));
        }
        let bias = self.bias.value.view().into_dimensionality::<Ix1>()?;
        let y = x.dot(&self.weight()?.t()) + &bias;
        self.input = self.training.then(|| x.to_owned());
        Ok(y.into_dyn())
    }

    fn backward(&mut self, grad_output: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError> {
        let x = self.input.as_ref().ok_or(TrainError::NoForward("Linear"))?;
        let g = grad_output.into_dimensionality::<Ix2>()?;
        if g.dim() != (x.nrows(), self.out_features()) {
            return Err(TrainError::shape(
                "linear gradient",
                &[x.nrows(), self.out_features()],
                g.shape(),
            ));
        }

        let grad_input = g.dot(&self.weight()?);
        self.weight.grad += &g.t().dot(x).into_dyn();
        self.bias.grad += &g.sum_axis(Axis(0)).into_dyn();
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
            self.input = None;
        }
    }
}
