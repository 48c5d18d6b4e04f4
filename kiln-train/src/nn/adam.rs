use crate::error::TrainError;
use crate::nn::{Optimizer, Parameter, StateDict};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    pub lr: f32,
    pub betas: (f32, f32),
    pub eps: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            betas: (0.9, 0.999),
            eps: 1e-8,
        }
    }
}

/// Adam with bias-corrected moments.
///
/// Moment buffers are sized on the first step from the parameters handed in;
/// later steps must pass parameters of the same count and shapes, in the
/// same order.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    step: u64,
    m: Vec<ArrayD<f32>>,
    v: Vec<ArrayD<f32>>,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            step: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    pub fn with_lr(lr: f32) -> Self {
        Self::new(AdamConfig {
            lr,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    pub fn steps(&self) -> u64 {
        self.step
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: Vec<&mut Parameter>) -> Result<(), TrainError> {
        if self.m.is_empty() {
            self.m = params.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
            self.v = self.m.clone();
        }
        if self.m.len() != params.len() {
            return Err(TrainError::InvalidArgument(format!(
                "optimizer tracks {} parameters, got {}",
                self.m.len(),
                params.len()
            )));
        }

        self.step += 1;
        let (beta1, beta2) = self.config.betas;
        let correction1 = 1.0 - beta1.powi(self.step as i32);
        let correction2 = 1.0 - beta2.powi(self.step as i32);
        let lr = self.config.lr;
        let eps = self.config.eps;

        for ((param, m), v) in params.into_iter().zip(&mut self.m).zip(&mut self.v) {
            if m.shape() != param.grad.shape() {
                return Err(TrainError::shape(
                    format!("optimizer state for {}", param.name),
                    m.shape(),
                    param.grad.shape(),
                ));
            }
            ndarray::Zip::from(&mut param.value)
                .and(&param.grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / correction1;
                    let v_hat = *v / correction2;
                    *w -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
        Ok(())
    }

    fn state_dict(&self) -> StateDict {
        let mut tensors = Vec::with_capacity(self.m.len() * 2);
        for (i, (m, v)) in self.m.iter().zip(&self.v).enumerate() {
            tensors.push((format!("m.{}", i), m.clone()));
            tensors.push((format!("v.{}", i), v.clone()));
        }
        StateDict {
            metadata: json!({
                "optimizer": "adam",
                "config": self.config,
                "step": self.step,
            }),
            tensors,
        }
    }

    fn load_state_dict(&mut self, state: StateDict) -> Result<(), TrainError> {
        if state.metadata["optimizer"] != "adam" {
            return Err(TrainError::InvalidArgument(
                "state dict is not an Adam state".to_string(),
            ));
        }
        let config: AdamConfig = serde_json::from_value(state.metadata["config"].clone())?;
        let step = state.metadata["step"].as_u64().unwrap_or(0);

        let mut m = Vec::new();
        let mut v = Vec::new();
        for (name, tensor) in state.tensors {
            let expected = if name.starts_with("m.") { m.len() } else { v.len() };
            if name != format!("m.{}", expected) && name != format!("v.{}", expected) {
                return Err(TrainError::InvalidArgument(format!(
                    "unexpected optimizer tensor '{}'",
                    name
                )));
            }
            if name.starts_with("m.") {
                m.push(tensor);
            } else {
                v.push(tensor);
            }
        }
        if m.len() != v.len() {
            return Err(TrainError::InvalidArgument(
                "unpaired optimizer moments".to_string(),
            ));
        }

        self.config = config;
        self.step = step;
        self.m = m;
        self.v = v;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_adam_moves_against_gradient() {
        let mut param = Parameter::new("w", array![1.0, -1.0].into_dyn());
        param.grad = array![0.5, -2.0].into_dyn();
        let mut adam = Adam::with_lr(0.1);
        adam.step(vec![&mut param]).unwrap();
        // first step moves each weight by ~lr against the gradient sign
        assert!((param.value[[0]] - 0.9).abs() < 1e-4);
        assert!((param.value[[1]] + 0.9).abs() < 1e-4);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_adam_minimizes_quadratic() {
        let mut param = Parameter::new("w", array![5.0].into_dyn());
        let mut adam = Adam::with_lr(0.1);
        for _ in 0..500 {
            param.grad = param.value.mapv(|w| 2.0 * w);
            adam.step(vec![&mut param]).unwrap();
        }
        assert!(param.value[[0]].abs() < 0.05);
    }

    #[test]
    fn test_adam_state_roundtrip() {
        let mut param = Parameter::new("w", array![1.0, 2.0].into_dyn());
        param.grad = array![1.0, 1.0].into_dyn();
        let mut adam = Adam::new(AdamConfig {
            lr: 0.01,
            betas: (0.5, 0.5),
            eps: 1e-8,
        });
        adam.step(vec![&mut param]).unwrap();

        let mut restored = Adam::with_lr(1.0);
        restored.load_state_dict(adam.state_dict()).unwrap();
        assert_eq!(restored.config(), adam.config());
        assert_eq!(restored.steps(), 1);

        let mut a = param.clone();
        let mut b = param.clone();
        adam.step(vec![&mut a]).unwrap();
        restored.step(vec![&mut b]).unwrap();
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn test_adam_parameter_count_mismatch() {
        let mut a = Parameter::new("a", array![1.0].into_dyn());
        let mut b = Parameter::new("b", array![1.0].into_dyn());
        let mut adam = Adam::with_lr(0.1);
        adam.step(vec![&mut a]).unwrap();
        assert!(adam.step(vec![&mut a, &mut b]).is_err());
    }
}
