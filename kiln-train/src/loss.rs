//! Loss functions returning the loss value and its gradient.

use crate::error::TrainError;
use ndarray::{Array1, Array3, ArrayD, ArrayView1, ArrayViewD, Axis};

const PROB_EPS: f32 = 1e-7;

fn clamp_prob(p: f32) -> f32 {
    p.clamp(PROB_EPS, 1.0 - PROB_EPS)
}

/// Class-weighted negative log-likelihood.
///
/// `log_probs` is `(B, C, ...)`, `target` is `(B, ...)` holding class indices
/// as floats. The loss is `-sum(w[t] * log_probs[t]) / sum(w[t])` over all
/// elements; the returned gradient has the shape of `log_probs`. A batch whose
/// targets all carry zero weight yields a zero loss and gradient.
pub fn nll_loss(
    log_probs: ArrayViewD<'_, f32>,
    target: ArrayViewD<'_, f32>,
    class_weights: &[f32],
) -> Result<(f32, ArrayD<f32>), TrainError> {
    let shape = log_probs.shape().to_vec();
    if shape.len() < 2 {
        return Err(TrainError::shape("nll log-probabilities", &[0, 0], &shape));
    }
    let (batch, classes) = (shape[0], shape[1]);
    let mut expected_target = vec![batch];
    expected_target.extend_from_slice(&shape[2..]);
    if target.shape() != expected_target.as_slice() {
        return Err(TrainError::shape("nll target", &expected_target, target.shape()));
    }
    if class_weights.len() != classes {
        return Err(TrainError::InvalidArgument(format!(
            "{} class weights for {} classes",
            class_weights.len(),
            classes
        )));
    }

    let spatial: usize = shape[2..].iter().product();
    let lp = log_probs
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((batch, classes, spatial))?;
    let tgt = target
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((batch, spatial))?;

    let mut classes_of = Vec::with_capacity(batch * spatial);
    let mut total_weight = 0.0f32;
    for &t in tgt.iter() {
        if t < 0.0 || t.fract() != 0.0 || t as usize >= classes {
            return Err(TrainError::InvalidTarget(t));
        }
        let class = t as usize;
        total_weight += class_weights[class];
        classes_of.push(class);
    }

    let mut grad = Array3::<f32>::zeros((batch, classes, spatial));
    if total_weight == 0.0 {
        return Ok((0.0, grad.into_shape_with_order(shape)?));
    }

    let mut loss = 0.0f32;
    for b in 0..batch {
        for i in 0..spatial {
            let class = classes_of[b * spatial + i];
            let w = class_weights[class];
            loss -= w * lp[[b, class, i]];
            grad[[b, class, i]] = -w / total_weight;
        }
    }
    Ok((loss / total_weight, grad.into_shape_with_order(shape)?))
}

/// `-mean(log D(real) + log(1 - D(fake)))` with gradients for both inputs.
pub fn discriminator_loss(
    real: ArrayView1<'_, f32>,
    fake: ArrayView1<'_, f32>,
) -> Result<(f32, Array1<f32>, Array1<f32>), TrainError> {
    if real.len() != fake.len() || real.is_empty() {
        return Err(TrainError::shape("discriminator scores", real.shape(), fake.shape()));
    }
    let n = real.len() as f32;
    let loss = -real
        .iter()
        .zip(fake.iter())
        .map(|(&r, &f)| clamp_prob(r).ln() + (1.0 - clamp_prob(f)).ln())
        .sum::<f32>()
        / n;
    let grad_real = real.mapv(|r| -1.0 / (n * clamp_prob(r)));
    let grad_fake = fake.mapv(|f| 1.0 / (n * (1.0 - clamp_prob(f))));
    Ok((loss, grad_real, grad_fake))
}

/// `-mean(log D(fake))` with its gradient.
pub fn generator_loss(fake: ArrayView1<'_, f32>) -> Result<(f32, Array1<f32>), TrainError> {
    if fake.is_empty() {
        return Err(TrainError::InvalidArgument("empty batch".to_string()));
    }
    let n = fake.len() as f32;
    let loss = -fake.iter().map(|&f| clamp_prob(f).ln()).sum::<f32>() / n;
    let grad = fake.mapv(|f| -1.0 / (n * clamp_prob(f)));
    Ok((loss, grad))
}

/// Probability of class 1 from `(B, 2, ...)` log-probabilities.
pub fn occupied_probability(log_probs: ArrayViewD<'_, f32>) -> Result<ArrayD<f32>, TrainError> {
    if log_probs.ndim() < 2 || log_probs.shape()[1] != 2 {
        return Err(TrainError::shape(
            "two-class log-probabilities",
            &[log_probs.shape().first().copied().unwrap_or(0), 2],
            log_probs.shape(),
        ));
    }
    Ok(log_probs.index_axis(Axis(1), 1).mapv(f32::exp))
}
