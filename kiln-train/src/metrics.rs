use crate::error::TrainError;
use ndarray::ArrayViewD;

/// Intersection over union of two occupancy tensors.
///
/// `pred` is binarised with `> threshold` and `gt` with `> 0.5`; the ratio is
/// taken over the whole tensor, batch included. Two empty tensors score 1.
pub fn voxel_iou(
    pred: ArrayViewD<'_, f32>,
    gt: ArrayViewD<'_, f32>,
    threshold: f32,
) -> Result<f32, TrainError> {
    if pred.shape() != gt.shape() {
        return Err(TrainError::shape("iou", gt.shape(), pred.shape()));
    }
    let (mut intersection, mut union) = (0usize, 0usize);
    ndarray::Zip::from(&pred).and(&gt).for_each(|&p, &g| {
        let (p, g) = (p > threshold, g > 0.5);
        intersection += (p && g) as usize;
        union += (p || g) as usize;
    });
    if union == 0 {
        return Ok(1.0);
    }
    Ok(intersection as f32 / union as f32)
}
