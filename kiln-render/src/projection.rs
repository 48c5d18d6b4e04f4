//! Orthogonal projection.
//!
//! Depth is preserved and the lateral coordinates are scaled uniformly. The
//! scale that makes an orthogonal view match a perspective camera at a given
//! object depth is computed by the caller, see [`scale_from_focal`] and
//! [`scale_from_fov`].

use crate::RenderError;
use glam::Vec3;
use ndarray::{Array3, ArrayBase, Axis, Data, Dimension, Ix3};

/// Project `(B, V, 3)` vertices orthogonally: x and y are multiplied by
/// `scale`, z is passed through unchanged.
///
/// Accepts any rank so that the rank contract is checked here rather than by
/// the caller's type. Returns a new tensor; the input is not modified.
pub fn orthogonal<S, D>(vertices: &ArrayBase<S, D>, scale: f32) -> Result<Array3<f32>, RenderError>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    if vertices.ndim() != 3 {
        return Err(RenderError::Rank(vertices.ndim()));
    }
    if vertices.shape()[2] != 3 {
        return Err(RenderError::Channels(vertices.shape().to_vec()));
    }

    let mut projected = vertices
        .to_owned()
        .into_dimensionality::<Ix3>()
        .map_err(|_| RenderError::Rank(vertices.ndim()))?;

    projected
        .slice_axis_mut(Axis(2), (0..2).into())
        .mapv_inplace(|v| v * scale);

    Ok(projected)
}

/// Orthogonal projection of a flat point list.
pub fn orthogonal_points(points: &[Vec3], scale: f32) -> Vec<Vec3> {
    points
        .iter()
        .map(|p| Vec3::new(p.x * scale, p.y * scale, p.z))
        .collect()
}

/// Scale mapping an object at `depth` into the `0..H/W` pixel range of a
/// camera with focal length `focal_pixels`.
pub fn scale_from_focal(focal_pixels: f32, depth: f32) -> f32 {
    focal_pixels / depth
}

/// Scale mapping an object at `depth` into the `-1..1` range of a camera
/// with full field of view `fov` (radians).
pub fn scale_from_fov(depth: f32, fov: f32) -> f32 {
    1.0 / (depth * (fov * 0.5).tan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, ArrayD, IxDyn, array, s};

    fn cloud() -> Array3<f32> {
        Array::from_iter((0..2 * 4 * 3).map(|i| i as f32 - 7.5))
            .into_shape_with_order((2, 4, 3))
            .unwrap()
    }

    #[test]
    fn test_single_point() {
        let vertices = array![[[1.0, 2.0, 3.0]]];
        let projected = orthogonal(&vertices, 2.0).unwrap();
        assert_eq!(projected, array![[[2.0, 4.0, 3.0]]]);
    }

    #[test]
    fn test_depth_unchanged_lateral_scaled() {
        let vertices = cloud();
        for scale in [-3.0, 0.0, 0.25, 1.0, 17.0] {
            let projected = orthogonal(&vertices, scale).unwrap();
            assert_eq!(projected.shape(), vertices.shape());
            assert_eq!(projected.slice(s![.., .., 2]), vertices.slice(s![.., .., 2]));
            for (p, v) in projected
                .slice(s![.., .., 0..2])
                .iter()
                .zip(vertices.slice(s![.., .., 0..2]).iter())
            {
                assert_eq!(*p, v * scale);
            }
        }
    }

    #[test]
    fn test_linear_in_scale() {
        let vertices = cloud();
        let (s1, s2) = (2.0f32, 8.0f32);
        let once = orthogonal(&vertices, s2).unwrap();
        let twice = orthogonal(&orthogonal(&vertices, s1).unwrap(), s2 / s1).unwrap();
        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_input_not_mutated() {
        let vertices = cloud();
        let before = vertices.clone();
        let _ = orthogonal(&vertices, 5.0).unwrap();
        assert_eq!(vertices, before);
    }

    #[test]
    fn test_rank_two_rejected() {
        let vertices = array![[1.0f32, 2.0, 3.0]];
        assert!(matches!(orthogonal(&vertices, 1.0), Err(RenderError::Rank(2))));
    }

    #[test]
    fn test_rank_four_rejected() {
        let vertices = ArrayD::<f32>::zeros(IxDyn(&[1, 1, 1, 3]));
        assert!(matches!(orthogonal(&vertices, 1.0), Err(RenderError::Rank(4))));
    }

    #[test]
    fn test_dynamic_rank_three_accepted() {
        let vertices = ArrayD::<f32>::ones(IxDyn(&[1, 2, 3]));
        let projected = orthogonal(&vertices, 3.0).unwrap();
        assert_eq!(projected, array![[[3.0, 3.0, 1.0], [3.0, 3.0, 1.0]]]);
    }

    #[test]
    fn test_wrong_channel_count_rejected() {
        let vertices = Array3::<f32>::zeros((1, 2, 2));
        assert!(matches!(orthogonal(&vertices, 1.0), Err(RenderError::Channels(_))));
    }

    #[test]
    fn test_points_match_tensor() {
        let points = [Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, 0.5, -4.0)];
        let projected = orthogonal_points(&points, 2.0);
        assert_eq!(projected, vec![Vec3::new(2.0, 4.0, 3.0), Vec3::new(-2.0, 1.0, -4.0)]);
    }

    #[test]
    fn test_scale_helpers() {
        assert_eq!(scale_from_focal(500.0, 2.0), 250.0);
        let fov = std::f32::consts::FRAC_PI_2;
        assert!((scale_from_fov(2.0, fov) - 0.5).abs() < 1e-6);
    }
}
