//! Occupancy samples drawn from voxel grids.

use crate::dataset::{Dataset, Sample, field};
use crate::error::DataError;
use crate::rng::SeededRng;
use ndarray::{Array1, Array2, ArrayViewD, Ix3};

/// Wraps a dataset carrying `voxels` and adds point/occupancy pairs.
///
/// For each sample, `num_points` points are drawn uniformly in the unit cube
/// `[0, 1)^3` and looked up in the grid. Adds `occ_points` `(N, 3)` and
/// `occ_values` `(N)`; the inner fields are kept.
#[derive(Debug, Clone)]
pub struct OccupancyPoints<D> {
    inner: D,
    num_points: usize,
    seed: u64,
}

impl<D: Dataset> OccupancyPoints<D> {
    pub fn new(inner: D, num_points: usize, seed: u64) -> Self {
        Self {
            inner,
            num_points,
            seed,
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

/// Sample `num_points` points and their occupancy from `grid`.
pub fn sample_occupancy(
    grid: ArrayViewD<'_, f32>,
    num_points: usize,
    rng: &mut SeededRng,
) -> Result<(Array2<f32>, Array1<f32>), DataError> {
    let grid = grid.into_dimensionality::<Ix3>()?;
    let dims = grid.dim();
    let dims = [dims.0, dims.1, dims.2];
    if dims.contains(&0) {
        return Err(DataError::InvalidArgument("empty voxel grid".to_string()));
    }

    let points: Array2<f32> = rng.uniform_array((num_points, 3), 0.0, 1.0);
    let values = points
        .rows()
        .into_iter()
        .map(|p| {
            let cell = |axis: usize| ((p[axis] * dims[axis] as f32) as usize).min(dims[axis] - 1);
            grid[[cell(0), cell(1), cell(2)]]
        })
        .collect();
    Ok((points, values))
}

impl<D: Dataset> Dataset for OccupancyPoints<D> {
    fn len(&self) -> usize {
        self.inner.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        let sample = self.inner.get(index)?;
        let mut rng = SeededRng::derive(self.seed, index as u64);
        let (points, values) =
            sample_occupancy(sample.field(field::VOXELS)?.view(), self.num_points, &mut rng)?;
        Ok(sample
            .with_field(field::OCC_POINTS, points.into_dyn())
            .with_field(field::OCC_VALUES, values.into_dyn()))
    }
}
