//! Resampling and padding for voxel grids and batches of grids.

use ndarray::{Array3, Array4, ArrayBase, Axis, Data, Ix3, Ix4, s};

/// Source index for nearest-neighbour resampling from `src` cells to `dst` cells.
pub fn nearest_index(dst_index: usize, src: usize, dst: usize) -> usize {
    ((dst_index * src) / dst).min(src.saturating_sub(1))
}

/// Average-pool a grid by `factor` along every axis. Trailing cells that do
/// not fill a whole block are dropped.
pub fn scale_down<S>(grid: &ArrayBase<S, Ix3>, factor: usize) -> Array3<f32>
where
    S: Data<Elem = f32>,
{
    let factor = factor.max(1);
    let (nx, ny, nz) = grid.dim();
    let out_dim = (nx / factor, ny / factor, nz / factor);
    let norm = (factor * factor * factor) as f32;
    Array3::from_shape_fn(out_dim, |(x, y, z)| {
        grid.slice(s![
            x * factor..(x + 1) * factor,
            y * factor..(y + 1) * factor,
            z * factor..(z + 1) * factor
        ])
        .sum()
            / norm
    })
}

/// Nearest-neighbour resample of a grid to `dims`. A source grid with an
/// empty axis has no cells to sample and yields an all-zero grid.
pub fn scale_up<S>(grid: &ArrayBase<S, Ix3>, dims: [usize; 3]) -> Array3<f32>
where
    S: Data<Elem = f32>,
{
    let (nx, ny, nz) = grid.dim();
    if nx == 0 || ny == 0 || nz == 0 {
        return Array3::zeros((dims[0], dims[1], dims[2]));
    }
    Array3::from_shape_fn((dims[0], dims[1], dims[2]), |(x, y, z)| {
        grid[[
            nearest_index(x, nx, dims[0]),
            nearest_index(y, ny, dims[1]),
            nearest_index(z, nz, dims[2]),
        ]]
    })
}

/// Binarize: cells strictly above `level` become 1, the rest 0.
pub fn threshold<S>(grid: &ArrayBase<S, Ix3>, level: f32) -> Array3<f32>
where
    S: Data<Elem = f32>,
{
    grid.mapv(|v| if v > level { 1.0 } else { 0.0 })
}

/// Surround a grid with `width` empty cells on every side.
pub fn pad<S>(grid: &ArrayBase<S, Ix3>, width: usize) -> Array3<f32>
where
    S: Data<Elem = f32>,
{
    let (nx, ny, nz) = grid.dim();
    let mut out = Array3::zeros((nx + 2 * width, ny + 2 * width, nz + 2 * width));
    out.slice_mut(s![width..width + nx, width..width + ny, width..width + nz])
        .assign(grid);
    out
}

/// Pad every grid of a `(B, X, Y, Z)` batch.
pub fn pad_batch<S>(batch: &ArrayBase<S, Ix4>, width: usize) -> Array4<f32>
where
    S: Data<Elem = f32>,
{
    let (b, nx, ny, nz) = batch.dim();
    let mut out = Array4::zeros((b, nx + 2 * width, ny + 2 * width, nz + 2 * width));
    out.slice_mut(s![.., width..width + nx, width..width + ny, width..width + nz])
        .assign(batch);
    out
}

/// Low-resolution input for super-resolution: average-pool each grid by
/// `factor`, then keep cells whose occupancy exceeds `level`.
pub fn down_sample<S>(batch: &ArrayBase<S, Ix4>, factor: usize, level: f32) -> Array4<f32>
where
    S: Data<Elem = f32>,
{
    map_grids(batch, |grid| threshold(&scale_down(&grid, factor), level))
}

/// Naive upsampling baseline: nearest-neighbour resample of each grid to `dims`.
pub fn up_sample<S>(batch: &ArrayBase<S, Ix4>, dims: [usize; 3]) -> Array4<f32>
where
    S: Data<Elem = f32>,
{
    map_grids(batch, |grid| scale_up(&grid, dims))
}

fn map_grids<S, F>(batch: &ArrayBase<S, Ix4>, mut f: F) -> Array4<f32>
where
    S: Data<Elem = f32>,
    F: FnMut(ndarray::ArrayView3<'_, f32>) -> Array3<f32>,
{
    let grids: Vec<Array3<f32>> = batch.outer_iter().map(&mut f).collect();
    let out_dim = grids.first().map_or((0, 0, 0), |g| g.dim());
    let mut out = Array4::zeros((grids.len(), out_dim.0, out_dim.1, out_dim.2));
    for (mut slot, grid) in out.axis_iter_mut(Axis(0)).zip(grids.iter()) {
        slot.assign(grid);
    }
    out
}
