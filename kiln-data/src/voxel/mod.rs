//! Voxel grids: the binvox codec and resampling operations.

pub mod binvox;
pub mod ops;

pub use binvox::{Binvox, BinvoxHeader, load_binvox, read_binvox, write_binvox};
pub use ops::{
    down_sample, nearest_index, pad, pad_batch, scale_down, scale_up, threshold, up_sample,
};
