//! Binvox reading and writing.
//!
//! Layout follows the reference binvox tool: a text header ending in `data`,
//! then run-length pairs `(value, count)`. Voxels are visited with x slowest,
//! then z, then y fastest. Grids are exposed as `[x, y, z]` occupancy with
//! values 0.0 or 1.0.

use crate::error::DataError;
use glam::Vec3;
use ndarray::{Array3, ArrayBase, Data, Ix3};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinvoxHeader {
    /// Grid size along x, y, z.
    pub dims: [usize; 3],
    pub translate: Vec3,
    pub scale: f32,
}

impl BinvoxHeader {
    pub fn unit(dims: [usize; 3]) -> Self {
        Self {
            dims,
            translate: Vec3::ZERO,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Binvox {
    pub header: BinvoxHeader,
    pub grid: Array3<f32>,
}

fn parse<T: std::str::FromStr>(token: Option<&str>, line: &str) -> Result<T, DataError> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| DataError::Binvox(format!("malformed header line '{}'", line.trim())))
}

/// Decode a binvox stream.
pub fn read_binvox(reader: impl Read) -> Result<Binvox, DataError> {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if !line.starts_with("#binvox") {
        return Err(DataError::Binvox("not a binvox file".into()));
    }

    let mut dims: Option<[usize; 3]> = None;
    let mut translate = Vec3::ZERO;
    let mut scale = 1.0f32;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(DataError::Binvox("missing 'data' line".into()));
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            // file order is depth, width, height, i.e. x, z, y
            Some("dim") => {
                let x = parse(parts.next(), &line)?;
                let z = parse(parts.next(), &line)?;
                let y = parse(parts.next(), &line)?;
                dims = Some([x, y, z]);
            }
            Some("translate") => {
                translate = Vec3::new(
                    parse(parts.next(), &line)?,
                    parse(parts.next(), &line)?,
                    parse(parts.next(), &line)?,
                );
            }
            Some("scale") => scale = parse(parts.next(), &line)?,
            Some("data") => break,
            _ => {}
        }
    }

    let dims = dims.ok_or_else(|| DataError::Binvox("missing 'dim' line".into()))?;
    let [nx, ny, nz] = dims;
    let total = nx
        .checked_mul(ny)
        .and_then(|n| n.checked_mul(nz))
        .ok_or_else(|| DataError::Binvox(format!("grid {}x{}x{} is too large", nx, ny, nz)))?;

    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.len() % 2 != 0 {
        return Err(DataError::Binvox(
            "run-length data ends in the middle of a pair".into(),
        ));
    }
    // each pair covers at most 255 voxels
    let covered = (bytes.len() / 2).saturating_mul(u8::MAX as usize);
    if covered < total {
        return Err(DataError::Binvox(format!(
            "run-length data can cover at most {} of {} voxels",
            covered, total
        )));
    }

    let mut grid = Array3::<f32>::zeros((nx, ny, nz));
    let mut cursor = 0usize;
    for pair in bytes.chunks_exact(2) {
        let (value, count) = (pair[0], pair[1] as usize);
        if cursor + count > total {
            return Err(DataError::Binvox(format!(
                "run-length data overflows {}x{}x{} grid",
                nx, ny, nz
            )));
        }
        if value != 0 {
            for i in cursor..cursor + count {
                let x = i / (nz * ny);
                let z = (i / ny) % nz;
                let y = i % ny;
                grid[[x, y, z]] = 1.0;
            }
        }
        cursor += count;
    }
    if cursor != total {
        return Err(DataError::Binvox(format!(
            "run-length data covers {} of {} voxels",
            cursor, total
        )));
    }

    Ok(Binvox {
        header: BinvoxHeader {
            dims,
            translate,
            scale,
        },
        grid,
    })
}

/// Read a `.binvox` file from disk.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_binvox(path: &Path) -> Result<Binvox, DataError> {
    let binvox = read_binvox(File::open(path)?)?;
    debug!("Loaded binvox grid {:?}", binvox.header.dims);
    Ok(binvox)
}

/// Encode an occupancy grid (values above 0.5 are occupied).
pub fn write_binvox<S, W>(
    mut w: W,
    grid: &ArrayBase<S, Ix3>,
    translate: Vec3,
    scale: f32,
) -> Result<(), DataError>
where
    S: Data<Elem = f32>,
    W: Write,
{
    let (nx, ny, nz) = grid.dim();
    writeln!(w, "#binvox 1")?;
    writeln!(w, "dim {} {} {}", nx, nz, ny)?;
    writeln!(w, "translate {} {} {}", translate.x, translate.y, translate.z)?;
    writeln!(w, "scale {}", scale)?;
    writeln!(w, "data")?;

    let mut run: Option<(u8, u8)> = None;
    for x in 0..nx {
        for z in 0..nz {
            for y in 0..ny {
                let value = (grid[[x, y, z]] > 0.5) as u8;
                run = match run {
                    Some((current, count)) if current == value && count < u8::MAX => {
                        Some((current, count + 1))
                    }
                    Some((current, count)) => {
                        w.write_all(&[current, count])?;
                        Some((value, 1))
                    }
                    None => Some((value, 1)),
                };
            }
        }
    }
    if let Some((current, count)) = run {
        w.write_all(&[current, count])?;
    }
    Ok(())
}
