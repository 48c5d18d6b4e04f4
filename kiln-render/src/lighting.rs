//! Ambient lighting.
//!
//! Ambient light is a constant color contribution added to every point of
//! every batch element, independent of surface normal or view direction.
//!
//! Intensity and color are not range checked. Negative values or values
//! above one are valid inputs and are applied as given.

use crate::RenderError;
use glam::Vec3;
use ndarray::{Array1, Array2, Array3, ArrayBase, Data, Ix3, arr1};
use tracing::trace;

/// Default ambient intensity.
pub const DEFAULT_INTENSITY: f32 = 0.5;

/// Color argument accepted by the ambient lighting functions.
///
/// Each variant is one accepted representation. All of them resolve to a
/// single RGB triple broadcast across the batch, except [`LightColor::PerBatch`]
/// which carries one row per batch element.
#[derive(Debug, Clone, PartialEq)]
pub enum LightColor {
    /// Fixed RGB triple.
    Tuple(f32, f32, f32),
    /// Dynamically sized list, must hold exactly three values.
    List(Vec<f32>),
    /// One dimensional array, must hold exactly three values.
    Array(Array1<f32>),
    /// `(B, 3)` colors, row `b` applies to batch element `b`.
    /// A single row broadcasts across the batch.
    PerBatch(Array2<f32>),
}

/// Color after boundary resolution.
#[derive(Debug, Clone, PartialEq)]
enum ResolvedColor {
    Uniform(Vec3),
    PerBatch(Array2<f32>),
}

impl LightColor {
    pub fn tuple(r: f32, g: f32, b: f32) -> Self {
        Self::Tuple(r, g, b)
    }

    pub fn from_list(values: Vec<f32>) -> Self {
        Self::List(values)
    }

    pub fn from_array(values: Array1<f32>) -> Self {
        Self::Array(values)
    }

    pub fn per_batch(colors: Array2<f32>) -> Self {
        Self::PerBatch(colors)
    }

    /// Resolve a broadcastable color to its canonical RGB vector.
    ///
    /// Fails for per-batch colors with more than one row.
    pub fn to_vec3(&self) -> Result<Vec3, RenderError> {
        match self.resolve()? {
            ResolvedColor::Uniform(rgb) => Ok(rgb),
            ResolvedColor::PerBatch(colors) => Err(RenderError::ColorBatch {
                colors: colors.nrows(),
                batch: 1,
            }),
        }
    }

    fn resolve(&self) -> Result<ResolvedColor, RenderError> {
        fn triple(values: &[f32]) -> Result<Vec3, RenderError> {
            match values {
                [r, g, b] => Ok(Vec3::new(*r, *g, *b)),
                _ => Err(RenderError::ColorLength(values.len())),
            }
        }

        match self {
            Self::Tuple(r, g, b) => Ok(ResolvedColor::Uniform(Vec3::new(*r, *g, *b))),
            Self::List(values) => triple(values).map(ResolvedColor::Uniform),
            Self::Array(values) => {
                triple(&values.iter().copied().collect::<Vec<_>>()).map(ResolvedColor::Uniform)
            }
            Self::PerBatch(colors) => {
                if colors.ncols() != 3 {
                    return Err(RenderError::ColorLength(colors.ncols()));
                }
                if colors.nrows() == 1 {
                    let row = colors.row(0);
                    Ok(ResolvedColor::Uniform(Vec3::new(row[0], row[1], row[2])))
                } else {
                    Ok(ResolvedColor::PerBatch(colors.clone()))
                }
            }
        }
    }
}

impl Default for LightColor {
    fn default() -> Self {
        Self::Tuple(1.0, 1.0, 1.0)
    }
}

impl From<(f32, f32, f32)> for LightColor {
    fn from((r, g, b): (f32, f32, f32)) -> Self {
        Self::Tuple(r, g, b)
    }
}

impl From<[f32; 3]> for LightColor {
    fn from([r, g, b]: [f32; 3]) -> Self {
        Self::Tuple(r, g, b)
    }
}

impl From<Vec3> for LightColor {
    fn from(rgb: Vec3) -> Self {
        Self::Tuple(rgb.x, rgb.y, rgb.z)
    }
}

impl From<Vec<f32>> for LightColor {
    fn from(values: Vec<f32>) -> Self {
        Self::List(values)
    }
}

impl From<Array1<f32>> for LightColor {
    fn from(values: Array1<f32>) -> Self {
        Self::Array(values)
    }
}

/// Double precision arrays are narrowed to the light tensor's `f32`.
impl From<Array1<f64>> for LightColor {
    fn from(values: Array1<f64>) -> Self {
        Self::Array(values.mapv(|v| v as f32))
    }
}

impl From<Array2<f32>> for LightColor {
    fn from(colors: Array2<f32>) -> Self {
        Self::PerBatch(colors)
    }
}

fn check_channels(shape: &[usize]) -> Result<(), RenderError> {
    if shape[2] != 3 {
        return Err(RenderError::Channels(shape.to_vec()));
    }
    Ok(())
}

/// Add `intensity * color` to every point of a `(B, N, 3)` light tensor, in place.
///
/// The same buffer is handed back, so callers holding the returned reference
/// and callers reading `light` afterwards observe the same data.
pub fn ambient_lighting_mut<'a>(
    light: &'a mut Array3<f32>,
    intensity: f32,
    color: &LightColor,
) -> Result<&'a mut Array3<f32>, RenderError> {
    check_channels(light.shape())?;
    trace!(shape = ?light.shape(), intensity, "ambient lighting");

    match color.resolve()? {
        ResolvedColor::Uniform(rgb) => {
            let delta = arr1(&(rgb * intensity).to_array());
            *light += &delta;
        }
        ResolvedColor::PerBatch(colors) => {
            let batch = light.shape()[0];
            if colors.nrows() != batch {
                return Err(RenderError::ColorBatch {
                    colors: colors.nrows(),
                    batch,
                });
            }
            for (mut points, rgb) in light.outer_iter_mut().zip(colors.outer_iter()) {
                points += &(&rgb * intensity);
            }
        }
    }

    Ok(light)
}

/// Pure variant of [`ambient_lighting_mut`]: the input is left untouched and
/// a new tensor is returned.
pub fn ambient_lighting<S>(
    light: &ArrayBase<S, Ix3>,
    intensity: f32,
    color: &LightColor,
) -> Result<Array3<f32>, RenderError>
where
    S: Data<Elem = f32>,
{
    let mut out = light.to_owned();
    ambient_lighting_mut(&mut out, intensity, color)?;
    Ok(out)
}

/// Ambient light parameters with the rasterizer's defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbientLight {
    pub intensity: f32,
    pub color: LightColor,
}

impl AmbientLight {
    pub fn new(intensity: f32, color: impl Into<LightColor>) -> Self {
        Self {
            intensity,
            color: color.into(),
        }
    }

    pub fn apply<S>(&self, light: &ArrayBase<S, Ix3>) -> Result<Array3<f32>, RenderError>
    where
        S: Data<Elem = f32>,
    {
        ambient_lighting(light, self.intensity, &self.color)
    }

    pub fn apply_mut<'a>(
        &self,
        light: &'a mut Array3<f32>,
    ) -> Result<&'a mut Array3<f32>, RenderError> {
        ambient_lighting_mut(light, self.intensity, &self.color)
    }
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            intensity: DEFAULT_INTENSITY,
            color: LightColor::default(),
        }
    }
}
