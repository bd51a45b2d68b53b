//! # Raster Helpers
//!
//! Regular grids described by an affine [`GeoTransform`], burning polygon
//! values into them, and writing the result as a GeoTIFF.
//!
//! ## Conventions
//!
//! - Pixel `(col, row)` maps to world coordinates through the transform
//! - Cell centers sit at `(col + 0.5, row + 0.5)` in pixel space
//! - Rasters are row-major: index `row * width + col`

mod geotiff;
mod rasterize;
mod transform;

use std::fmt::Display;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::GeometryError;

pub use geotiff::{write_tiff, Sample};
pub use rasterize::{burn_indices, rasterize, rasterize_bands};
pub use transform::{GeoTransform, Grid};

#[derive(Debug, Error, PartialEq)]
pub enum RasterError {
    #[error("Need at least 2 {axis} coordinates to derive a transform, got {len}")]
    TooFewCoordinates { axis: &'static str, len: usize },

    #[error("Transform is not invertible")]
    SingularTransform,

    #[error("Expected {polygons} values (one per polygon), got {values}")]
    LengthMismatch { polygons: usize, values: usize },

    #[error("Need at least one band to write")]
    NoBands,

    #[error("Band {band} has {found} values, the grid has {expected} cells")]
    BandSize {
        band: usize,
        expected: usize,
        found: usize,
    },

    #[error("Got {names} band names for {bands} bands")]
    NameCount { bands: usize, names: usize },

    #[error("Failed to write {path}: {reason}")]
    Tiff { path: PathBuf, reason: String },

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl RasterError {
    fn tiff(path: &Path, reason: impl Display) -> Self {
        Self::Tiff {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
