//! soilmap - Digital soil mapping toolkit
//!
//! Vector layers of attributed features with buffer, repair and clip
//! operations, point location queries, shapefile and WKT/WKB storage, and
//! rasterization of polygon values onto regular grids with GeoTIFF output.
//! The `soilmap` binary exposes the shapefile operations on the command line.

pub mod domain;
pub mod storage;
pub mod raster;
pub mod cli;

pub use domain::{Feature, GeometryError, Layer};
