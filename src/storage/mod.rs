//! # Storage Layer
//!
//! Reading and writing vector data and configuration.
//!
//! ## Formats
//!
//! | Data | Format | Entry point |
//! |------|--------|-------------|
//! | Datasets | ESRI shapefile (`.shp`/`.shx`/`.dbf`, optional `.prj`) | [`Dataset`] |
//! | Single shapes | WKT text, WKB binary, inline bounds | [`read_shape`] |
//! | Config | TOML | [`Config`] |
//!
//! ## Concurrency Safety
//!
//! - [`DatasetLock`] uses file locking (`fs2`) while a dataset is rewritten in place,
//!   whether by `--inplace` or by an output path that resolves to the input
//! - Dataset writes are atomic per component (temp directory + rename)

mod config;
mod dataset;
mod shape_io;

pub use config::{Config, ConfigError, DefaultFormat, ShapefileConfig, CONFIG_ENV};
pub use dataset::{
    is_same_dataset, Dataset, DatasetError, DatasetLock, EmptyPolicy, ReadOptions, Schema,
    WriteSummary,
};
pub use shape_io::{
    read_shape, read_shape_bytes, read_wkb, read_wkt, write_wkb, write_wkt, ShapeError,
};
