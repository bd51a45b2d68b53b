//! # Command-Line Interface
//!
//! The `soilmap` program.
//!
//! ## Commands
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `shapefile` | Buffer, repair and clip the features of a shapefile |
//! | `help` | Show help for the program or one command |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Progress lines
//! - `json` - A single machine-parseable summary
//!
//! The default comes from `default_format` in the config file.
//!
//! ## Verbose Mode
//!
//! Use `--verbose` for debug output on stderr:
//! ```bash
//! soilmap --verbose shapefile parcels.shp --inplace --repair
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod logger;
mod output;
mod shapefile_cmd;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
