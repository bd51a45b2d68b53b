//! `soilmap shapefile`: buffer, repair and clip the features of a shapefile

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use super::output::Output;
use crate::storage::{
    is_same_dataset, read_shape, Config, Dataset, DatasetLock, EmptyPolicy, ReadOptions,
};

const MISSING_OUTPUT: &str =
    "Missing output file name. You must specify either '--output' or '--inplace'!";

#[derive(Args)]
pub struct ShapefileArgs {
    /// Input shapefile
    pub input: PathBuf,

    /// Output file
    #[arg(long, short = 'o', value_name = "FILE", conflicts_with = "inplace")]
    pub output: Option<PathBuf>,

    /// Use input file as output file
    #[arg(long)]
    pub inplace: bool,

    /// Create buffer around each shape (negative values shrink)
    #[arg(long, value_name = "DISTANCE", allow_negative_numbers = true, value_parser = parse_distance)]
    pub buffer: Option<f64>,

    /// Attempt to repair broken geometries
    #[arg(long)]
    pub repair: bool,

    /// Clip to a shape: a .wkt/.wkb file, `minx,miny,maxx,maxy` or inline WKT
    #[arg(long, value_name = "SHAPE", allow_hyphen_values = true)]
    pub clip: Option<String>,
}

impl ShapefileArgs {
    fn destination(&self) -> Result<PathBuf> {
        match (&self.output, self.inplace) {
            (Some(path), _) => Ok(path.clone()),
            (None, true) => Ok(self.input.clone()),
            (None, false) => bail!(MISSING_OUTPUT),
        }
    }

    fn operations(&self) -> Vec<&'static str> {
        let mut ops = Vec::new();
        if self.buffer.is_some() {
            ops.push("buffer");
        }
        if self.repair {
            ops.push("repair");
        }
        if self.clip.is_some() {
            ops.push("clip");
        }
        ops
    }
}

pub fn run(args: ShapefileArgs, config: &Config, output: &Output) -> Result<()> {
    let destination = args.destination()?;

    // resolve the clip shape before touching any data
    let clip = args
        .clip
        .as_deref()
        .map(|definition| {
            read_shape(definition).with_context(|| format!("Invalid --clip shape: {}", definition))
        })
        .transpose()?;

    let _lock = if args.inplace || is_same_dataset(&args.input, &destination) {
        output.verbose_ctx("shapefile", &format!("Locking {}", args.input.display()));
        Some(DatasetLock::acquire(&args.input)?)
    } else {
        None
    };

    // buffer, repair and clip all produce 2D geometries
    let options = ReadOptions {
        skip_null: config.shapefile.skip_null,
        flatten: !args.operations().is_empty(),
    };

    output.status(&format!("Reading shapefile: {}", args.input.display()));
    let dataset = Dataset::read_with(&args.input, options)
        .with_context(|| format!("Failed to read shapefile: {}", args.input.display()))?;
    let skipped_null = dataset.skipped_null();
    let (mut layer, schema) = dataset.into_parts();
    let features_read = layer.len();
    output.verbose_ctx("shapefile", &format!("Read {} features", features_read));

    if let Some(distance) = args.buffer {
        output.status("Buffering geometries…");
        output.verbose_ctx("buffer", &format!("distance={}", distance));
        layer = layer.buffer(distance);
    }

    if args.repair {
        output.status("Repairing geometries…");
        layer = layer.repair();
    }

    if let Some(shape) = &clip {
        output.status("Clipping geometries…");
        layer = layer.clip(shape).context("Failed to clip geometries")?;
        output.verbose_ctx("clip", &format!("{} of {} features remain", layer.len(), features_read));
    }

    output.status(&format!("Writing to: {}", destination.display()));
    let policy = if config.shapefile.drop_empty {
        EmptyPolicy::Drop
    } else {
        EmptyPolicy::Reject
    };
    let summary = Dataset::from_parts(layer, schema)
        .write(&destination, policy)
        .with_context(|| format!("Failed to write shapefile: {}", destination.display()))?;
    output.verbose_ctx(
        "shapefile",
        &format!("Wrote {} {} features", summary.written, summary.shape_type),
    );

    if output.is_json() {
        output.data(&serde_json::json!({
            "input": args.input.display().to_string(),
            "output": destination.display().to_string(),
            "operations": args.operations(),
            "features_read": features_read,
            "features_written": summary.written,
            "skipped_null": skipped_null,
            "dropped_empty": summary.dropped,
            "shape_type": summary.shape_type,
        }));
    } else {
        if skipped_null > 0 {
            output.status(&format!("Skipped {} rows with null shapes", skipped_null));
        }
        if summary.dropped > 0 {
            output.status(&format!("Dropped {} features with empty geometries", summary.dropped));
        }
    }

    Ok(())
}

/// Parses a finite buffer distance
fn parse_distance(value: &str) -> Result<f64, String> {
    let distance: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("expected a number, got {:?}", value))?;
    if !distance.is_finite() {
        return Err(format!("expected a finite number, got {:?}", value));
    }
    Ok(distance)
}
