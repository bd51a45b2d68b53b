//! Shapefile datasets
//!
//! A dataset is the `.shp`/`.shx`/`.dbf` triple (plus an optional `.prj`)
//! loaded into a [`Layer`] of dBASE records. Writes go to a sibling temp
//! directory first and each component is renamed into place afterwards, so
//! rewriting a dataset in place never reads from a half-written file.
//!
//! Component names follow the case of the `.shp` extension (`DATA.SHP` pairs
//! with `DATA.DBF`). A path without a `.shp` extension gets one appended.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use geo::{Geometry, LineString, MultiLineString, MultiPoint};
use shapefile::dbase::{self, Record, TableInfo};
use shapefile::{Shape, ShapeReader};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{geometry_kind, to_multi_polygon, Feature, GeometryError, Layer};

/// Components renamed into place after a write, in this order
const COMPONENTS: [&str; 3] = ["dbf", "shx", "shp"];

/// Sidecars describing the old contents; removed when a dataset is replaced
const STALE_SIDECARS: [&str; 5] = ["prj", "cpg", "qix", "sbn", "sbx"];

/// File name of the dataset inside a staging directory
const STAGED: &str = "staged.shp";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Shapefile(#[from] shapefile::Error),

    #[error("Missing dBASE table: {0}")]
    MissingTable(PathBuf),

    #[error("Shape {index} cannot be converted: {reason}")]
    Conversion { index: usize, reason: String },

    #[error("Shape {index} is a null shape; set `skip_null = true` under [shapefile] to drop such rows")]
    NullShape { index: usize },

    #[error("Shape {index} is a {shape_type}; Z and M values are only dropped when flattening is requested")]
    Measured {
        index: usize,
        shape_type: &'static str,
    },

    #[error("Cannot write {found} into a {expected} shapefile")]
    MixedGeometry {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Cannot write a {0} to a shapefile")]
    Unsupported(&'static str),

    #[error("{0} features have empty geometries")]
    EmptyGeometries(usize),

    #[error("Dataset is locked by another process: {0}")]
    Locked(PathBuf),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl DatasetError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Everything about a dataset besides its features
pub struct Schema {
    table_info: TableInfo,
    projection: Option<String>,
}

impl Schema {
    /// Contents of the `.prj` sidecar, if any
    pub fn projection(&self) -> Option<&str> {
        self.projection.as_deref()
    }
}

/// What [`Dataset::read_with`] accepts besides plain 2D shapes
///
/// The default is strict: null shapes and Z/M shapes are errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Drop rows whose shape is null, together with their attributes
    pub skip_null: bool,
    /// Accept Z/M shapes and keep only their X/Y coordinates
    pub flatten: bool,
}

/// How empty geometries are handled on write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyPolicy {
    /// Skip them with a warning
    Drop,
    /// Refuse to write the dataset
    Reject,
}

/// Outcome of [`Dataset::write`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub dropped: usize,
    pub shape_type: &'static str,
}

/// A shapefile loaded into memory
pub struct Dataset {
    layer: Layer<Record>,
    schema: Schema,
    skipped_null: usize,
}

impl Dataset {
    pub fn from_parts(layer: Layer<Record>, schema: Schema) -> Self {
        Self {
            layer,
            schema,
            skipped_null: 0,
        }
    }

    pub fn into_parts(self) -> (Layer<Record>, Schema) {
        (self.layer, self.schema)
    }

    pub fn layer(&self) -> &Layer<Record> {
        &self.layer
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of null-shape rows left out by [`ReadOptions::skip_null`]
    pub fn skipped_null(&self) -> usize {
        self.skipped_null
    }

    /// Reads every shape and record of the shapefile at `path`
    ///
    /// Null shapes and Z/M shapes are rejected; see [`Dataset::read_with`].
    pub fn read(path: &Path) -> Result<Self, DatasetError> {
        Self::read_with(path, ReadOptions::default())
    }

    pub fn read_with(path: &Path, options: ReadOptions) -> Result<Self, DatasetError> {
        let shp = shp_path(path);
        let mut reader = open_reader(&shp)?;
        let mut layer = Layer::new();
        let mut skipped_null = 0;

        for (index, item) in reader.iter_shapes_and_records().enumerate() {
            let (shape, record) = item?;
            if matches!(shape, Shape::NullShape) {
                if !options.skip_null {
                    return Err(DatasetError::NullShape { index });
                }
                warn!(index, "skipping null shape and its record");
                skipped_null += 1;
                continue;
            }
            if let Some(shape_type) = measured_type(&shape) {
                if !options.flatten {
                    return Err(DatasetError::Measured { index, shape_type });
                }
            }

            let geometry = Geometry::<f64>::try_from(shape).map_err(|e| DatasetError::Conversion {
                index,
                reason: e.to_string(),
            })?;
            layer.push(Feature::new(geometry, record));
        }

        let table_info = reader.into_table_info();
        let projection = match existing_component(&shp, "prj") {
            Some(prj) => Some(fs::read_to_string(&prj).map_err(|e| DatasetError::io(&prj, e))?),
            None => None,
        };
        debug!(features = layer.len(), skipped_null, path = %shp.display(), "read shapefile");

        Ok(Self {
            layer,
            schema: Schema {
                table_info,
                projection,
            },
            skipped_null,
        })
    }

    /// Writes the dataset to `path`, replacing any existing dataset there
    ///
    /// Sidecars of the replaced dataset that no longer describe it (`.prj`
    /// when there is no projection, `.cpg` and spatial indexes) are removed.
    pub fn write(self, path: &Path, empty: EmptyPolicy) -> Result<WriteSummary, DatasetError> {
        let empties = self.layer.empty_count();
        if empties > 0 && empty == EmptyPolicy::Reject {
            return Err(DatasetError::EmptyGeometries(empties));
        }
        let layer = self.layer.drop_empty();
        if empties > 0 {
            warn!(dropped = empties, "dropping features with empty geometries");
        }

        let kind = output_kind(&layer)?;
        let target = shp_path(path);
        let staging = StagingDir::create(&target)?;
        let staged = staging.path().join(STAGED);

        {
            let mut writer = shapefile::Writer::from_path_with_info(&staged, self.schema.table_info)?;
            for (index, feature) in layer.iter().enumerate() {
                write_feature(&mut writer, kind, feature).map_err(|e| with_index(e, index))?;
            }
        }

        if let Some(projection) = &self.schema.projection {
            let prj = staged.with_extension("prj");
            fs::write(&prj, projection).map_err(|e| DatasetError::io(&prj, e))?;
        }

        staging.commit(&target, self.schema.projection.is_some())?;
        debug!(features = layer.len(), path = %target.display(), "wrote shapefile");

        Ok(WriteSummary {
            written: layer.len(),
            dropped: empties,
            shape_type: kind.name(),
        })
    }
}

/// Returns true if both paths name the same `.shp` on disk
pub fn is_same_dataset(a: &Path, b: &Path) -> bool {
    match (canonical_shp(a), canonical_shp(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn canonical_shp(path: &Path) -> Option<PathBuf> {
    let shp = shp_path(path);
    if let Ok(canonical) = fs::canonicalize(&shp) {
        return Some(canonical);
    }
    let parent = match shp.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Some(fs::canonicalize(parent).ok()?.join(shp.file_name()?))
}

/// Exclusive advisory lock held while a dataset is rewritten in place
///
/// The lock lives on a `<name>.shp.lock` sidecar because the components
/// themselves are replaced by rename. The sidecar is left on disk when the
/// lock is released.
pub struct DatasetLock {
    file: File,
}

impl DatasetLock {
    pub fn acquire(dataset: &Path) -> Result<Self, DatasetError> {
        let path = with_suffix(&shp_path(dataset), ".lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| DatasetError::io(&path, e))?;

        file.try_lock_exclusive()
            .map_err(|_| DatasetError::Locked(dataset.to_path_buf()))?;

        Ok(Self { file })
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputKind {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

impl OutputKind {
    fn name(self) -> &'static str {
        match self {
            OutputKind::Point => "Point",
            OutputKind::Multipoint => "Multipoint",
            OutputKind::Polyline => "Polyline",
            OutputKind::Polygon => "Polygon",
        }
    }

    fn of(geometry: &Geometry<f64>) -> Result<Self, DatasetError> {
        match geometry {
            Geometry::Point(_) => Ok(OutputKind::Point),
            Geometry::MultiPoint(_) => Ok(OutputKind::Multipoint),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Ok(OutputKind::Polyline)
            }
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
                Ok(OutputKind::Polygon)
            }
            Geometry::GeometryCollection(_) => to_multi_polygon(geometry)
                .map(|_| OutputKind::Polygon)
                .map_err(|_| DatasetError::Unsupported("GeometryCollection")),
        }
    }

    /// Shape type able to hold both kinds, if any
    fn merge(self, other: Self) -> Option<Self> {
        use OutputKind::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Point, Multipoint) | (Multipoint, Point) => Some(Multipoint),
            _ => None,
        }
    }
}

/// Picks the single shapefile shape type for all features
///
/// An empty layer is written as polygons.
fn output_kind(layer: &Layer<Record>) -> Result<OutputKind, DatasetError> {
    let mut kind: Option<OutputKind> = None;
    for feature in layer.iter() {
        let next = OutputKind::of(&feature.geometry)?;
        kind = match kind {
            None => Some(next),
            Some(current) => Some(current.merge(next).ok_or(DatasetError::MixedGeometry {
                expected: current.name(),
                found: geometry_kind(&feature.geometry),
            })?),
        };
    }
    Ok(kind.unwrap_or(OutputKind::Polygon))
}

fn write_feature<W: std::io::Write + std::io::Seek>(
    writer: &mut shapefile::Writer<W>,
    kind: OutputKind,
    feature: &Feature<Record>,
) -> Result<(), DatasetError> {
    let record = &feature.attributes;
    match (kind, &feature.geometry) {
        (OutputKind::Point, Geometry::Point(point)) => {
            writer.write_shape_and_record(&shapefile::Point::from(*point), record)?
        }
        (OutputKind::Multipoint, Geometry::Point(point)) => {
            let points = MultiPoint::new(vec![*point]);
            writer.write_shape_and_record(&shapefile::Multipoint::from(points), record)?
        }
        (OutputKind::Multipoint, Geometry::MultiPoint(points)) => {
            writer.write_shape_and_record(&shapefile::Multipoint::from(points.clone()), record)?
        }
        (OutputKind::Polyline, geometry) => {
            let lines = to_multi_line_string(geometry)?;
            writer.write_shape_and_record(&shapefile::Polyline::from(lines), record)?
        }
        (OutputKind::Polygon, geometry) => {
            let polygons = to_multi_polygon(geometry)?;
            writer.write_shape_and_record(&shapefile::Polygon::from(polygons), record)?
        }
        (kind, geometry) => {
            return Err(DatasetError::MixedGeometry {
                expected: kind.name(),
                found: geometry_kind(geometry),
            })
        }
    }
    Ok(())
}

fn to_multi_line_string(geometry: &Geometry<f64>) -> Result<MultiLineString<f64>, DatasetError> {
    match geometry {
        Geometry::Line(line) => Ok(MultiLineString::new(vec![LineString::new(vec![
            line.start, line.end,
        ])])),
        Geometry::LineString(line) => Ok(MultiLineString::new(vec![line.clone()])),
        Geometry::MultiLineString(lines) => Ok(lines.clone()),
        other => Err(DatasetError::MixedGeometry {
            expected: OutputKind::Polyline.name(),
            found: geometry_kind(other),
        }),
    }
}

fn with_index(error: DatasetError, index: usize) -> DatasetError {
    match error {
        DatasetError::Geometry(e) => DatasetError::Conversion {
            index,
            reason: e.to_string(),
        },
        other => other,
    }
}

/// Z/M shape type name, or `None` for plain 2D shapes
fn measured_type(shape: &Shape) -> Option<&'static str> {
    match shape {
        Shape::PointM(_) => Some("PointM"),
        Shape::PointZ(_) => Some("PointZ"),
        Shape::PolylineM(_) => Some("PolylineM"),
        Shape::PolylineZ(_) => Some("PolylineZ"),
        Shape::PolygonM(_) => Some("PolygonM"),
        Shape::PolygonZ(_) => Some("PolygonZ"),
        Shape::MultipointM(_) => Some("MultipointM"),
        Shape::MultipointZ(_) => Some("MultipointZ"),
        Shape::Multipatch(_) => Some("Multipatch"),
        _ => None,
    }
}

fn open_reader(
    shp: &Path,
) -> Result<shapefile::Reader<BufReader<File>, BufReader<File>>, DatasetError> {
    let source = open(shp)?;
    let shapes = match existing_component(shp, "shx") {
        Some(shx) => ShapeReader::with_shx(source, open(&shx)?)?,
        None => ShapeReader::new(source)?,
    };
    let dbf = existing_component(shp, "dbf")
        .ok_or_else(|| DatasetError::MissingTable(component(shp, "dbf")))?;
    let records = dbase::Reader::new(open(&dbf)?).map_err(shapefile::Error::from)?;
    Ok(shapefile::Reader::new(shapes, records))
}

fn open(path: &Path) -> Result<BufReader<File>, DatasetError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| DatasetError::io(path, e))
}

/// Path of the `.shp` component; an existing `.shp` extension keeps its case
fn shp_path(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("shp") => path.to_path_buf(),
        _ => with_suffix(path, ".shp"),
    }
}

/// Sibling of `shp` with `ext` cased like the `.shp` extension
fn component(shp: &Path, ext: &str) -> PathBuf {
    if shp.extension().is_some_and(|e| e == "SHP") {
        shp.with_extension(ext.to_ascii_uppercase())
    } else {
        shp.with_extension(ext)
    }
}

/// Existing sibling of `shp` in either case, preferring the `.shp`'s case
fn existing_component(shp: &Path, ext: &str) -> Option<PathBuf> {
    [
        component(shp, ext),
        shp.with_extension(ext.to_ascii_lowercase()),
        shp.with_extension(ext.to_ascii_uppercase()),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_if_present(path: &Path) -> Result<(), DatasetError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(DatasetError::io(path, e)),
        _ => Ok(()),
    }
}

/// Sibling directory holding a dataset until it is renamed into place
struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    fn create(target: &Path) -> Result<Self, DatasetError> {
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = parent.join(format!(".{}.soilmap-{}", stem, std::process::id()));

        fs::create_dir_all(&path).map_err(|e| DatasetError::io(&path, e))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Moves every staged component next to `target` and clears stale sidecars
    fn commit(self, target: &Path, with_projection: bool) -> Result<(), DatasetError> {
        let staged = self.path.join(STAGED);
        let extensions = COMPONENTS
            .iter()
            .copied()
            .chain(with_projection.then_some("prj"));

        for ext in extensions {
            let from = staged.with_extension(ext);
            let to = component(target, ext);
            fs::rename(&from, &to).map_err(|e| DatasetError::io(&to, e))?;
        }

        for ext in STALE_SIDECARS {
            if ext == "prj" && with_projection {
                continue;
            }
            for stale in [
                target.with_extension(ext),
                target.with_extension(ext.to_ascii_uppercase()),
            ] {
                remove_if_present(&stale)?;
            }
        }
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
