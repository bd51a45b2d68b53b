//! Reading and writing single shapes
//!
//! Shapes are exchanged as WKT text or WKB binary files. [`read_shape`] also
//! accepts inline definitions, which is what the CLI uses for `--clip`.

use std::fs;
use std::path::{Path, PathBuf};

use geo::{coord, Geometry, GeometryCollection, Rect};
use geo_traits::to_geo::ToGeoGeometry;
use thiserror::Error;
use tracing::debug;
use wkb::writer::WriteOptions;
use wkb::Endianness;
use wkt::{ToWkt, TryFromWkt};

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid WKT: {0}")]
    Wkt(String),

    #[error("Invalid WKB: {0}")]
    Wkb(String),

    #[error("Unknown shape file format: {0}")]
    UnknownFormat(PathBuf),

    #[error("Unknown shape definition: {0:?}")]
    UnknownShape(String),
}

impl ShapeError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Resolves a shape definition
///
/// Accepted forms, tried in order:
/// - path to an existing `.wkt` or `.wkb` file (other extensions are sniffed)
/// - bounds as `minx,miny,maxx,maxy`
/// - inline WKT
pub fn read_shape(definition: &str) -> Result<Geometry<f64>, ShapeError> {
    let path = Path::new(definition);
    if !definition.is_empty() && path.is_file() {
        return read_shape_file(path);
    }

    if let Some(bounds) = parse_bounds(definition) {
        debug!(definition, "shape parsed as bounds");
        return Ok(Geometry::Polygon(bounds.to_polygon()));
    }

    parse_wkt(definition).map_err(|_| ShapeError::UnknownShape(definition.to_string()))
}

/// Decodes a WKB blob in either byte order
///
/// Z and M values are dropped. Empty points have no `geo` equivalent and are
/// rejected.
pub fn read_shape_bytes(bytes: &[u8]) -> Result<Geometry<f64>, ShapeError> {
    let wkb = wkb::reader::read_wkb(bytes).map_err(|e| ShapeError::Wkb(e.to_string()))?;
    wkb.try_to_geometry()
        .ok_or_else(|| ShapeError::Wkb("empty points are not supported".to_string()))
}

fn read_shape_file(path: &Path) -> Result<Geometry<f64>, ShapeError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("wkt") => read_wkt(path),
        Some("wkb") => read_wkb(path),
        _ => read_wkt(path)
            .or_else(|_| read_wkb(path))
            .map_err(|_| ShapeError::UnknownFormat(path.to_path_buf())),
    }
}

/// Parses `minx,miny,maxx,maxy`
fn parse_bounds(definition: &str) -> Option<Rect<f64>> {
    let values: Vec<f64> = definition
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    match values[..] {
        [minx, miny, maxx, maxy] => Some(Rect::new(
            coord! { x: minx, y: miny },
            coord! { x: maxx, y: maxy },
        )),
        _ => None,
    }
}

fn parse_wkt(text: &str) -> Result<Geometry<f64>, ShapeError> {
    Geometry::<f64>::try_from_wkt_str(text.trim()).map_err(|e| ShapeError::Wkt(e.to_string()))
}

/// Reads a `.wkt` file
pub fn read_wkt(path: &Path) -> Result<Geometry<f64>, ShapeError> {
    let text = fs::read_to_string(path).map_err(|e| ShapeError::io(path, e))?;
    parse_wkt(&text)
}

/// Reads a `.wkb` file
pub fn read_wkb(path: &Path) -> Result<Geometry<f64>, ShapeError> {
    let bytes = fs::read(path).map_err(|e| ShapeError::io(path, e))?;
    read_shape_bytes(&bytes)
}

/// Writes a `.wkt` file
pub fn write_wkt(path: &Path, geometry: &Geometry<f64>) -> Result<(), ShapeError> {
    fs::write(path, geometry.wkt_string()).map_err(|e| ShapeError::io(path, e))
}

/// Writes a `.wkb` file
pub fn write_wkb(path: &Path, geometry: &Geometry<f64>) -> Result<(), ShapeError> {
    let mut bytes = Vec::new();
    let options = WriteOptions {
        endianness: Endianness::LittleEndian,
    };
    wkb::writer::write_geometry(&mut bytes, &wkb_compatible(geometry), &options)
        .map_err(|e| ShapeError::Wkb(e.to_string()))?;
    fs::write(path, bytes).map_err(|e| ShapeError::io(path, e))
}

/// WKB has no rectangle, triangle or bare line types
fn wkb_compatible(geometry: &Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Rect(rect) => Geometry::Polygon(rect.to_polygon()),
        Geometry::Triangle(triangle) => Geometry::Polygon(triangle.to_polygon()),
        Geometry::Line(line) => Geometry::LineString(geo::LineString::new(vec![line.start, line.end])),
        Geometry::GeometryCollection(collection) => Geometry::GeometryCollection(GeometryCollection(
            collection.iter().map(wkb_compatible).collect(),
        )),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Polygon;
    use tempfile::TempDir;

    fn unit_box() -> Geometry<f64> {
        Geometry::Polygon(
            Rect::new(coord! { x: 0.0, y: 1.0 }, coord! { x: 2.0, y: 3.0 }).to_polygon(),
        )
    }

    #[test]
    fn read_shape_from_bounds() {
        let shape = unit_box();
        assert_eq!(read_shape("0, 1, 2, 3").unwrap(), shape);
        assert_eq!(read_shape("0,1,2,+3").unwrap(), shape);
        assert_ne!(read_shape("0,-1,2,+3").unwrap(), shape);
    }

    #[test]
    fn read_shape_from_wkt_string() {
        let shape = unit_box();
        assert_eq!(read_shape(&shape.wkt_string()).unwrap(), shape);
    }

    #[test]
    fn read_shape_from_files() {
        let dir = TempDir::new().unwrap();
        let shape = unit_box();

        let wkt_path = dir.path().join("shape.wkt");
        write_wkt(&wkt_path, &shape).unwrap();
        assert_eq!(read_shape(wkt_path.to_str().unwrap()).unwrap(), shape);

        let wkb_path = dir.path().join("shape.wkb");
        write_wkb(&wkb_path, &shape).unwrap();
        assert_eq!(read_shape(wkb_path.to_str().unwrap()).unwrap(), shape);
    }

    #[test]
    fn read_shape_sniffs_unknown_extensions() {
        let dir = TempDir::new().unwrap();
        let shape = unit_box();

        let text_path = dir.path().join("shape.txt");
        write_wkt(&text_path, &shape).unwrap();
        assert_eq!(read_shape(text_path.to_str().unwrap()).unwrap(), shape);

        let binary_path = dir.path().join("shape.bin");
        write_wkb(&binary_path, &shape).unwrap();
        assert_eq!(read_shape(binary_path.to_str().unwrap()).unwrap(), shape);

        let junk_path = dir.path().join("shape.dat");
        fs::write(&junk_path, b"\xff\x00 not a shape").unwrap();
        assert!(matches!(
            read_shape(junk_path.to_str().unwrap()),
            Err(ShapeError::UnknownFormat(_))
        ));
    }

    #[test]
    fn read_shape_rejects_garbage() {
        for definition in ["", "0,1,2", "(0,1,2)", "this_file_shouldnt_exist.wkt"] {
            assert!(
                matches!(read_shape(definition), Err(ShapeError::UnknownShape(_))),
                "accepted {:?}",
                definition
            );
        }
    }

    #[test]
    fn rect_is_written_as_polygon() {
        let dir = TempDir::new().unwrap();
        let rect = Rect::new(coord! { x: 3.0, y: 1.0 }, coord! { x: 4.0, y: 2.0 });
        let path = dir.path().join("rect.wkb");

        write_wkb(&path, &Geometry::Rect(rect)).unwrap();
        let read: Polygon<f64> = read_wkb(&path).unwrap().try_into().unwrap();
        assert_eq!(read, rect.to_polygon());
    }

    #[test]
    fn malformed_wkb_is_an_error() {
        // bad byte-order marker, unknown geometry type, truncated coordinates
        let blobs: [&[u8]; 4] = [
            b"\xff\x00 not a shape",
            b"\x01\x63\x00\x00\x00",
            b"\x01\x01\x00\x00\x00\x00\x00",
            b"",
        ];
        for blob in blobs {
            assert!(
                matches!(read_shape_bytes(blob), Err(ShapeError::Wkb(_))),
                "accepted {:?}",
                blob
            );
        }
    }

    #[test]
    fn big_endian_wkb_is_read() {
        // POINT (1 2), XDR
        let mut blob = vec![0x00, 0x00, 0x00, 0x00, 0x01];
        blob.extend_from_slice(&1.0f64.to_be_bytes());
        blob.extend_from_slice(&2.0f64.to_be_bytes());

        assert_eq!(
            read_shape_bytes(&blob).unwrap(),
            Geometry::Point(geo::point!(x: 1.0, y: 2.0))
        );
    }

    #[test]
    fn wkt_round_trip_of_boxes() {
        let dir = TempDir::new().unwrap();
        for (i, shape) in [unit_box(), read_shape("3,1,4,2").unwrap()].iter().enumerate() {
            let path = dir.path().join(format!("shape{}.wkt", i));
            write_wkt(&path, shape).unwrap();
            assert_eq!(&read_wkt(&path).unwrap(), shape);
        }
    }
}
