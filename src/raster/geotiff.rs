//! GeoTIFF output
//!
//! Each band is written as its own image directory carrying the same
//! georeferencing: a `ModelTransformation` matrix built from the grid's
//! [`GeoTransform`], a pixel-is-area GeoKey directory and the `GDAL_NODATA`
//! value. Band names go into `ImageDescription`.

use std::fmt::Display;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use ::tiff::encoder::colortype::{self, ColorType};
use ::tiff::encoder::{TiffEncoder, TiffValue};
use ::tiff::tags::Tag;
use ::tiff::TiffError;
use tracing::debug;

use super::{GeoTransform, Grid, RasterError};

/// Version 1.1.0 header plus `GTRasterTypeGeoKey = RasterPixelIsArea`
const GEO_KEYS: [u16; 8] = [1, 1, 0, 1, 1025, 0, 1, 1];

/// Pixel types that can be written as TIFF samples
pub trait Sample: Copy + Display {
    type Color: ColorType<Inner = Self>;
}

impl Sample for u8 {
    type Color = colortype::Gray8;
}

impl Sample for i16 {
    type Color = colortype::GrayI16;
}

impl Sample for i32 {
    type Color = colortype::GrayI32;
}

impl Sample for f32 {
    type Color = colortype::Gray32Float;
}

impl Sample for f64 {
    type Color = colortype::Gray64Float;
}

/// Writes row-major `bands` on `grid` to a GeoTIFF at `path`
///
/// `names` is either empty or holds one ASCII name per band. The file is
/// written next to `path` and renamed into place once complete.
pub fn write_tiff<T: Sample>(
    path: &Path,
    grid: &Grid,
    bands: &[Vec<T>],
    names: &[&str],
    nodata: T,
) -> Result<(), RasterError>
where
    [T]: TiffValue,
{
    if bands.is_empty() {
        return Err(RasterError::NoBands);
    }
    if !names.is_empty() && names.len() != bands.len() {
        return Err(RasterError::NameCount {
            bands: bands.len(),
            names: names.len(),
        });
    }
    for (band, values) in bands.iter().enumerate() {
        if values.len() != grid.len() {
            return Err(RasterError::BandSize {
                band,
                expected: grid.len(),
                found: values.len(),
            });
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = encode(&tmp, grid, bands, names, nodata) {
        let _ = fs::remove_file(&tmp);
        return Err(RasterError::tiff(path, e));
    }
    fs::rename(&tmp, path).map_err(|e| RasterError::tiff(path, e))?;

    debug!(bands = bands.len(), width = grid.width, height = grid.height, path = %path.display(), "wrote tiff");
    Ok(())
}

fn encode<T: Sample>(
    path: &Path,
    grid: &Grid,
    bands: &[Vec<T>],
    names: &[&str],
    nodata: T,
) -> Result<(), TiffError>
where
    [T]: TiffValue,
{
    let width = u32::try_from(grid.width)?;
    let height = u32::try_from(grid.height)?;
    let transform = model_transformation(&grid.transform);
    let nodata = nodata.to_string();

    let mut encoder = TiffEncoder::new(File::create(path)?)?;
    for (band, values) in bands.iter().enumerate() {
        let mut image = encoder.new_image::<T::Color>(width, height)?;
        let directory = image.encoder();
        directory.write_tag(Tag::ModelTransformationTag, &transform[..])?;
        directory.write_tag(Tag::GeoKeyDirectoryTag, &GEO_KEYS[..])?;
        directory.write_tag(Tag::GdalNodata, nodata.as_str())?;
        if let Some(name) = names.get(band) {
            directory.write_tag(Tag::ImageDescription, *name)?;
        }
        image.write_data(values.as_slice())?;
    }
    Ok(())
}

/// Row-major 4x4 raster-to-model matrix
fn model_transformation(t: &GeoTransform) -> [f64; 16] {
    [
        t.a, t.b, 0.0, t.c, //
        t.d, t.e, 0.0, t.f, //
        0.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::tiff::decoder::{Decoder, DecodingResult};
    use tempfile::TempDir;

    fn grid() -> Grid {
        Grid::new(3, 2, GeoTransform::north_up(10.0, 20.0, 2.0, 1.0))
    }

    #[test]
    fn bands_and_georeferencing_are_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("soil.tif");
        let bands = vec![
            vec![1.0f32, 2.0, 3.0, 4.0, 5.0, -1.0],
            vec![0.5f32; 6],
        ];

        write_tiff(&path, &grid(), &bands, &["clay", "sand"], -1.0).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        for (band, expected) in bands.iter().enumerate() {
            if band > 0 {
                assert!(decoder.more_images());
                decoder.next_image().unwrap();
            }
            assert_eq!(decoder.dimensions().unwrap(), (3, 2));
            match decoder.read_image().unwrap() {
                DecodingResult::F32(values) => assert_eq!(&values, expected),
                _ => panic!("expected f32 samples"),
            }

            let transform = decoder.get_tag_f64_vec(Tag::ModelTransformationTag).unwrap();
            assert_eq!(
                transform,
                vec![2.0, 0.0, 0.0, 10.0, 0.0, -1.0, 0.0, 20.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]
            );
            let nodata = decoder.get_tag_ascii_string(Tag::GdalNodata).unwrap();
            assert_eq!(nodata.trim_end_matches('\0'), "-1");
            let name = decoder.get_tag_ascii_string(Tag::ImageDescription).unwrap();
            assert_eq!(name.trim_end_matches('\0'), ["clay", "sand"][band]);
        }
        assert!(!decoder.more_images());

        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn integer_bands_keep_their_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("classes.tif");

        write_tiff(&path, &grid(), &[vec![0i32, 1, 2, 3, 4, 5]], &[], -1).unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        match decoder.read_image().unwrap() {
            DecodingResult::I32(values) => assert_eq!(values, vec![0, 1, 2, 3, 4, 5]),
            _ => panic!("expected i32 samples"),
        }
    }

    #[test]
    fn band_shapes_are_checked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.tif");

        assert_eq!(
            write_tiff::<f32>(&path, &grid(), &[], &[], 0.0),
            Err(RasterError::NoBands)
        );
        assert_eq!(
            write_tiff(&path, &grid(), &[vec![0.0f32; 5]], &[], 0.0),
            Err(RasterError::BandSize { band: 0, expected: 6, found: 5 })
        );
        assert_eq!(
            write_tiff(&path, &grid(), &[vec![0.0f32; 6]], &["a", "b"], 0.0),
            Err(RasterError::NameCount { bands: 1, names: 2 })
        );
        assert!(!path.exists());
    }
}
