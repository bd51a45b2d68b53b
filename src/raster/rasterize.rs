//! Burning polygon values into grids

use geo::{Coord, Geometry};
use tracing::debug;

use super::{Grid, RasterError};
use crate::domain::{find_last_polygon_at_point, to_multi_polygon, Layer};

/// Index of the polygon covering each cell center, row-major
///
/// Polygons are burned in order, so where they overlap the later one wins.
pub fn burn_indices(
    grid: &Grid,
    polygons: &[Geometry<f64>],
) -> Result<Vec<Option<usize>>, RasterError> {
    for polygon in polygons {
        to_multi_polygon(polygon)?;
    }

    let layer = Layer::from_geometries(polygons.iter().cloned());
    let centers: Vec<Coord<f64>> = grid.cell_centers().collect();
    debug!(cells = centers.len(), polygons = polygons.len(), "burning polygons");

    Ok(find_last_polygon_at_point(&layer, &centers))
}

/// Rasterizes one value per polygon onto `grid`
///
/// Cells not covered by any polygon receive `nodata`. Values may be of any
/// cloneable type, strings included.
pub fn rasterize<T: Clone>(
    grid: &Grid,
    polygons: &[Geometry<f64>],
    values: &[T],
    nodata: T,
) -> Result<Vec<T>, RasterError> {
    check_len(polygons, values.len())?;
    let indices = burn_indices(grid, polygons)?;
    Ok(take(&indices, values, &nodata))
}

/// Rasterizes several value channels at once, returning one band per channel
pub fn rasterize_bands<T: Clone>(
    grid: &Grid,
    polygons: &[Geometry<f64>],
    bands: &[Vec<T>],
    nodata: T,
) -> Result<Vec<Vec<T>>, RasterError> {
    for band in bands {
        check_len(polygons, band.len())?;
    }
    let indices = burn_indices(grid, polygons)?;
    Ok(bands
        .iter()
        .map(|band| take(&indices, band, &nodata))
        .collect())
}

fn check_len(polygons: &[Geometry<f64>], values: usize) -> Result<(), RasterError> {
    if polygons.len() != values {
        return Err(RasterError::LengthMismatch {
            polygons: polygons.len(),
            values,
        });
    }
    Ok(())
}

fn take<T: Clone>(indices: &[Option<usize>], values: &[T], nodata: &T) -> Vec<T> {
    indices
        .iter()
        .map(|index| match index {
            Some(i) => values[*i].clone(),
            None => nodata.clone(),
        })
        .collect()
}
