//! Affine pixel-to-world transforms and regular grids

use geo::{coord, Coord, Rect};
use serde::{Deserialize, Serialize};

use super::RasterError;

/// Affine transform from pixel `(col, row)` to world `(x, y)`
///
/// `x = a * col + b * row + c` and `y = d * col + e * row + f`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0);

    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Builds a transform from `[xscale, xshear, xoffset, yshear, yscale, yoffset]`
    pub fn from_coefficients(coefficients: [f64; 6]) -> Self {
        let [a, b, c, d, e, f] = coefficients;
        Self::new(a, b, c, d, e, f)
    }

    pub fn coefficients(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// North-up transform with pixel `(0, 0)` in the top left corner
    pub fn north_up(xmin: f64, ymax: f64, xres: f64, yres: f64) -> Self {
        Self::new(xres, 0.0, xmin, 0.0, -yres, ymax)
    }

    /// Derives the transform of a rectangular grid from its cell-center
    /// coordinates along each axis
    pub fn from_centers(xs: &[f64], ys: &[f64]) -> Result<Self, RasterError> {
        if xs.len() < 2 {
            return Err(RasterError::TooFewCoordinates { axis: "x", len: xs.len() });
        }
        if ys.len() < 2 {
            return Err(RasterError::TooFewCoordinates { axis: "y", len: ys.len() });
        }

        let dx = xs[1] - xs[0];
        let dy = ys[1] - ys[0];
        Ok(Self::new(dx, 0.0, xs[0] - dx / 2.0, 0.0, dy, ys[0] - dy / 2.0))
    }

    /// Maps fractional pixel coordinates to world coordinates
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        coord! {
            x: self.a * col + self.b * row + self.c,
            y: self.d * col + self.e * row + self.f,
        }
    }

    pub fn cell_center(&self, col: usize, row: usize) -> Coord<f64> {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// The world-to-pixel transform
    pub fn invert(&self) -> Result<Self, RasterError> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(RasterError::SingularTransform);
        }

        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Ok(Self::new(
            a,
            b,
            -(a * self.c + b * self.f),
            d,
            e,
            -(d * self.c + e * self.f),
        ))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A regular raster grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
}

impl Grid {
    pub fn new(width: usize, height: usize, transform: GeoTransform) -> Self {
        Self {
            width,
            height,
            transform,
        }
    }

    /// Grid whose cell centers are exactly `xs` by `ys`
    pub fn from_centers(xs: &[f64], ys: &[f64]) -> Result<Self, RasterError> {
        let transform = GeoTransform::from_centers(xs, ys)?;
        Ok(Self::new(xs.len(), ys.len(), transform))
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// World coordinates of every cell center, row-major
    pub fn cell_centers(&self) -> impl Iterator<Item = Coord<f64>> + '_ {
        (0..self.height)
            .flat_map(move |row| (0..self.width).map(move |col| self.transform.cell_center(col, row)))
    }

    /// World extent covered by the grid
    pub fn bounds(&self) -> Rect<f64> {
        let (w, h) = (self.width as f64, self.height as f64);
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(w, 0.0),
            self.transform.apply(0.0, h),
            self.transform.apply(w, h),
        ];
        let min = corners
            .iter()
            .fold(corners[0], |m, c| coord! { x: m.x.min(c.x), y: m.y.min(c.y) });
        let max = corners
            .iter()
            .fold(corners[0], |m, c| coord! { x: m.x.max(c.x), y: m.y.max(c.y) });
        Rect::new(min, max)
    }
}
