//! Point location queries against bounds and polygons
//!
//! All tests are inclusive: a point on an edge counts as inside.

use geo::{Coord, Intersects, MultiPolygon, Point, Polygon, Rect};

use super::layer::{to_multi_polygon, GeometryError, Layer};

/// Tests each point against an axis-aligned bounding box
pub fn is_point_in_bounds(bounds: &Rect<f64>, points: &[Coord<f64>]) -> Vec<bool> {
    points.iter().map(|p| bounds_contain(bounds, p)).collect()
}

/// Tests each point against a polygon, holes included
pub fn is_point_in_polygon(polygon: &Polygon<f64>, points: &[Coord<f64>]) -> Vec<bool> {
    points
        .iter()
        .map(|p| polygon.intersects(&Point::from(*p)))
        .collect()
}

/// Tests each point against a convex polygon using half-planes
///
/// Only the exterior ring is considered. It may be wound either way.
pub fn is_point_in_convex_polygon(
    polygon: &Polygon<f64>,
    points: &[Coord<f64>],
) -> Result<Vec<bool>, GeometryError> {
    let ring = distinct_vertices(&polygon.exterior().0);
    if ring.len() < 3 {
        return Err(GeometryError::DegenerateRing(ring.len()));
    }
    let winding = convex_winding(&ring)?;

    Ok(points
        .iter()
        .map(|p| {
            edges(&ring).all(|(a, b)| winding * cross(a, b, *p) >= 0.0)
        })
        .collect())
}

/// Finds, for each point, the index of the first areal feature containing it
///
/// Non-areal features never match.
pub fn find_polygon_at_point<A>(layer: &Layer<A>, points: &[Coord<f64>]) -> Vec<Option<usize>> {
    let candidates = areal_candidates(layer);

    points
        .iter()
        .map(|p| {
            candidates.iter().position(|candidate| {
                candidate
                    .as_ref()
                    .is_some_and(|(bounds, shape)| candidate_contains(bounds, shape, p))
            })
        })
        .collect()
}

/// Like [`find_polygon_at_point`], but the last matching feature wins
pub fn find_last_polygon_at_point<A>(
    layer: &Layer<A>,
    points: &[Coord<f64>],
) -> Vec<Option<usize>> {
    let candidates = areal_candidates(layer);

    points
        .iter()
        .map(|p| {
            candidates.iter().rposition(|candidate| {
                candidate
                    .as_ref()
                    .is_some_and(|(bounds, shape)| candidate_contains(bounds, shape, p))
            })
        })
        .collect()
}

type Candidate = Option<(Rect<f64>, MultiPolygon<f64>)>;

fn areal_candidates<A>(layer: &Layer<A>) -> Vec<Candidate> {
    layer
        .iter()
        .map(|feature| {
            let bounds = feature.bounds()?;
            let shape = to_multi_polygon(&feature.geometry).ok()?;
            Some((bounds, shape))
        })
        .collect()
}

fn candidate_contains(bounds: &Rect<f64>, shape: &MultiPolygon<f64>, p: &Coord<f64>) -> bool {
    bounds_contain(bounds, p) && shape.intersects(&Point::from(*p))
}

fn bounds_contain(bounds: &Rect<f64>, p: &Coord<f64>) -> bool {
    let (min, max) = (bounds.min(), bounds.max());
    p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y
}

fn distinct_vertices(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut ring: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if ring.last() != Some(c) {
            ring.push(*c);
        }
    }
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

fn edges(ring: &[Coord<f64>]) -> impl Iterator<Item = (Coord<f64>, Coord<f64>)> + '_ {
    ring.iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|(a, b)| (*a, *b))
}

/// z-component of (b - a) x (p - a); positive when p is left of a->b
fn cross(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Returns 1.0 for counter-clockwise rings, -1.0 for clockwise ones
fn convex_winding(ring: &[Coord<f64>]) -> Result<f64, GeometryError> {
    let n = ring.len();
    let mut sign = 0.0;

    for i in 0..n {
        let turn = cross(ring[i], ring[(i + 1) % n], ring[(i + 2) % n]);
        if turn == 0.0 {
            continue;
        }
        let turn_sign = turn.signum();
        if sign == 0.0 {
            sign = turn_sign;
        } else if sign != turn_sign {
            return Err(GeometryError::NotConvex);
        }
    }

    if sign == 0.0 {
        // every vertex is collinear
        return Err(GeometryError::DegenerateRing(n));
    }
    Ok(sign)
}
