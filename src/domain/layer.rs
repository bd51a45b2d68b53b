//! Feature layers and the geometry operations applied to them
//!
//! A [`Layer`] is an ordered list of [`Feature`]s, each pairing a geometry with
//! arbitrary attributes. Operations never mutate a layer in place: buffer,
//! repair and clip all return a new layer carrying the same attributes.

use geo::{
    coord, unary_union, BooleanOps, BoundingRect, Buffer, Geometry, GeometryCollection,
    HasDimensions, Intersects, LineString, MultiLineString, MultiPoint, MultiPolygon, Rect,
};
use geo::algorithm::bool_ops::FillRule;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Expected a polygonal geometry, got {0}")]
    NotPolygonal(&'static str),

    #[error("Polygon is not convex")]
    NotConvex,

    #[error("Polygon ring needs at least 3 distinct vertices, got {0}")]
    DegenerateRing(usize),
}

/// Returns a short name for the geometry variant, used in error messages
pub fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Converts any areal geometry into a multi-polygon
///
/// Geometry collections are accepted as long as every member is areal.
pub fn to_multi_polygon(geometry: &Geometry<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon.clone()])),
        Geometry::MultiPolygon(multi) => Ok(multi.clone()),
        Geometry::Rect(rect) => Ok(MultiPolygon::new(vec![rect.to_polygon()])),
        Geometry::Triangle(triangle) => Ok(MultiPolygon::new(vec![triangle.to_polygon()])),
        Geometry::GeometryCollection(collection) => {
            let mut polygons = Vec::new();
            for member in collection.iter() {
                polygons.extend(to_multi_polygon(member)?.0);
            }
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(GeometryError::NotPolygonal(geometry_kind(other))),
    }
}

/// Smallest rectangle covering both inputs
pub(crate) fn merge_bounds(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}

/// A geometry together with its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<A> {
    pub geometry: Geometry<f64>,
    pub attributes: A,
}

impl<A> Feature<A> {
    pub fn new(geometry: impl Into<Geometry<f64>>, attributes: A) -> Self {
        Self {
            geometry: geometry.into(),
            attributes,
        }
    }

    /// Bounding box of the geometry, `None` when it is empty
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
    }
}

/// An ordered collection of features
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<A> {
    features: Vec<Feature<A>>,
}

impl<A> Layer<A> {
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    pub fn push(&mut self, feature: Feature<A>) {
        self.features.push(feature);
    }

    pub fn features(&self) -> &[Feature<A>] {
        &self.features
    }

    pub fn into_features(self) -> Vec<Feature<A>> {
        self.features
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature<A>> {
        self.features.iter()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterates over the geometries only
    pub fn geometries(&self) -> impl Iterator<Item = &Geometry<f64>> {
        self.features.iter().map(|f| &f.geometry)
    }

    /// Combined bounding box of all non-empty features
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(Feature::bounds)
            .reduce(merge_bounds)
    }

    /// Number of features whose geometry is empty
    pub fn empty_count(&self) -> usize {
        self.features.iter().filter(|f| f.is_empty()).count()
    }

    /// Removes features with empty geometries
    pub fn drop_empty(self) -> Self {
        self.features
            .into_iter()
            .filter(|f| !f.is_empty())
            .collect()
    }
}

impl Layer<()> {
    /// Builds an attribute-less layer from bare geometries
    pub fn from_geometries<G: Into<Geometry<f64>>>(geometries: impl IntoIterator<Item = G>) -> Self {
        geometries
            .into_iter()
            .map(|g| Feature::new(g, ()))
            .collect()
    }
}

impl<A> Default for Layer<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> FromIterator<Feature<A>> for Layer<A> {
    fn from_iter<I: IntoIterator<Item = Feature<A>>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl<A> IntoIterator for Layer<A> {
    type Item = Feature<A>;
    type IntoIter = std::vec::IntoIter<Feature<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl<'a, A> IntoIterator for &'a Layer<A> {
    type Item = &'a Feature<A>;
    type IntoIter = std::slice::Iter<'a, Feature<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

impl<A: Clone> Layer<A> {
    fn map_geometry(&self, f: impl Fn(&Geometry<f64>) -> Geometry<f64>) -> Self {
        self.features
            .iter()
            .map(|feature| Feature {
                geometry: f(&feature.geometry),
                attributes: feature.attributes.clone(),
            })
            .collect()
    }

    /// Replaces each geometry by its buffer at `distance`
    ///
    /// Negative distances erode polygons. A zero distance normalizes areal
    /// geometries and empties points and lines, like a zero-width buffer.
    pub fn buffer(&self, distance: f64) -> Self {
        debug!(distance, features = self.len(), "buffering layer");
        self.map_geometry(|geometry| buffer_geometry(geometry, distance))
    }

    /// Attempts to fix broken geometries (no guarantees)
    ///
    /// Each polygon is re-noded with the even-odd rule, so every lobe of a
    /// self-intersecting ring is kept and holes stay holes. The parts are
    /// then merged through a unary union.
    pub fn repair(&self) -> Self {
        debug!(features = self.len(), "repairing layer");
        self.map_geometry(|geometry| Geometry::MultiPolygon(repair_geometry(geometry)))
    }

    /// Clips the layer to an areal `shape`
    ///
    /// Features outside the shape, or whose intersection with it is empty,
    /// are dropped. The remaining features keep their relative order.
    pub fn clip(&self, shape: &Geometry<f64>) -> Result<Self, GeometryError> {
        let window = to_multi_polygon(shape)?;
        let Some(window_bounds) = window.bounding_rect() else {
            return Ok(Self::new());
        };

        let clipped: Self = self
            .features
            .iter()
            .filter(|f| f.bounds().is_some_and(|b| b.intersects(&window_bounds)))
            .filter_map(|f| {
                let geometry = clip_geometry(&f.geometry, &window);
                (!geometry.is_empty()).then(|| Feature {
                    geometry,
                    attributes: f.attributes.clone(),
                })
            })
            .collect();

        debug!(before = self.len(), after = clipped.len(), "clipped layer");
        Ok(clipped)
    }
}

fn buffer_geometry(geometry: &Geometry<f64>, distance: f64) -> Geometry<f64> {
    if distance == 0.0 {
        return Geometry::MultiPolygon(repair_geometry(geometry));
    }
    Geometry::MultiPolygon(geometry.buffer(distance))
}

fn repair_geometry(geometry: &Geometry<f64>) -> MultiPolygon<f64> {
    match to_multi_polygon(geometry) {
        Ok(multi) => {
            let none = MultiPolygon::new(vec![]);
            let parts: Vec<MultiPolygon<f64>> = multi
                .iter()
                .map(|polygon| polygon.union_with_fill_rule(&none, FillRule::EvenOdd))
                .collect();
            unary_union(parts.iter())
        }
        Err(_) => MultiPolygon::new(vec![]),
    }
}

fn clip_geometry(geometry: &Geometry<f64>, window: &MultiPolygon<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Point(point) if window.intersects(point) => Geometry::Point(*point),
        Geometry::Point(_) => Geometry::MultiPoint(MultiPoint::new(vec![])),
        Geometry::MultiPoint(points) => Geometry::MultiPoint(MultiPoint::new(
            points.iter().filter(|p| window.intersects(*p)).copied().collect(),
        )),
        Geometry::Line(line) => {
            let lines = MultiLineString::new(vec![LineString::new(vec![line.start, line.end])]);
            Geometry::MultiLineString(window.clip(&lines, false))
        }
        Geometry::LineString(line) => {
            let lines = MultiLineString::new(vec![line.clone()]);
            Geometry::MultiLineString(window.clip(&lines, false))
        }
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(window.clip(lines, false)),
        Geometry::Polygon(polygon) => Geometry::MultiPolygon(polygon.intersection(window)),
        Geometry::MultiPolygon(multi) => Geometry::MultiPolygon(multi.intersection(window)),
        Geometry::Rect(rect) => Geometry::MultiPolygon(rect.to_polygon().intersection(window)),
        Geometry::Triangle(triangle) => {
            Geometry::MultiPolygon(triangle.to_polygon().intersection(window))
        }
        Geometry::GeometryCollection(collection) => {
            Geometry::GeometryCollection(GeometryCollection(
                collection
                    .iter()
                    .map(|member| clip_geometry(member, window))
                    .filter(|member| !member.is_empty())
                    .collect(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Area, Polygon};
    use proptest::prelude::*;

    const EPS: f64 = 1e-4;

    fn rect(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Polygon<f64> {
        Rect::new(coord! { x: minx, y: miny }, coord! { x: maxx, y: maxy }).to_polygon()
    }

    fn two_boxes() -> Layer<&'static str> {
        [
            Feature::new(rect(0.0, 1.0, 2.0, 3.0), "a"),
            Feature::new(rect(3.0, 1.0, 4.0, 2.0), "b"),
        ]
        .into_iter()
        .collect()
    }

    fn bounds_of(bounds: Option<Rect<f64>>) -> [f64; 4] {
        let r = bounds.expect("geometry should not be empty");
        [r.min().x, r.min().y, r.max().x, r.max().y]
    }

    fn assert_close(actual: [f64; 4], expected: [f64; 4]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                (a - e).abs() <= EPS * e.abs().max(1.0),
                "bounds {:?} != {:?}",
                actual,
                expected
            );
        }
    }

    #[test]
    fn repair_keeps_valid_rectangles() {
        let layer = two_boxes();
        let repaired = layer.repair();

        assert_eq!(repaired.len(), layer.len());
        for (before, after) in layer.iter().zip(&repaired) {
            assert_close(bounds_of(after.bounds()), bounds_of(before.bounds()));
            let area_diff = after.geometry.unsigned_area() - before.geometry.unsigned_area();
            assert!(area_diff.abs() < EPS);
            assert_eq!(after.attributes, before.attributes);
        }
    }

    #[test]
    fn repair_resolves_self_intersection() {
        // Bowtie: the shoelace area of the raw ring cancels out to zero
        let bowtie = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0), (0.0, 0.0)]),
            vec![],
        );
        assert!(bowtie.unsigned_area() < EPS);

        let repaired = Layer::from_geometries([bowtie]).repair();
        let area = repaired.features()[0].geometry.unsigned_area();
        assert!((area - 2.0).abs() < EPS, "area was {}", area);
    }

    #[test]
    fn repair_merges_overlapping_parts_and_keeps_holes() {
        let overlapping = MultiPolygon::new(vec![rect(0.0, 0.0, 2.0, 2.0), rect(1.0, 0.0, 3.0, 2.0)]);
        let holed = Polygon::new(
            rect(0.0, 0.0, 4.0, 4.0).exterior().clone(),
            vec![rect(1.0, 1.0, 2.0, 2.0).exterior().clone()],
        );

        let repaired = Layer::from_geometries([Geometry::from(overlapping), holed.into()]).repair();
        let areas: Vec<f64> = repaired.geometries().map(|g| g.unsigned_area()).collect();

        assert!((areas[0] - 6.0).abs() < EPS, "area was {}", areas[0]);
        assert!((areas[1] - 15.0).abs() < EPS, "area was {}", areas[1]);
    }

    #[test]
    fn repair_empties_non_areal_geometries() {
        let line = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        let repaired = Layer::from_geometries([Geometry::from(line), point!(x: 1.0, y: 2.0).into()])
            .repair();

        assert_eq!(repaired.len(), 2);
        assert_eq!(repaired.empty_count(), 2);
        assert!(repaired.drop_empty().is_empty());
    }

    #[test]
    fn buffer_rectangles() {
        let layer = two_boxes();
        for distance in [0.0, -0.0, 0.1, 0.4, 1.0, 1234.0, -0.1, -0.4] {
            let buffered = layer.buffer(distance);
            assert_eq!(buffered.len(), 2);

            for (before, after) in layer.iter().zip(&buffered) {
                let [minx, miny, maxx, maxy] = bounds_of(before.bounds());
                assert_close(
                    bounds_of(after.bounds()),
                    [minx - distance, miny - distance, maxx + distance, maxy + distance],
                );
                assert_eq!(after.attributes, before.attributes);
            }
        }
    }

    #[test]
    fn buffer_point_becomes_disc() {
        let buffered = Layer::from_geometries([point!(x: 5.0, y: 5.0)]).buffer(2.0);
        let area = buffered.features()[0].geometry.unsigned_area();
        let disc = std::f64::consts::PI * 4.0;

        assert!((area - disc).abs() / disc < 0.05, "area was {}", area);
        assert_close(bounds_of(buffered.bounds()), [3.0, 3.0, 7.0, 7.0]);
    }

    #[test]
    fn buffer_does_not_touch_input() {
        let layer = two_boxes();
        let snapshot = layer.clone();
        let _ = layer.buffer(1.0);
        assert_eq!(layer, snapshot);
    }

    #[test]
    fn clip_rectangles() {
        let cases: [([f64; 4], Vec<[f64; 4]>); 4] = [
            ([0.0, 0.0, 4.0, 4.0], vec![[0.0, 1.0, 2.0, 3.0], [3.0, 1.0, 4.0, 2.0]]),
            ([0.0, 1.0, 2.0, 3.0], vec![[0.0, 1.0, 2.0, 3.0]]),
            ([3.0, 1.0, 4.0, 2.0], vec![[3.0, 1.0, 4.0, 2.0]]),
            ([1.0, 1.5, 3.5, 2.5], vec![[1.0, 1.5, 2.0, 2.5], [3.0, 1.5, 3.5, 2.0]]),
        ];

        let layer = two_boxes();
        for ([minx, miny, maxx, maxy], expected) in cases {
            let window = Geometry::Polygon(rect(minx, miny, maxx, maxy));
            let clipped = layer.clip(&window).unwrap();

            assert_eq!(clipped.len(), expected.len(), "window {:?}", [minx, miny, maxx, maxy]);
            for (feature, want) in clipped.iter().zip(expected) {
                assert_close(bounds_of(feature.bounds()), want);
            }
        }
    }

    #[test]
    fn clip_preserves_attribute_order() {
        let window = Geometry::Rect(Rect::new(coord! { x: -1.0, y: -1.0 }, coord! { x: 10.0, y: 10.0 }));
        let clipped = two_boxes().clip(&window).unwrap();
        let names: Vec<_> = clipped.iter().map(|f| f.attributes).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn clip_lines_and_points() {
        let layer = Layer::from_geometries([
            Geometry::from(LineString::from(vec![(-1.0, 0.5), (2.0, 0.5)])),
            point!(x: 0.5, y: 0.5).into(),
            point!(x: 5.0, y: 5.0).into(),
        ]);
        let window = Geometry::Polygon(rect(0.0, 0.0, 1.0, 1.0));
        let clipped = layer.clip(&window).unwrap();

        assert_eq!(clipped.len(), 2);
        assert_close(bounds_of(clipped.features()[0].bounds()), [0.0, 0.5, 1.0, 0.5]);
        assert_close(bounds_of(clipped.features()[1].bounds()), [0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn clip_requires_areal_shape() {
        let result = two_boxes().clip(&point!(x: 1.0, y: 1.0).into());
        assert_eq!(result, Err(GeometryError::NotPolygonal("Point")));
    }

    #[test]
    fn layer_bounds_cover_all_features() {
        assert_close(bounds_of(two_boxes().bounds()), [0.0, 1.0, 4.0, 3.0]);
        assert!(Layer::<()>::new().bounds().is_none());
    }

    #[test]
    fn to_multi_polygon_flattens_collections() {
        let collection = Geometry::GeometryCollection(GeometryCollection(vec![
            rect(0.0, 0.0, 1.0, 1.0).into(),
            rect(2.0, 2.0, 3.0, 3.0).into(),
        ]));
        assert_eq!(to_multi_polygon(&collection).unwrap().0.len(), 2);

        let line = Geometry::from(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]));
        assert_eq!(
            to_multi_polygon(&line),
            Err(GeometryError::NotPolygonal("LineString"))
        );
    }

    proptest! {
        #[test]
        fn buffer_grows_bounds_by_distance(
            minx in -100.0f64..100.0,
            miny in -100.0f64..100.0,
            width in 0.5f64..50.0,
            height in 0.5f64..50.0,
            distance in 0.01f64..10.0,
        ) {
            let layer = Layer::from_geometries([rect(minx, miny, minx + width, miny + height)]);
            let buffered = layer.buffer(distance);
            let [bx0, by0, bx1, by1] = bounds_of(buffered.bounds());
            let tol = 1e-3;

            prop_assert!((bx0 - (minx - distance)).abs() < tol);
            prop_assert!((by0 - (miny - distance)).abs() < tol);
            prop_assert!((bx1 - (minx + width + distance)).abs() < tol);
            prop_assert!((by1 - (miny + height + distance)).abs() < tol);
        }
    }
}
