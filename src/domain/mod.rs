//! Domain models for soilmap
//!
//! Vector features and the geometry operations on them, without any I/O
//! concerns.

mod layer;
mod locate;

pub use layer::{geometry_kind, to_multi_polygon, Feature, GeometryError, Layer};
pub use locate::{
    find_last_polygon_at_point, find_polygon_at_point, is_point_in_bounds,
    is_point_in_convex_polygon, is_point_in_polygon,
};
