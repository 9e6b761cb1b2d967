//! Mathematical structs and functions.

pub use bezier::QuadraticBezier2d;
use cgmath::{Point2, Vector2};
pub use curve::ParametricCurve2d;
pub use polygon::{is_inside_circle, is_inside_rectangle, polygons_intersect};
pub use util::*;

mod bezier;
mod curve;
mod polygon;
mod util;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;
