//! Containment and intersection tests for simple shapes.

use super::{rot90, Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;

/// Returns true if `point` lies inside the rectangle given by its four corners, in order.
pub fn is_inside_rectangle(point: Point2d, rect: &[Point2d; 4]) -> bool {
    let [a, b, _, d] = *rect;
    let am = point - a;
    let ab = b - a;
    let ad = d - a;
    Interval::new(0.0, ab.dot(ab)).contains(am.dot(ab))
        && Interval::new(0.0, ad.dot(ad)).contains(am.dot(ad))
}

/// Returns true if `point` lies inside the circle (boundary included).
pub fn is_inside_circle(point: Point2d, centre: Point2d, radius: f64) -> bool {
    (point - centre).magnitude2() <= radius * radius
}

/// Separating axis test for two convex polygons.
/// Polygons that only touch are considered intersecting.
pub fn polygons_intersect(a: &[Point2d], b: &[Point2d]) -> bool {
    edge_normals(a)
        .chain(edge_normals(b))
        .all(|axis| match (project(a, axis), project(b, axis)) {
            (Some(pa), Some(pb)) => pa.overlaps(&pb),
            _ => false,
        })
}

fn edge_normals(poly: &[Point2d]) -> impl Iterator<Item = Vector2d> + '_ {
    let n = poly.len();
    (0..n).map(move |i| rot90(poly[(i + 1) % n] - poly[i]))
}

fn project(poly: &[Point2d], axis: Vector2d) -> Option<Interval<f64>> {
    Interval::hull(poly.iter().map(|p| p.to_vec().dot(axis)))
}
