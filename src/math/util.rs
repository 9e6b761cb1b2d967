use super::{Point2d, Vector2d};
use crate::{Error, Result};
use cgmath::prelude::*;

/// Below this length two points are treated as coincident, in m.
const COINCIDENT_EPSILON: f64 = 1e-9;

/// Rotates a vector 90 degrees anticlockwise.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// The unit vector pointing from `from` to `to`.
///
/// Fails with [Error::DegenerateGeometry] if the points coincide.
pub fn direction(from: Point2d, to: Point2d) -> Result<Vector2d> {
    normalized(to - from)
}

/// Normalises a vector, failing if it has (almost) no length.
pub fn normalized(vec: Vector2d) -> Result<Vector2d> {
    let mag = vec.magnitude();
    if mag < COINCIDENT_EPSILON || !mag.is_finite() {
        return Err(Error::DegenerateGeometry(format!(
            "cannot normalise vector ({}, {})",
            vec.x, vec.y
        )));
    }
    Ok(vec / mag)
}

/// A vector normal to the unit vector `dir`, scaled to `len`.
pub fn normal(dir: Vector2d, len: f64) -> Vector2d {
    rot90(dir) * len
}

/// Finds the intersection of two lines, each given by a point and a direction.
/// Returns `None` if the lines are parallel.
pub fn intersect_lines(p1: Point2d, d1: Vector2d, p2: Point2d, d2: Vector2d) -> Option<Point2d> {
    let denom = d1.perp_dot(d2);
    if denom.abs() < COINCIDENT_EPSILON {
        return None;
    }
    let t = (p2 - p1).perp_dot(d2) / denom;
    Some(p1 + d1 * t)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn direction_of_coincident_points_fails() {
        let p = Point2d::new(3.0, 4.0);
        assert!(matches!(direction(p, p), Err(Error::DegenerateGeometry(_))));
    }

    #[test]
    fn direction_is_unit() {
        let dir = direction(Point2d::new(0.0, 0.0), Point2d::new(3.0, 4.0)).unwrap();
        assert_approx_eq!(dir.x, 0.6);
        assert_approx_eq!(dir.y, 0.8);
    }

    #[test]
    fn perpendicular_lines_intersect() {
        let p = intersect_lines(
            Point2d::new(0.0, 0.0),
            Vector2d::new(1.0, 0.0),
            Point2d::new(5.0, -3.0),
            Vector2d::new(0.0, 2.0),
        )
        .unwrap();
        assert_approx_eq!(p.x, 5.0);
        assert_approx_eq!(p.y, 0.0);
    }

    #[test]
    fn parallel_lines_do_not_intersect() {
        let d = Vector2d::new(1.0, 1.0);
        assert!(intersect_lines(Point2d::new(0.0, 0.0), d, Point2d::new(0.0, 1.0), d).is_none());
    }
}
