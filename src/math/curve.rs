use super::{Point2d, Vector2d};
use crate::util::Interval;

/// A parametric curve in 2D space.
pub trait ParametricCurve2d {
    /// Samples the parametric curve.
    fn sample(&self, t: f64) -> Point2d;

    /// Returns the minimum and maximum t-values that define the bounds of the curve.
    fn bounds(&self) -> Interval<f64>;

    /// Samples the derivative of the parametric curve.
    ///
    /// The default implementation approximates the derivative by sampling
    /// two very nearby points along the curve.
    fn sample_dt(&self, t: f64) -> Vector2d {
        let delta = self.bounds().length() * 0.0001;
        let p1 = self.sample(t);
        let p2 = self.sample(t + delta);
        (p2 - p1) / delta
    }

    /// Samples `n + 1` points evenly spaced in `t`, including both ends.
    fn sample_points(&self, n: usize) -> Vec<Point2d> {
        let bounds = self.bounds();
        (0..=n)
            .map(|i| bounds.lerp(i as f64 / n as f64))
            .map(|t| self.sample(t))
            .collect()
    }
}
