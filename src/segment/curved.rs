use super::straight::Lane;
use super::{Base, CurvedAttributes};
use crate::math::{intersect_lines, normalized, ParametricCurve2d, Point2d, QuadraticBezier2d, Vector2d};
use crate::{Error, Result, SegmentId};

/// A curved road segment, approximated by a chain of straight parts sampled from
/// a quadratic Bézier curve.
///
/// Vehicles move from one part to the next internally; only the last part leads
/// out of the segment.
#[derive(Clone, Debug)]
pub struct CurvedSegment {
    pub(super) base: Base,
    /// The parts of the curve, from start to end.
    pub(super) parts: Vec<Lane>,
    /// The control points of the curve: the start, the intersection of the
    /// tangents and the end.
    control: [Point2d; 3],
}

impl CurvedSegment {
    pub(super) fn new(id: SegmentId, attribs: &CurvedAttributes) -> Result<Self> {
        let base = Base::new(id, &attribs.name, attribs.width, attribs.speed_limit)?;
        if attribs.parts == 0 {
            return Err(Error::InvalidParameter {
                name: "parts",
                value: 0.0,
            });
        }

        let start_dir = normalized(attribs.start_dir)?;
        let end_dir = normalized(attribs.end_dir)?;
        let corner = intersect_lines(attribs.start, start_dir, attribs.end, end_dir)
            .ok_or_else(|| Error::ParallelTangents(base.name.clone()))?;
        let control = [attribs.start, corner, attribs.end];

        let points = QuadraticBezier2d::new(&control).sample_points(attribs.parts);
        let parts = points
            .windows(2)
            .map(|pair| Lane::new(pair[0], pair[1]))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            base,
            parts,
            control,
        })
    }

    /// The control points of the Bézier curve the segment follows.
    pub fn control_points(&self) -> &[Point2d; 3] {
        &self.control
    }

    /// The direction of the first part.
    pub fn start_dir(&self) -> Vector2d {
        self.parts[0].dir()
    }

    /// The direction of the last part.
    pub fn end_dir(&self) -> Vector2d {
        self.parts[self.parts.len() - 1].dir()
    }
}
