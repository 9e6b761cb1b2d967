use crate::{SegmentId, VehicleId};

/// Errors produced while building or running a simulation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown segment {0}")]
    UnknownSegment(String),
    #[error("duplicate segment id {0} in scenario")]
    DuplicateSegment(u32),
    #[error("routing probabilities of segment {segment} sum to {sum}, expected 1")]
    InvalidProbabilities { segment: String, sum: f64 },
    #[error("negative routing probability {probability} in segment {segment}")]
    NegativeProbability { segment: String, probability: f64 },
    #[error("curved segment {0} has parallel tangent lines")]
    ParallelTangents(String),
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("segment {0} has no direction to inherit")]
    MissingDirection(String),
    #[error("vehicle {vehicle:?} on segment {segment:?} reached a non-finite state")]
    NonFiniteState {
        vehicle: VehicleId,
        segment: SegmentId,
    },
    #[error("router of segment {segment:?} resolved to unknown segment {target:?}")]
    UnknownRouteTarget {
        segment: SegmentId,
        target: SegmentId,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Checks that a configuration value is strictly positive and finite.
pub(crate) fn positive(name: &'static str, value: f64) -> Result<f64> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(Error::InvalidParameter { name, value })
    }
}
