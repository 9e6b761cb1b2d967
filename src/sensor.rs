use crate::{VehicleId, VehicleSet};
use std::collections::HashSet;

/// A record of a vehicle passing a sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    /// The simulation time, in s.
    pub t: f64,
    pub vehicle: VehicleId,
    /// Velocity in m/s.
    pub v: f64,
    /// Acceleration in m/s^2.
    pub a: f64,
    pub length: f64,
    pub width: f64,
    /// The distance the vehicle had travelled since it spawned, in m.
    pub total_distance: f64,
}

/// Records each vehicle passing a fixed point of a segment, once.
#[derive(Clone, Debug)]
pub struct Sensor {
    /// The position of the sensor as a fraction of the segment length.
    fraction: f64,
    /// The position of the sensor along the part of the segment it is placed on, in m.
    offset: f64,
    /// Vehicles on the part that have already been recorded.
    seen: HashSet<VehicleId>,
    observations: Vec<Observation>,
}

impl Sensor {
    pub(crate) fn new(fraction: f64, offset: f64) -> Self {
        Self {
            fraction,
            offset,
            seen: HashSet::new(),
            observations: vec![],
        }
    }

    /// The position of the sensor as a fraction of the segment length.
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Everything recorded so far, oldest first.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Records the vehicles of a part that have reached the sensor since the last call.
    pub(crate) fn watch(&mut self, on_part: &[VehicleId], vehicles: &VehicleSet, t: f64) {
        if !self.seen.is_empty() {
            let present: HashSet<VehicleId> = on_part.iter().copied().collect();
            self.seen.retain(|id| present.contains(id));
        }
        for id in on_part {
            let vehicle = &vehicles[*id];
            if vehicle.d() >= self.offset && self.seen.insert(*id) {
                log::trace!("Sensor at {} saw {:?}", self.fraction, id);
                self.observations.push(Observation {
                    t,
                    vehicle: *id,
                    v: vehicle.vel(),
                    a: vehicle.acc(),
                    length: vehicle.length(),
                    width: vehicle.width(),
                    total_distance: vehicle.total_distance(),
                });
            }
        }
    }
}
