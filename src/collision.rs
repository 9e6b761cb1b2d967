//! Detection of vehicles about to bump into each other, within a bounded zone.

use crate::math::{is_inside_circle, polygons_intersect, Point2d};
use crate::vehicle::{Leader, LeaderSource};
use crate::{VehicleId, VehicleSet};
use cgmath::prelude::*;
use itertools::iproduct;

/// The circular zone in which vehicles are checked for imminent collisions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BumpingZone {
    pub centre: Point2d,
    /// The radius in m.
    pub radius: f64,
}

/// Recomputes the bumping leaders of every vehicle.
///
/// A vehicle in the zone whose hitbox intersects the hurtbox of another vehicle in the
/// zone gets that vehicle as a bumping leader, unless the other vehicle is already
/// bumping into it. The gap runs from the front bumper to the nearest corner of the
/// other vehicle, along the heading.
pub(crate) fn detect_bumping(vehicles: &mut VehicleSet, zone: &BumpingZone, weight: f64) {
    for vehicle in vehicles.values_mut() {
        vehicle.clear_bumping();
    }

    let candidates: Vec<VehicleId> = vehicles
        .iter()
        .filter(|(_, v)| is_inside_circle(v.position(), zone.centre, zone.radius))
        .map(|(id, _)| id)
        .collect();

    for (id, other_id) in iproduct!(candidates.iter().copied(), candidates.iter().copied()) {
        if id == other_id {
            continue;
        }
        let (vehicle, other) = (&vehicles[id], &vehicles[other_id]);
        if other.is_bumping_into(id) || !polygons_intersect(&vehicle.hitbox(), &other.hurtbox()) {
            continue;
        }
        let leader = Leader {
            gap: vehicle.gap_to(other),
            vel: f64::max(0.0, other.vel() * other.direction().dot(vehicle.direction())),
            weight,
            source: LeaderSource::Vehicle(other_id),
        };
        log::trace!("{:?} is about to bump into {:?}", id, other_id);
        vehicles[id].add_bumping(leader);
    }
}
