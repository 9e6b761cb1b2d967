use super::{Base, StraightAttributes};
use crate::math::{direction, Point2d, Vector2d};
use crate::sensor::Sensor;
use crate::{Result, SegmentId, VehicleId, VehicleSet};
use cgmath::prelude::*;

/// A straight road segment.
#[derive(Clone, Debug)]
pub struct StraightSegment {
    pub(super) base: Base,
    pub(super) lane: Lane,
    /// Whether arrows are painted along the segment.
    lane_markings: bool,
}

/// A straight stretch of road holding vehicles, ordered front first.
///
/// A straight segment is a single lane; a curved segment is a chain of them.
#[derive(Clone, Debug)]
pub struct Lane {
    start: Point2d,
    end: Point2d,
    /// Unit vector from `start` to `end`.
    dir: Vector2d,
    length: f64,
    /// The vehicles on the lane, in descending order of position.
    vehicles: Vec<VehicleId>,
    sensors: Vec<Sensor>,
}

impl StraightSegment {
    pub(super) fn new(id: SegmentId, attribs: &StraightAttributes) -> Result<Self> {
        let base = Base::new(id, &attribs.name, attribs.width, attribs.speed_limit)?;
        Ok(Self {
            base,
            lane: Lane::new(attribs.start, attribs.end)?,
            lane_markings: attribs.lane_markings,
        })
    }

    /// The anchor points of the lane marking arrows, one every `period` metres.
    pub fn arrows(&self, period: f64) -> Vec<Point2d> {
        if !self.lane_markings || period <= 0.0 {
            return vec![];
        }
        let count = (self.lane.length / period).ceil() as usize;
        (1..count)
            .map(|i| self.lane.point_at(i as f64 * period))
            .collect()
    }
}

impl Lane {
    pub(crate) fn new(start: Point2d, end: Point2d) -> Result<Self> {
        Ok(Self {
            start,
            end,
            dir: direction(start, end)?,
            length: (end - start).magnitude(),
            vehicles: vec![],
            sensors: vec![],
        })
    }

    pub fn start(&self) -> Point2d {
        self.start
    }

    pub fn end(&self) -> Point2d {
        self.end
    }

    /// The unit direction of the lane.
    pub fn dir(&self) -> Vector2d {
        self.dir
    }

    /// The length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The vehicles on the lane, front first.
    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// The sensors placed on the lane.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// The point `d` metres along the lane.
    pub fn point_at(&self, d: f64) -> Point2d {
        self.start + self.dir * d
    }

    /// The vehicle furthest back, if any.
    pub(crate) fn rearmost(&self) -> Option<VehicleId> {
        self.vehicles.last().copied()
    }

    pub(crate) fn add_sensor(&mut self, sensor: Sensor) {
        self.sensors.push(sensor);
    }

    /// Inserts the vehicle with the given ID, keeping the lane ordered.
    pub(crate) fn insert_vehicle(&mut self, vehicles: &VehicleSet, id: VehicleId) {
        debug_assert!(!self.vehicles.contains(&id), "vehicle already on lane");
        let veh_pos = vehicles[id].d();
        let idx = self
            .vehicles
            .iter()
            .position(|other| vehicles[*other].d() < veh_pos)
            .unwrap_or(self.vehicles.len());
        self.vehicles.insert(idx, id);
    }

    /// Removes the vehicle with the given ID from the lane.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        match self.vehicles.iter().position(|v| *v == id) {
            Some(idx) => {
                self.vehicles.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the vehicles that have reached the end of the lane, front first.
    pub(crate) fn take_finished(&mut self, vehicles: &VehicleSet) -> Vec<VehicleId> {
        let length = self.length;
        let (finished, staying) = self
            .vehicles
            .iter()
            .copied()
            .partition(|id| vehicles[*id].d() >= length);
        self.vehicles = staying;
        finished
    }

    /// Recomputes the world space geometry of every vehicle on the lane.
    pub(crate) fn update_geometry(&self, vehicles: &mut VehicleSet) {
        for id in &self.vehicles {
            vehicles[*id].update_geometry(self.start, self.dir);
        }
    }

    /// Lets every sensor record the vehicles which reached it.
    pub(crate) fn watch(&mut self, vehicles: &VehicleSet, t: f64) {
        for sensor in &mut self.sensors {
            sensor.watch(&self.vehicles, vehicles, t);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Point2d;
    use crate::{Error, Settings, Vehicle, VehicleAttributes};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn coincident_ends_are_rejected() {
        let p = Point2d::new(1.0, 1.0);
        assert!(matches!(Lane::new(p, p), Err(Error::DegenerateGeometry(_))));
    }

    #[test]
    fn vehicles_stay_ordered() {
        let mut lane = Lane::new(Point2d::new(0.0, 0.0), Point2d::new(0.0, 50.0)).unwrap();
        assert_approx_eq!(lane.length(), 50.0);

        let settings = Settings::default();
        let mut vehicles = VehicleSet::with_key();
        let ids: Vec<_> = [10.0, 30.0, 20.0]
            .iter()
            .map(|d| {
                let attributes = VehicleAttributes::from_settings(&settings).at(*d);
                vehicles.insert_with_key(|id| Vehicle::new(id, &attributes, Default::default()))
            })
            .collect();
        for id in &ids {
            lane.insert_vehicle(&vehicles, *id);
        }
        assert_eq!(lane.vehicles(), &[ids[1], ids[2], ids[0]]);
        assert_eq!(lane.rearmost(), Some(ids[0]));

        assert!(lane.remove_vehicle(ids[2]));
        assert!(!lane.remove_vehicle(ids[2]));
        assert_eq!(lane.vehicles(), &[ids[1], ids[0]]);
    }
}
