pub use self::acceleration::VirtualLeader;
use crate::error::positive;
use crate::math::{normal, Point2d, Vector2d};
use crate::{Result, SegmentId, Settings, VehicleId};
use cgmath::prelude::*;
use smallvec::SmallVec;

mod acceleration;
mod dynamics;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    pub(crate) id: VehicleId,
    /// The vehicle length in m.
    length: f64,
    /// The vehicle width in m.
    width: f64,
    /// The vehicle colour.
    color: [u8; 3],
    /// The driver's behaviour.
    driver: DriverParams,
    /// The position of the front of the vehicle along its current segment, in m.
    d: f64,
    /// The total distance travelled, in m.
    total_distance: f64,
    /// The velocity in m/s.
    v: f64,
    /// The acceleration in m/s^2.
    a: f64,
    /// The desired velocity in m/s, set by the segment the vehicle is on.
    pub(crate) v_max: f64,
    /// The segment the vehicle is on.
    pub(crate) segment: SegmentId,
    /// The index of the part of the segment the vehicle is on; always 0 on straight segments.
    pub(crate) part: usize,
    /// The segment the vehicle will move onto, chosen when it entered its current one.
    pub(crate) next_segment: Option<SegmentId>,
    /// The leaders along the road graph for the current frame.
    leaders: SmallVec<[Leader; 4]>,
    /// Vehicles this vehicle is about to bump into; these take priority over `leaders`.
    bumping: SmallVec<[Leader; 2]>,
    /// A frozen vehicle brakes until it stops, then stays stopped.
    frozen: bool,
    /// The last frame the vehicle was integrated on.
    pub(crate) updated_frame: u64,
    /// Where the vehicle must stop, measured like `d`, while a signal holds traffic.
    pub(crate) stop_line: Option<f64>,
    /// Set when the vehicle was too close to stop for the signal ahead of it.
    pub(crate) passing_signal: bool,
    /// World space coordinates of the centre of the vehicle.
    pos: Point2d,
    /// World space unit vector of the vehicle's heading.
    dir: Vector2d,
    /// The corners of the vehicle's footprint.
    corners: [Point2d; 4],
    /// The zone ahead of the vehicle used to detect imminent collisions.
    hitbox: [Point2d; 4],
    /// The footprint of the vehicle padded by the minimum gap.
    hurtbox: [Point2d; 4],
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug)]
pub struct VehicleAttributes {
    /// The vehicle length in m.
    pub length: f64,
    /// The vehicle width in m.
    pub width: f64,
    /// The vehicle colour.
    pub color: [u8; 3],
    /// The driver's behaviour.
    pub driver: DriverParams,
    /// The initial position of the front of the vehicle along its segment, in m.
    pub d: f64,
    /// The initial velocity in m/s.
    pub v: f64,
    /// The initial acceleration in m/s^2.
    pub a: f64,
}

/// Parameters of the car following model for one driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriverParams {
    /// The maximum acceleration in m/s^2.
    pub a_max: f64,
    /// The comfortable deceleration, a positive number in m/s^2.
    pub a_min_comfort: f64,
    /// The acceleration exponent.
    pub a_exp: f64,
    /// The reaction time in s.
    pub t_react: f64,
    /// The minimum bumper to bumper gap in m.
    pub delta_d_min: f64,
}

/// Something a vehicle follows during one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leader {
    /// Bumper to bumper distance, in m. May be negative if the follower overran it.
    pub gap: f64,
    /// Velocity in m/s.
    pub vel: f64,
    /// Importance of this leader in the virtual leader average.
    pub weight: f64,
    /// What is being followed.
    pub source: LeaderSource,
}

/// What a [Leader] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaderSource {
    /// A real vehicle.
    Vehicle(VehicleId),
    /// The dummy vehicle of the signal at the end of a segment.
    Signal(SegmentId),
    /// Whatever lies on or beyond the given segment, found by looking ahead.
    Route(SegmentId),
}

impl DriverParams {
    /// Checks that all the parameters are usable.
    pub fn validate(&self) -> Result<()> {
        positive("a_max", self.a_max)?;
        positive("a_min_comfort", self.a_min_comfort)?;
        positive("a_exp", self.a_exp)?;
        positive("delta_d_min", self.delta_d_min)?;
        if self.t_react < 0.0 || !self.t_react.is_finite() {
            return Err(crate::Error::InvalidParameter {
                name: "t_react",
                value: self.t_react,
            });
        }
        Ok(())
    }
}

impl VehicleAttributes {
    /// Attributes of a vehicle at rest at the start of its segment,
    /// with the default size and driver of the given settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            length: settings.vehicle_length,
            width: settings.vehicle_width,
            color: settings.vehicle_color,
            driver: settings.driver(),
            d: 0.0,
            v: 0.0,
            a: 0.0,
        }
    }

    /// Sets the initial position.
    pub fn at(self, d: f64) -> Self {
        Self { d, ..self }
    }

    /// Sets the initial velocity.
    pub fn with_velocity(self, v: f64) -> Self {
        Self { v, ..self }
    }
}

impl Vehicle {
    /// Creates a new vehicle.
    pub(crate) fn new(id: VehicleId, attributes: &VehicleAttributes, segment: SegmentId) -> Self {
        Self {
            id,
            length: attributes.length,
            width: attributes.width,
            color: attributes.color,
            driver: attributes.driver,
            d: f64::max(attributes.d, 0.0),
            total_distance: 0.0,
            v: f64::max(attributes.v, 0.0),
            a: attributes.a,
            v_max: 0.0,
            segment,
            part: 0,
            next_segment: None,
            leaders: SmallVec::new(),
            bumping: SmallVec::new(),
            frozen: false,
            updated_frame: 0,
            stop_line: None,
            passing_signal: false,
            pos: Point2d::new(0.0, 0.0),
            dir: Vector2d::new(1.0, 0.0),
            corners: [Point2d::new(0.0, 0.0); 4],
            hitbox: [Point2d::new(0.0, 0.0); 4],
            hurtbox: [Point2d::new(0.0, 0.0); 4],
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The vehicle's width in m.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// The vehicle's colour.
    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    /// The driver's parameters.
    pub fn driver(&self) -> &DriverParams {
        &self.driver
    }

    /// The position of the front of the vehicle along its segment, in m.
    pub fn d(&self) -> f64 {
        self.d
    }

    /// The position of the rear of the vehicle along its segment, in m.
    pub fn d_rear(&self) -> f64 {
        self.d - self.length
    }

    /// The total distance travelled by the vehicle since it was spawned, in m.
    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.v
    }

    /// The vehicle's acceleration in m/s^2.
    pub fn acc(&self) -> f64 {
        self.a
    }

    /// The vehicle's current desired velocity in m/s.
    pub fn v_max(&self) -> f64 {
        self.v_max
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.v < 0.1
    }

    /// Whether the vehicle is frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The ID of the segment the vehicle is travelling on.
    pub fn segment_id(&self) -> SegmentId {
        self.segment
    }

    /// The segment the vehicle will move onto once it reaches the end of its current one.
    pub fn next_segment(&self) -> Option<SegmentId> {
        self.next_segment
    }

    /// The coordinates in world space of the centre of the vehicle.
    pub fn position(&self) -> Point2d {
        self.pos
    }

    /// A unit vector in world space aligned with the vehicle's heading.
    pub fn direction(&self) -> Vector2d {
        self.dir
    }

    /// The corners of the vehicle, for display.
    pub fn corners(&self) -> [Point2d; 4] {
        self.corners
    }

    /// The zone ahead of the vehicle in which other vehicles count as about to be hit.
    pub fn hitbox(&self) -> [Point2d; 4] {
        self.hitbox
    }

    /// The vehicle's footprint padded by the minimum gap on its sides and rear.
    pub fn hurtbox(&self) -> [Point2d; 4] {
        self.hurtbox
    }

    /// The leaders the vehicle followed during the last frame.
    pub fn leaders(&self) -> &[Leader] {
        &self.leaders
    }

    /// The vehicles this vehicle was about to bump into during the last frame.
    pub fn bumping_leaders(&self) -> &[Leader] {
        &self.bumping
    }

    /// The distance and velocity of the leader the car following model reacts to.
    ///
    /// This is the weighted average of the vehicles about to be bumped into if there are any,
    /// otherwise of the leaders along the road graph.
    pub fn virtual_leader(&self) -> Option<VirtualLeader> {
        let leaders = if self.bumping.is_empty() {
            &self.leaders[..]
        } else {
            &self.bumping[..]
        };
        let total: f64 = leaders.iter().map(|l| l.weight).sum();
        if leaders.is_empty() || total <= 0.0 {
            return None;
        }
        let (gap, vel) = leaders.iter().fold((0.0, 0.0), |(gap, vel), l| {
            (gap + l.gap * l.weight, vel + l.vel * l.weight)
        });
        Some(VirtualLeader {
            gap: gap / total,
            vel: vel / total,
        })
    }

    pub(crate) fn set_leaders(&mut self, leaders: impl IntoIterator<Item = Leader>) {
        self.leaders.clear();
        self.leaders.extend(leaders);
    }

    pub(crate) fn clear_bumping(&mut self) {
        self.bumping.clear();
    }

    pub(crate) fn add_bumping(&mut self, leader: Leader) {
        self.bumping.push(leader);
    }

    pub(crate) fn is_bumping_into(&self, other: VehicleId) -> bool {
        self.bumping
            .iter()
            .any(|l| l.source == LeaderSource::Vehicle(other))
    }

    pub(crate) fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Recomputes the acceleration from the virtual leader and integrates over `dt` seconds.
    ///
    /// No vehicle brakes harder than the emergency deceleration. With a stop line, the
    /// vehicle brakes at the constant rate which stops it on the line once that rate
    /// becomes uncomfortable, or once the next step would cross the line.
    pub(crate) fn update(&mut self, dt: f64, settings: &Settings) {
        if dt <= 0.0 {
            return;
        }

        let leader = self.virtual_leader();
        let mut acc = match leader {
            _ if self.frozen => -settings.emergency_deceleration,
            Some(leader) if leader.gap <= 0.0 => {
                // Already at or past the leader: wait for it to move away
                self.v = 0.0;
                self.a = 0.0;
                return;
            }
            leader => self
                .driver
                .acceleration(settings.model, self.v, self.v_max, leader),
        };
        if acc < -settings.emergency_deceleration {
            // Comparison rather than `max` so that a NaN still surfaces
            acc = -settings.emergency_deceleration;
        }

        if let Some(limit) = self.stop_line.filter(|_| !acc.is_nan()) {
            let room = limit - self.d;
            if room <= 0.0 {
                self.v = 0.0;
                self.a = 0.0;
                return;
            }
            let stopping = -self.v * self.v / (2.0 * room);
            let (dist, _) = dynamics::integrate(self.v, acc, dt);
            if stopping <= -self.driver.a_min_comfort || self.d + dist > limit {
                acc = acc.min(stopping);
            }
        }

        self.a = acc;
        let (dist, vel) = dynamics::integrate(self.v, self.a, dt);
        self.advance(dist);
        self.v = vel;
    }

    /// Whether the vehicle could still stop within `room` metres at the emergency deceleration.
    pub(crate) fn can_stop_within(&self, room: f64, settings: &Settings) -> bool {
        self.v * self.v <= 2.0 * settings.emergency_deceleration * room
    }

    /// Moves the vehicle forward along its segment.
    fn advance(&mut self, dist: f64) {
        self.d += dist;
        self.total_distance += dist;
    }

    /// Moves the vehicle onto a new segment or part, `offset` metres further along.
    pub(crate) fn rebase(&mut self, offset: f64) {
        self.d -= offset;
    }

    /// Whether every kinematic quantity is a finite number.
    pub(crate) fn is_finite(&self) -> bool {
        self.d.is_finite() && self.v.is_finite() && self.a.is_finite()
    }

    /// Recomputes the world space position, corners, hitbox and hurtbox of the vehicle.
    /// Must be called after every change of `d` or of the segment.
    ///
    /// # Parameters
    /// * `origin` - The world space position of the start of the segment (part)
    /// * `dir` - The unit direction of the segment (part)
    pub(crate) fn update_geometry(&mut self, origin: Point2d, dir: Vector2d) {
        let pos = origin + dir * (self.d - 0.5 * self.length);
        self.pos = pos;
        self.dir = dir;

        let half_gap = 0.5 * self.driver.delta_d_min;
        let along_len = dir * (0.5 * self.length);
        let along_gap = dir * half_gap;
        let reach = dir * (0.5 * (self.driver.delta_d_min + self.v * self.driver.t_react));
        let side_wid = normal(dir, 0.5 * self.width);
        let side_gap = normal(dir, half_gap);

        self.corners = [
            pos + side_wid - along_len,
            pos - side_wid - along_len,
            pos - side_wid + along_len,
            pos + side_wid + along_len,
        ];
        self.hitbox = [
            pos + side_wid + along_len + reach,
            pos - side_wid + along_len + reach,
            pos - side_wid - side_gap + along_len,
            pos + side_wid + side_gap + along_len,
        ];
        self.hurtbox = [
            pos + side_wid + side_gap - along_len - along_gap,
            pos - side_wid - side_gap - along_len - along_gap,
            pos - side_wid - side_gap + along_len,
            pos + side_wid + side_gap + along_len,
        ];
    }

    /// The component of `point - position` along the vehicle's heading.
    pub(crate) fn longitudinal_offset(&self, point: Point2d) -> f64 {
        self.dir.dot(point - self.pos)
    }

    /// The distance along the vehicle's heading from its front bumper to the
    /// nearest corner of `other`. Negative if they overlap.
    pub(crate) fn gap_to(&self, other: &Vehicle) -> f64 {
        let nearest = other
            .corners
            .iter()
            .map(|corner| self.longitudinal_offset(*corner))
            .fold(f64::INFINITY, f64::min);
        nearest - 0.5 * self.length
    }
}
