pub use self::curved::CurvedSegment;
pub use self::straight::{Lane, StraightSegment};
use crate::error::positive;
use crate::math::{Point2d, Vector2d};
use crate::sensor::Sensor;
use crate::settings::{DEFAULT_CURVE_PARTS, DEFAULT_ROAD_WIDTH};
use crate::vehicle::{Leader, LeaderSource};
use crate::{Error, Result, Router, SegmentId, Settings, Signal, VehicleId, VehicleSet};
use rand::Rng;
use slotmap::SecondaryMap;
use smallvec::SmallVec;

mod curved;
mod straight;

/// How far before the end of a segment held vehicles stop, in m.
const STOP_LINE_MARGIN: f64 = 1e-6;

/// A road segment.
#[derive(Clone, Debug)]
pub enum Segment {
    Straight(StraightSegment),
    Curved(CurvedSegment),
}

/// The attributes of a straight segment.
#[derive(Clone, Debug)]
pub struct StraightAttributes {
    /// A name used in log and error messages. May be empty.
    pub name: String,
    pub start: Point2d,
    pub end: Point2d,
    /// The width in m.
    pub width: f64,
    /// The speed limit in m/s.
    pub speed_limit: f64,
    /// Whether arrows are painted along the segment.
    pub lane_markings: bool,
}

/// The attributes of a curved segment.
#[derive(Clone, Debug)]
pub struct CurvedAttributes {
    /// A name used in log and error messages. May be empty.
    pub name: String,
    pub start: Point2d,
    /// The direction of travel at the start.
    pub start_dir: Vector2d,
    pub end: Point2d,
    /// The direction of travel at the end.
    pub end_dir: Vector2d,
    /// The width in m.
    pub width: f64,
    /// The speed limit in m/s.
    pub speed_limit: f64,
    /// The number of straight parts approximating the curve.
    pub parts: usize,
}

/// The attributes of a segment.
#[derive(Clone, Debug)]
pub enum SegmentAttributes {
    Straight(StraightAttributes),
    Curved(CurvedAttributes),
}

/// What straight and curved segments have in common.
#[derive(Clone, Debug)]
pub(crate) struct Base {
    id: SegmentId,
    name: String,
    width: f64,
    speed_limit: f64,
    router: Router,
    signal: Option<Signal>,
}

/// The state of the simulation a segment needs to update its vehicles.
pub(crate) struct TickContext<'a> {
    pub settings: &'a Settings,
    /// The time at the start of the tick.
    pub t: f64,
    pub dt: f64,
    pub frame: u64,
    /// The speed limit of every segment, which is also the set of existing segments.
    pub speed_limits: &'a SecondaryMap<SegmentId, f64>,
}

/// A vehicle which reached the end of a segment.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Exit {
    pub vehicle: VehicleId,
    pub next: Option<SegmentId>,
}

/// The vehicles which left a segment during a tick.
#[derive(Clone, Debug, Default)]
pub(crate) struct SegmentUpdate {
    /// The vehicles which reached the end, front first.
    pub exits: Vec<Exit>,
    /// The vehicles whose state stopped being finite.
    pub broken: Vec<VehicleId>,
}

/// The outcome of a vehicle entering a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Entry {
    /// The vehicle is now on the segment.
    Inserted,
    /// The vehicle is already past the end; it moves straight on to the given segment.
    Forward(Option<SegmentId>),
}

impl StraightAttributes {
    /// A straight segment of the default width.
    pub fn new(start: Point2d, end: Point2d, speed_limit: f64) -> Self {
        Self {
            name: String::new(),
            start,
            end,
            width: DEFAULT_ROAD_WIDTH,
            speed_limit,
            lane_markings: false,
        }
    }
}

impl CurvedAttributes {
    /// A curved segment of the default width and number of parts.
    pub fn new(
        start: Point2d,
        start_dir: Vector2d,
        end: Point2d,
        end_dir: Vector2d,
        speed_limit: f64,
    ) -> Self {
        Self {
            name: String::new(),
            start,
            start_dir,
            end,
            end_dir,
            width: DEFAULT_ROAD_WIDTH,
            speed_limit,
            parts: DEFAULT_CURVE_PARTS,
        }
    }
}

impl Base {
    fn new(id: SegmentId, name: &str, width: f64, speed_limit: f64) -> Result<Self> {
        let name = if name.is_empty() {
            format!("{:?}", id)
        } else {
            name.to_string()
        };
        positive("width", width)?;
        positive("speed_limit", speed_limit)?;
        Ok(Self {
            id,
            name,
            width,
            speed_limit,
            router: Router::Despawn,
            signal: None,
        })
    }
}

impl Segment {
    /// Creates a segment.
    pub(crate) fn new(id: SegmentId, attributes: &SegmentAttributes) -> Result<Self> {
        Ok(match attributes {
            SegmentAttributes::Straight(attribs) => {
                Segment::Straight(StraightSegment::new(id, attribs)?)
            }
            SegmentAttributes::Curved(attribs) => Segment::Curved(CurvedSegment::new(id, attribs)?),
        })
    }

    fn base(&self) -> &Base {
        match self {
            Segment::Straight(s) => &s.base,
            Segment::Curved(s) => &s.base,
        }
    }

    fn base_mut(&mut self) -> &mut Base {
        match self {
            Segment::Straight(s) => &mut s.base,
            Segment::Curved(s) => &mut s.base,
        }
    }

    /// The straight parts making up the segment, from start to end.
    pub fn parts(&self) -> &[Lane] {
        match self {
            Segment::Straight(s) => std::slice::from_ref(&s.lane),
            Segment::Curved(s) => &s.parts,
        }
    }

    fn parts_mut(&mut self) -> &mut [Lane] {
        match self {
            Segment::Straight(s) => std::slice::from_mut(&mut s.lane),
            Segment::Curved(s) => &mut s.parts,
        }
    }

    /// Splits the segment into its parts and its shared attributes.
    fn split_mut(&mut self) -> (&mut [Lane], &Base) {
        match self {
            Segment::Straight(s) => (std::slice::from_mut(&mut s.lane), &s.base),
            Segment::Curved(s) => (&mut s.parts, &s.base),
        }
    }

    /// Gets the segment's ID.
    pub fn id(&self) -> SegmentId {
        self.base().id
    }

    /// The name of the segment, as used in log and error messages.
    pub fn name(&self) -> &str {
        &self.base().name
    }

    /// The length of the segment in m.
    pub fn length(&self) -> f64 {
        self.parts().iter().map(|p| p.length()).sum()
    }

    /// The width of the segment in m.
    pub fn width(&self) -> f64 {
        self.base().width
    }

    /// The speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.base().speed_limit
    }

    pub fn start(&self) -> Point2d {
        self.parts()[0].start()
    }

    pub fn end(&self) -> Point2d {
        self.parts()[self.parts().len() - 1].end()
    }

    /// The direction of travel at the start.
    pub fn start_dir(&self) -> Vector2d {
        self.parts()[0].dir()
    }

    /// The direction of travel at the end.
    pub fn end_dir(&self) -> Vector2d {
        self.parts()[self.parts().len() - 1].dir()
    }

    /// The router deciding where vehicles go at the end of the segment.
    pub fn router(&self) -> &Router {
        &self.base().router
    }

    pub(crate) fn set_router(&mut self, router: Router) {
        self.base_mut().router = router;
    }

    /// The signal at the end of the segment.
    pub fn signal(&self) -> Option<&Signal> {
        self.base().signal.as_ref()
    }

    pub(crate) fn set_signal(&mut self, signal: Option<Signal>) {
        self.base_mut().signal = signal;
    }

    pub(crate) fn update_signal(&mut self, t: f64) {
        if let Some(signal) = &mut self.base_mut().signal {
            signal.update(t);
        }
    }

    /// Where the signal's dummy vehicle stands, measured from the start of the segment,
    /// or `None` if there is nothing to stop for.
    pub(crate) fn stop_position(&self, settings: &Settings) -> Option<f64> {
        self.signal()
            .and_then(|signal| signal.dummy_offset(settings))
            .map(|offset| self.length() + offset)
    }

    /// The vehicles on the segment, front first.
    pub fn vehicles(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.parts()
            .iter()
            .rev()
            .flat_map(|part| part.vehicles().iter().copied())
    }

    /// The position of the rear of the rearmost vehicle, measured from the start of the
    /// segment, together with its velocity.
    pub(crate) fn rear_vehicle(&self, vehicles: &VehicleSet) -> Option<(VehicleId, f64, f64)> {
        let mut offset = 0.0;
        for part in self.parts() {
            if let Some(id) = part.rearmost() {
                let vehicle = &vehicles[id];
                return Some((id, offset + vehicle.d_rear(), vehicle.vel()));
            }
            offset += part.length();
        }
        None
    }

    /// The position of a vehicle on the segment, measured from its start.
    pub(crate) fn position_of(&self, vehicles: &VehicleSet, id: VehicleId) -> Option<f64> {
        let vehicle = vehicles.get(id)?;
        let parts = self.parts();
        if vehicle.segment != self.id() || vehicle.part >= parts.len() {
            return None;
        }
        let before: f64 = parts[..vehicle.part].iter().map(|p| p.length()).sum();
        Some(before + vehicle.d())
    }

    /// The sensors placed along the segment, from start to end.
    pub fn sensors(&self) -> impl Iterator<Item = &Sensor> + '_ {
        self.parts().iter().flat_map(|part| part.sensors().iter())
    }

    /// Places a sensor at a fraction of the length of the segment.
    pub(crate) fn add_sensor(&mut self, fraction: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(Error::InvalidParameter {
                name: "sensor position",
                value: fraction,
            });
        }
        let mut pos = fraction * self.length();
        let parts = self.parts_mut();
        let last = parts.len() - 1;
        for (idx, part) in parts.iter_mut().enumerate() {
            if pos <= part.length() || idx == last {
                part.add_sensor(Sensor::new(fraction, pos));
                break;
            }
            pos -= part.length();
        }
        Ok(())
    }

    /// The lane marking arrows of the segment, if it has any.
    pub fn arrows(&self, period: f64) -> Vec<Point2d> {
        match self {
            Segment::Straight(s) => s.arrows(period),
            Segment::Curved(_) => vec![],
        }
    }

    /// Removes a vehicle from the segment.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        self.parts_mut().iter_mut().any(|part| part.remove_vehicle(id))
    }

    /// Lets a vehicle enter the segment.
    ///
    /// The vehicle's next segment is picked by the router now, at its arrival time.
    /// If the vehicle is already beyond the end of the segment, it is not inserted and
    /// has its position rebased onto the next segment.
    pub(crate) fn new_car(
        &mut self,
        vehicles: &mut VehicleSet,
        id: VehicleId,
        t: f64,
        rng: &mut impl Rng,
        speed_limits: &SecondaryMap<SegmentId, f64>,
    ) -> Result<Entry> {
        let (parts, base) = self.split_mut();
        let next = base.router.resolve(t, rng);
        if let Some(target) = next {
            if !speed_limits.contains_key(target) {
                return Err(Error::UnknownRouteTarget {
                    segment: base.id,
                    target,
                });
            }
        }

        let vehicle = &mut vehicles[id];
        vehicle.segment = base.id;
        vehicle.next_segment = next;
        vehicle.stop_line = None;
        vehicle.passing_signal = false;
        vehicle.v_max = base.speed_limit;

        if insert_into_chain(parts, 0, vehicles, id) {
            log::trace!("{:?} entered {} (next {:?})", id, base.name, next);
            Ok(Entry::Inserted)
        } else {
            Ok(Entry::Forward(next))
        }
    }

    /// Updates every vehicle on the segment over one tick.
    ///
    /// # Parameters
    /// * `ctx` - The tick being simulated
    /// * `leaders` - Leaders beyond the end of the segment, with gaps measured from its end
    /// * `vehicles` - The vehicles
    ///
    /// Vehicles whose state stops being finite are taken off the segment and reported
    /// in [`SegmentUpdate::broken`], so the caller can despawn them.
    pub(crate) fn update_cars(
        &mut self,
        ctx: &TickContext,
        leaders: &[Leader],
        vehicles: &mut VehicleSet,
    ) -> SegmentUpdate {
        let settings = ctx.settings;
        let signal_offset = self
            .signal()
            .and_then(|signal| signal.dummy_offset(settings));
        let holds_traffic = self.signal().map_or(false, Signal::holds_traffic);
        let (parts, base) = self.split_mut();
        let total_length: f64 = parts.iter().map(|p| p.length()).sum();
        let last = parts.len() - 1;
        let mut update = SegmentUpdate::default();

        // A vehicle which can no longer stop before the end drives through the signal
        if signal_offset.is_some() {
            let length = parts[last].length();
            for id in parts[last].vehicles() {
                let vehicle = &mut vehicles[*id];
                if !vehicle.passing_signal && !vehicle.can_stop_within(length - vehicle.d(), settings) {
                    vehicle.passing_signal = true;
                    log::debug!("{:?} is too close to stop, passing the signal on {}", id, base.name);
                }
            }
        }

        // Process the parts from the last so that a vehicle moving into the next
        // part is not updated twice
        for k in (0..parts.len()).rev() {
            let front_is_passing = parts[k]
                .vehicles()
                .first()
                .map_or(false, |id| vehicles[*id].passing_signal);
            let offset = if front_is_passing { None } else { signal_offset };
            let beyond = leaders_beyond(parts, k, base.id, offset, leaders, vehicles, settings);
            assign_leaders(&parts[k], &beyond, vehicles, settings);

            let start_of_part: f64 = parts[..k].iter().map(|p| p.length()).sum();
            let stop_line = parts[k].length() - STOP_LINE_MARGIN;
            let mut broken = vec![];
            for id in parts[k].vehicles() {
                let vehicle = &mut vehicles[*id];
                if vehicle.updated_frame == ctx.frame {
                    continue;
                }
                let remaining = total_length - start_of_part - vehicle.d();
                vehicle.v_max = blended_speed_limit(
                    base.speed_limit,
                    vehicle.next_segment.and_then(|next| ctx.speed_limits.get(next).copied()),
                    remaining,
                    settings.transition_zone,
                );
                vehicle.stop_line = (holds_traffic && k == last && !vehicle.passing_signal)
                    .then_some(stop_line);
                vehicle.update(ctx.dt, settings);
                vehicle.updated_frame = ctx.frame;
                if !vehicle.is_finite() {
                    broken.push(*id);
                }
            }
            for id in broken {
                parts[k].remove_vehicle(id);
                update.broken.push(id);
            }

            for id in parts[k].take_finished(vehicles) {
                let vehicle = &mut vehicles[id];
                vehicle.rebase(parts[k].length());
                let next = vehicle.next_segment;
                if !insert_into_chain(parts, k + 1, vehicles, id) {
                    update.exits.push(Exit { vehicle: id, next });
                }
            }
        }

        for part in parts.iter_mut() {
            part.update_geometry(vehicles);
            part.watch(vehicles, ctx.t + ctx.dt);
        }
        debug_assert!(
            parts.iter().map(|p| p.vehicles().len()).sum::<usize>() < 100_000,
            "absurd number of vehicles on {}",
            base.name
        );

        update
    }
}

/// Inserts a vehicle into the first part, starting from `first`, that it has not already
/// driven past, rebasing its position as it goes. Returns false if it is past every part.
fn insert_into_chain(parts: &mut [Lane], first: usize, vehicles: &mut VehicleSet, id: VehicleId) -> bool {
    for (k, part) in parts.iter_mut().enumerate().skip(first) {
        let vehicle = &mut vehicles[id];
        if vehicle.d() < part.length() {
            vehicle.part = k;
            vehicle.update_geometry(part.start(), part.dir());
            part.insert_vehicle(vehicles, id);
            return true;
        }
        vehicle.rebase(part.length());
    }
    false
}

/// The leaders of the front vehicle of part `k`, with gaps measured from the end of the part.
fn leaders_beyond(
    parts: &[Lane],
    k: usize,
    segment: SegmentId,
    signal_offset: Option<f64>,
    external: &[Leader],
    vehicles: &VehicleSet,
    settings: &Settings,
) -> SmallVec<[Leader; 4]> {
    let mut acc = 0.0;
    for part in &parts[k + 1..] {
        if let Some(id) = part.rearmost() {
            let vehicle = &vehicles[id];
            return smallvec::smallvec![Leader {
                gap: acc + vehicle.d_rear(),
                vel: vehicle.vel(),
                weight: settings.weight_in_front,
                source: LeaderSource::Vehicle(id),
            }];
        }
        acc += part.length();
    }

    if let Some(offset) = signal_offset {
        return smallvec::smallvec![Leader {
            gap: acc + offset,
            vel: 0.0,
            weight: settings.weight_in_front,
            source: LeaderSource::Signal(segment),
        }];
    }

    external
        .iter()
        .map(|leader| Leader {
            gap: leader.gap + acc,
            ..*leader
        })
        .collect()
}

/// Sets the leaders of every vehicle of a part from the state at the start of the tick.
fn assign_leaders(part: &Lane, beyond: &[Leader], vehicles: &mut VehicleSet, settings: &Settings) {
    let ids = part.vehicles();
    for (idx, id) in ids.iter().enumerate() {
        let d = vehicles[*id].d();
        let leaders: SmallVec<[Leader; 4]> = match idx.checked_sub(1).map(|i| ids[i]) {
            Some(ahead) => {
                let ahead_veh = &vehicles[ahead];
                smallvec::smallvec![Leader {
                    gap: ahead_veh.d_rear() - d,
                    vel: ahead_veh.vel(),
                    weight: settings.weight_in_front,
                    source: LeaderSource::Vehicle(ahead),
                }]
            }
            None => beyond
                .iter()
                .map(|leader| Leader {
                    gap: leader.gap + part.length() - d,
                    ..*leader
                })
                .collect(),
        };
        vehicles[*id].set_leaders(leaders);
    }
}

/// The desired velocity of a vehicle `remaining` metres from the end of a segment.
/// Within the transition zone it blends linearly into the next segment's limit.
fn blended_speed_limit(limit: f64, next_limit: Option<f64>, remaining: f64, zone: f64) -> f64 {
    match next_limit {
        Some(next) if zone > 0.0 && remaining < zone => {
            let frac = f64::max(remaining, 0.0) / zone;
            next + (limit - next) * frac
        }
        _ => limit,
    }
}
