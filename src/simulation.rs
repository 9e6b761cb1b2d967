use crate::collision::{detect_bumping, BumpingZone};
use crate::graph::resolve_leaders;
use crate::math::Point2d;
use crate::segment::{Entry, Exit, TickContext};
use crate::vehicle::Vehicle;
use crate::{
    Error, LightState, Result, RoadGraph, Segment, SegmentAttributes, SegmentId, SegmentSet,
    Settings, Signal, VehicleAttributes, VehicleFactory, VehicleId, VehicleSet,
};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use slotmap::SecondaryMap;

/// The maximum number of segments a vehicle may be forwarded through in one hand-off.
const MAX_HANDOFF_CHAIN: usize = 32;

/// A traffic simulation.
pub struct Simulation {
    /// The tunable constants.
    settings: Settings,
    /// The road segments.
    segments: SegmentSet,
    /// The speed limit of each segment.
    speed_limits: SecondaryMap<SegmentId, f64>,
    /// The vehicle factories, at most one per segment.
    factories: SecondaryMap<SegmentId, VehicleFactory>,
    /// The routing between segments.
    graph: RoadGraph,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The zone in which imminent collisions are detected, if any.
    bumping_zone: Option<BumpingZone>,
    /// Random number generator used for routing and spawning.
    rng: StdRng,
    /// The simulation time in s.
    t: f64,
    /// The current frame of simulation.
    frame: u64,
}

impl Simulation {
    /// Creates a new, empty simulation.
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            settings,
            segments: SegmentSet::with_key(),
            speed_limits: SecondaryMap::new(),
            factories: SecondaryMap::new(),
            graph: RoadGraph::new(),
            vehicles: VehicleSet::with_key(),
            bumping_zone: None,
            rng,
            t: 0.0,
            frame: 0,
        })
    }

    /// The settings of the simulation.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Adds a segment to the network. Vehicles reaching its end despawn until
    /// a road graph says otherwise.
    pub fn add_segment(&mut self, attributes: &SegmentAttributes) -> Result<SegmentId> {
        let id = self
            .segments
            .try_insert_with_key(|id| Segment::new(id, attributes))?;
        let segment = &self.segments[id];
        self.speed_limits.insert(id, segment.speed_limit());
        debug!("Added segment {} of length {:.1} m", segment.name(), segment.length());
        Ok(id)
    }

    /// Installs the routing between segments, replacing the previous one.
    ///
    /// Fails if the graph refers to unknown segments or has invalid probabilities,
    /// in which case the previous routing is kept.
    pub fn set_road_graph(&mut self, graph: RoadGraph) -> Result<()> {
        for (from, router) in graph.iter() {
            let segment = self
                .segments
                .get(from)
                .ok_or_else(|| Error::UnknownSegment(format!("{:?}", from)))?;
            router.validate(segment.name(), |id| self.segments.contains_key(id))?;
        }
        for (id, segment) in &mut self.segments {
            segment.set_router(graph.get(id).cloned().unwrap_or_default());
        }
        self.graph = graph;
        Ok(())
    }

    /// The routing between segments.
    pub fn road_graph(&self) -> &RoadGraph {
        &self.graph
    }

    /// Places a signal at the end of a segment, or removes it.
    pub fn set_signal(&mut self, segment: SegmentId, signal: Option<Signal>) -> Result<()> {
        let t = self.t;
        let segment = self.segment_mut(segment)?;
        segment.set_signal(signal);
        segment.update_signal(t);
        Ok(())
    }

    /// Places a sensor at a fraction of the length of a segment.
    pub fn add_sensor(&mut self, segment: SegmentId, fraction: f64) -> Result<()> {
        self.segment_mut(segment)?.add_sensor(fraction)
    }

    /// Attaches a vehicle factory to the start of a segment, replacing any other.
    pub fn set_factory(&mut self, segment: SegmentId, factory: VehicleFactory) -> Result<()> {
        self.segment_mut(segment)?;
        self.factories.insert(segment, factory);
        Ok(())
    }

    /// Only vehicles within the zone are checked for imminent collisions.
    /// With no zone, collisions are not checked at all.
    pub fn set_bumping_zone(&mut self, centre: Point2d, radius: f64) {
        self.bumping_zone = Some(BumpingZone { centre, radius });
    }

    /// Adds a vehicle to a segment.
    ///
    /// The vehicle's next segment is chosen immediately. If its position is beyond the
    /// end of the segment, it moves straight on along the road graph.
    pub fn spawn_vehicle(
        &mut self,
        segment: SegmentId,
        attributes: &VehicleAttributes,
    ) -> Result<VehicleId> {
        self.segment_mut(segment)?;
        attributes.driver.validate()?;
        crate::error::positive("vehicle length", attributes.length)?;
        crate::error::positive("vehicle width", attributes.width)?;

        let id = self
            .vehicles
            .insert_with_key(|id| Vehicle::new(id, attributes, segment));
        debug!("Spawned {:?} on {}", id, self.segments[segment].name());
        self.enter(id, Some(segment))?;
        Ok(id)
    }

    /// Removes a vehicle from the simulation.
    pub fn remove_vehicle(&mut self, id: VehicleId) {
        if let Some(vehicle) = self.vehicles.remove(id) {
            if let Some(segment) = self.segments.get_mut(vehicle.segment_id()) {
                segment.remove_vehicle(id);
            }
        }
    }

    /// Sets the `frozen` attribute of a vehicle. When a vehicle is frozen,
    /// it will maximally decelerate until its velocity is zero and remain stopped
    /// until it is no longer frozen.
    pub fn set_vehicle_frozen(&mut self, id: VehicleId, frozen: bool) {
        if let Some(vehicle) = self.vehicles.get_mut(id) {
            vehicle.set_frozen(frozen);
        }
    }

    /// Advances the simulation by `dt` seconds.
    ///
    /// A vehicle which reaches an invalid state is despawned, the rest of the tick still
    /// runs and the first such error is returned.
    pub fn tick(&mut self, dt: f64) -> Result<()> {
        self.frame += 1;
        let result = self.tick_inner(dt);
        if let Err(err) = &result {
            error!("Tick {} at t = {:.2} s failed: {}", self.frame, self.t, err);
        }
        self.t += dt;
        result
    }

    /// Advances the simulation by one tick of the configured length.
    pub fn step(&mut self) -> Result<()> {
        self.tick(self.settings.dt)
    }

    /// Ticks the simulation until `duration` seconds have elapsed.
    pub fn run(&mut self, duration: f64) -> Result<()> {
        let end = self.t + duration;
        let start_frame = self.frame;
        while self.t + 0.5 * self.settings.dt < end {
            self.step()?;
        }
        info!(
            "Simulated {:.1} s in {} ticks, {} vehicles remain",
            duration,
            self.frame - start_frame,
            self.vehicles.len()
        );
        Ok(())
    }

    fn tick_inner(&mut self, dt: f64) -> Result<()> {
        if let Some(zone) = &self.bumping_zone {
            detect_bumping(&mut self.vehicles, zone, self.settings.weight_bumping);
        }

        for segment in self.segments.values_mut() {
            segment.update_signal(self.t);
        }

        // Every hand-off is completed before the first error is returned
        let mut result = Ok(());
        let ids: Vec<SegmentId> = self.segments.keys().collect();
        for id in ids {
            let leaders = resolve_leaders(&self.segments, &self.vehicles, id, self.t, &self.settings);
            let ctx = TickContext {
                settings: &self.settings,
                t: self.t,
                dt,
                frame: self.frame,
                speed_limits: &self.speed_limits,
            };
            let update = self.segments[id].update_cars(&ctx, &leaders, &mut self.vehicles);
            for exit in update.exits {
                result = result.and(self.hand_off(exit));
            }
            for vehicle in update.broken {
                error!(
                    "{:?} on {} reached a non-finite state, despawning it",
                    vehicle,
                    self.segments[id].name()
                );
                self.vehicles.remove(vehicle);
                result = result.and(Err(Error::NonFiniteState { vehicle, segment: id }));
            }
        }

        result.and(self.run_factories(self.t + dt))
    }

    /// Moves a vehicle which left a segment onto the next one, or despawns it.
    fn hand_off(&mut self, exit: Exit) -> Result<()> {
        debug!("{:?} left for {:?}", exit.vehicle, exit.next);
        self.enter(exit.vehicle, exit.next)
    }

    /// Lets a vehicle enter `segment`, following it through any segments it overshoots.
    fn enter(&mut self, id: VehicleId, segment: Option<SegmentId>) -> Result<()> {
        let mut next = segment;
        for _ in 0..MAX_HANDOFF_CHAIN {
            let segment_id = match next {
                Some(segment_id) => segment_id,
                None => {
                    debug!("Despawned {:?}", id);
                    self.vehicles.remove(id);
                    return Ok(());
                }
            };
            let segment = match self.segments.get_mut(segment_id) {
                Some(segment) => segment,
                None => {
                    error!("{:?} was routed to missing {:?}, despawning it", id, segment_id);
                    self.vehicles.remove(id);
                    return Err(Error::UnknownSegment(format!("{:?}", segment_id)));
                }
            };
            match segment.new_car(&mut self.vehicles, id, self.t, &mut self.rng, &self.speed_limits) {
                Ok(Entry::Inserted) => return Ok(()),
                Ok(Entry::Forward(following)) => next = following,
                Err(err) => {
                    error!("{:?} could not enter {}, despawning it: {}", id, segment.name(), err);
                    self.vehicles.remove(id);
                    return Err(err);
                }
            }
        }
        warn!(
            "{:?} overshot {} segments in one hand-off, despawning it",
            id, MAX_HANDOFF_CHAIN
        );
        self.vehicles.remove(id);
        Ok(())
    }

    /// Spawns a vehicle from every factory which is due and has room to do so,
    /// or whose own spawn function asks for one.
    fn run_factories(&mut self, t: f64) -> Result<()> {
        let due: Vec<SegmentId> = self
            .factories
            .iter()
            .filter(|(segment_id, factory)| {
                let has_room = match self.segments[*segment_id].rear_vehicle(&self.vehicles) {
                    Some((_, rear, _)) => rear > self.settings.delta_d_min,
                    None => true,
                };
                let last = factory.last_spawned().and_then(|id| self.vehicles.get(id));
                factory.should_spawn(t, last, has_room, &self.settings)
            })
            .map(|(id, _)| id)
            .collect();

        for segment_id in due {
            let speed_limit = self.segments[segment_id].speed_limit();
            let factory = &self.factories[segment_id];
            let attributes = factory.attributes(t, &self.settings, speed_limit, &mut self.rng);
            let spawned = self.spawn_vehicle(segment_id, &attributes);
            self.factories[segment_id].spawned(t, spawned.as_ref().ok().copied(), &mut self.rng);
            spawned?;
        }
        Ok(())
    }

    fn segment_mut(&mut self, id: SegmentId) -> Result<&mut Segment> {
        self.segments
            .get_mut(id)
            .ok_or_else(|| Error::UnknownSegment(format!("{:?}", id)))
    }

    /// Gets the current simulation time in s.
    pub fn current_time(&self) -> f64 {
        self.t
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Returns an iterator over all the segments in the simulation.
    pub fn iter_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    /// Gets a reference to the segment with the given ID.
    pub fn get_segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    /// The position of a vehicle measured from the start of its segment, in m.
    pub fn vehicle_position(&self, id: VehicleId) -> Option<f64> {
        let vehicle = self.vehicles.get(id)?;
        self.segments
            .get(vehicle.segment_id())?
            .position_of(&self.vehicles, id)
    }

    /// The state of the traffic light at the end of a segment, if it has one.
    pub fn signal_state(&self, segment: SegmentId) -> Option<LightState> {
        self.segments.get(segment)?.signal()?.light_state()
    }
}
