pub use cgmath;
pub use config::{Scenario, ScenarioIds};
pub use error::{Error, Result};
pub use factory::{CreateFn, SpawnFn, SpawnFrequency, VehicleFactory, VehicleTemplate};
pub use graph::RoadGraph;
pub use router::Router;
pub use segment::{CurvedAttributes, Segment, SegmentAttributes, StraightAttributes};
pub use sensor::{Observation, Sensor};
pub use settings::{FollowingModel, Settings};
pub use signal::{LightState, LightTimings, Signal, StopSign, TrafficLight};
pub use simulation::Simulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
pub use vehicle::{DriverParams, Vehicle, VehicleAttributes};

mod collision;
pub mod config;
mod error;
mod factory;
mod graph;
pub mod math;
mod router;
mod segment;
mod sensor;
mod settings;
mod signal;
mod simulation;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Segment].
    pub struct SegmentId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type SegmentSet = SlotMap<SegmentId, Segment>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;
