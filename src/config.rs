//! Declarative scenarios, loaded from JSON.
//!
//! A scenario lists segments, each with a numeric ID, and a routing graph from
//! segment IDs to the segments vehicles move onto:
//!
//! ```json
//! {
//!   "settings": { "seed": 1 },
//!   "segments": [
//!     { "id": 1, "type": "straight", "start": [0, 0], "end": [100, 0],
//!       "factory": { "frequency": { "every": 3.0 } } },
//!     { "id": 2, "type": "straight", "start": [100, 0], "end": [200, 0],
//!       "signal": { "type": "traffic_light" } },
//!     { "id": 3, "type": "curved", "start": 1, "end": [150, 50], "end_dir": [0, 1] }
//!   ],
//!   "graph": { "1": { "2": 0.7, "3": 0.3 }, "2": null, "3": null },
//!   "duration": 120
//! }
//! ```
//!
//! An endpoint given as a segment ID is the end of that segment when used as a start,
//! and its start when used as an end; curved segments also take their direction from it.
//! Referenced segments must be listed earlier.

use crate::math::{Point2d, Vector2d};
use crate::{
    CurvedAttributes, Error, LightState, LightTimings, Result, RoadGraph, Router, SegmentAttributes,
    SegmentId, Settings, Signal, Simulation, SpawnFrequency, StraightAttributes, TrafficLight,
    VehicleFactory, VehicleTemplate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn default_duration() -> f64 {
    60.0
}

/// A complete scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub settings: Settings,
    pub segments: Vec<SegmentSpec>,
    /// Where vehicles go at the end of each segment; `null` or a missing entry despawns them.
    #[serde(default)]
    pub graph: BTreeMap<u32, Option<RouteSpec>>,
    #[serde(default)]
    pub bumping_zone: Option<ZoneSpec>,
    /// How long to simulate for, in s.
    #[serde(default = "default_duration")]
    pub duration: f64,
}

/// One segment of a scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub id: u32,
    #[serde(flatten)]
    pub shape: ShapeSpec,
    /// Defaults to the road width of the settings.
    #[serde(default)]
    pub width: Option<f64>,
    /// Defaults to the speed limit of the settings. Scaled down on curved segments.
    #[serde(default)]
    pub speed_limit: Option<f64>,
    #[serde(default)]
    pub factory: Option<FactorySpec>,
    #[serde(default)]
    pub signal: Option<SignalSpec>,
    /// Sensor positions, in percent of the segment length.
    #[serde(default)]
    pub sensors: Vec<f64>,
    #[serde(default)]
    pub lane_markings: bool,
}

/// The geometry of a segment.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeSpec {
    Straight {
        start: Endpoint,
        end: Endpoint,
    },
    Curved {
        start: Endpoint,
        end: Endpoint,
        /// Required unless `start` refers to a segment.
        #[serde(default)]
        start_dir: Option<[f64; 2]>,
        /// Required unless `end` refers to a segment.
        #[serde(default)]
        end_dir: Option<[f64; 2]>,
    },
}

/// A point, or the ID of the segment a segment connects to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Point([f64; 2]),
    Segment(u32),
}

/// Where vehicles go at the end of a segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteSpec {
    Next(u32),
    /// Segment IDs and their probabilities. The keys are strings, as in JSON objects.
    Weighted(BTreeMap<String, f64>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactorySpec {
    pub frequency: SpawnFrequency,
    #[serde(default)]
    pub template: VehicleTemplate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalSpec {
    TrafficLight {
        #[serde(default)]
        initial: LightState,
        #[serde(default, rename = "static")]
        is_static: bool,
        /// Defaults to the durations of the settings.
        #[serde(default)]
        timings: Option<LightTimings>,
    },
    StopSign,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub centre: [f64; 2],
    pub radius: f64,
}

/// Maps the IDs used in a scenario to the IDs of the segments built from it.
#[derive(Clone, Debug, Default)]
pub struct ScenarioIds(BTreeMap<u32, SegmentId>);

impl ScenarioIds {
    /// The segment built for a scenario ID.
    pub fn get(&self, id: u32) -> Option<SegmentId> {
        self.0.get(&id).copied()
    }

    fn lookup(&self, id: u32) -> Result<SegmentId> {
        self.get(id)
            .ok_or_else(|| Error::UnknownSegment(format!("segment {}", id)))
    }
}

impl Scenario {
    /// Parses a scenario from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a scenario from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Builds a simulation from the scenario.
    pub fn build(&self) -> Result<(Simulation, ScenarioIds)> {
        let settings = &self.settings;
        let mut sim = Simulation::new(settings.clone())?;
        let mut ids = ScenarioIds::default();

        for entry in &self.segments {
            if ids.get(entry.id).is_some() {
                return Err(Error::DuplicateSegment(entry.id));
            }
            let attributes = entry.attributes(&sim, &ids, settings)?;
            let id = sim.add_segment(&attributes)?;
            ids.0.insert(entry.id, id);

            if let Some(factory) = &entry.factory {
                let factory = VehicleFactory::new(factory.frequency.clone(), factory.template.clone())?;
                sim.set_factory(id, factory)?;
            }
            if let Some(signal) = &entry.signal {
                sim.set_signal(id, Some(signal.build(settings)?))?;
            }
            for percent in &entry.sensors {
                sim.add_sensor(id, percent / 100.0)?;
            }
        }

        let mut graph = RoadGraph::new();
        for (from, route) in &self.graph {
            let router = match route {
                None => Router::Despawn,
                Some(RouteSpec::Next(to)) => Router::FixedNext(ids.lookup(*to)?),
                Some(RouteSpec::Weighted(choices)) => Router::weighted(
                    choices
                        .iter()
                        .map(|(to, p)| {
                            let to = to
                                .parse()
                                .map_err(|_| Error::UnknownSegment(format!("segment {}", to)))?;
                            Ok((ids.lookup(to)?, *p))
                        })
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            graph.insert(ids.lookup(*from)?, router);
        }
        sim.set_road_graph(graph)?;

        if let Some(zone) = &self.bumping_zone {
            sim.set_bumping_zone(point(zone.centre), zone.radius);
        }
        Ok((sim, ids))
    }
}

impl SegmentSpec {
    fn attributes(
        &self,
        sim: &Simulation,
        ids: &ScenarioIds,
        settings: &Settings,
    ) -> Result<SegmentAttributes> {
        let name = format!("segment {}", self.id);
        let width = self.width.unwrap_or(settings.road_width);
        let speed_limit = self.speed_limit.unwrap_or(settings.v_max);
        // The end of a segment we start from, or the start of one we lead into
        let joint = |endpoint: Endpoint, at_start: bool| -> Result<(Point2d, Option<Vector2d>)> {
            match endpoint {
                Endpoint::Point(p) => Ok((point(p), None)),
                Endpoint::Segment(id) => {
                    let segment = sim
                        .get_segment(ids.lookup(id)?)
                        .ok_or_else(|| Error::UnknownSegment(format!("segment {}", id)))?;
                    Ok(if at_start {
                        (segment.end(), Some(segment.end_dir()))
                    } else {
                        (segment.start(), Some(segment.start_dir()))
                    })
                }
            }
        };

        Ok(match &self.shape {
            ShapeSpec::Straight { start, end } => {
                SegmentAttributes::Straight(StraightAttributes {
                    name,
                    start: joint(*start, true)?.0,
                    end: joint(*end, false)?.0,
                    width,
                    speed_limit,
                    lane_markings: self.lane_markings,
                })
            }
            ShapeSpec::Curved {
                start,
                end,
                start_dir,
                end_dir,
            } => {
                let (start, inherited_start) = joint(*start, true)?;
                let (end, inherited_end) = joint(*end, false)?;
                let start_dir = start_dir
                    .map(vector)
                    .or(inherited_start)
                    .ok_or_else(|| Error::MissingDirection(name.clone()))?;
                let end_dir = end_dir
                    .map(vector)
                    .or(inherited_end)
                    .ok_or_else(|| Error::MissingDirection(name.clone()))?;
                SegmentAttributes::Curved(CurvedAttributes {
                    name,
                    start,
                    start_dir,
                    end,
                    end_dir,
                    width,
                    speed_limit: speed_limit * settings.curve_speed_factor,
                    parts: settings.curve_parts,
                })
            }
        })
    }
}

impl SignalSpec {
    fn build(&self, settings: &Settings) -> Result<Signal> {
        Ok(match self {
            SignalSpec::TrafficLight {
                initial,
                is_static,
                timings,
            } => {
                let timings = timings.unwrap_or_else(|| LightTimings::from_settings(settings));
                Signal::TrafficLight(TrafficLight::new(timings, *initial, *is_static)?)
            }
            SignalSpec::StopSign => Signal::stop_sign(settings),
        })
    }
}

fn point([x, y]: [f64; 2]) -> Point2d {
    Point2d::new(x, y)
}

fn vector([x, y]: [f64; 2]) -> Vector2d {
    Vector2d::new(x, y)
}
