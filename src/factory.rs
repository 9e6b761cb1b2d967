use crate::error::positive;
use crate::{Error, Result, Settings, Vehicle, VehicleAttributes, VehicleId};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Decides whether to spawn at time `t`, given the last vehicle the factory spawned
/// if it is still in the simulation.
pub type SpawnFn = Rc<dyn Fn(f64, Option<&Vehicle>) -> bool>;

/// Adjusts the attributes of a vehicle about to be spawned at time `t`.
pub type CreateFn = Rc<dyn Fn(f64, VehicleAttributes) -> VehicleAttributes>;

/// How often a factory spawns vehicles.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnFrequency {
    /// A vehicle every this many seconds.
    Every(f64),
    /// Intervals drawn uniformly between the two bounds, in s.
    RandomInterval(f64, f64),
    /// Asked every tick. Spawns regardless of the room at the start of the segment.
    #[serde(skip)]
    Custom(SpawnFn),
}

/// The properties of the vehicles a factory spawns. Unset properties take the defaults
/// from the settings, and the speed defaults to the speed limit of the segment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleTemplate {
    /// Initial velocity in m/s.
    pub speed: Option<f64>,
    /// Initial acceleration in m/s^2.
    pub acceleration: Option<f64>,
    pub color: Option<[u8; 3]>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    /// Draw the colour from the settings' random colour range.
    pub random_color: bool,
    /// Draw the length from the settings' random length range.
    pub random_length: bool,
    /// Draw the width from the settings' random width range.
    pub random_width: bool,
}

/// Spawns vehicles at the start of a segment.
#[derive(Clone)]
pub struct VehicleFactory {
    frequency: SpawnFrequency,
    template: VehicleTemplate,
    creator: Option<CreateFn>,
    /// The time at which the next vehicle is due.
    next_spawn: f64,
    last_spawned: Option<VehicleId>,
}

impl SpawnFrequency {
    /// A frequency decided by `f`, called every tick with the time and the last vehicle spawned.
    pub fn custom(f: impl Fn(f64, Option<&Vehicle>) -> bool + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }

    fn validate(&self) -> Result<()> {
        match *self {
            SpawnFrequency::Every(period) => positive("spawn period", period).map(|_| ()),
            SpawnFrequency::RandomInterval(min, max) => {
                positive("minimum spawn interval", min)?;
                if max < min || !max.is_finite() {
                    return Err(Error::InvalidParameter {
                        name: "maximum spawn interval",
                        value: max,
                    });
                }
                Ok(())
            }
            SpawnFrequency::Custom(_) => Ok(()),
        }
    }

    /// Draws the time until the next spawn, if the frequency is a schedule.
    fn interval(&self, rng: &mut impl Rng) -> Option<f64> {
        match *self {
            SpawnFrequency::Every(period) => Some(period),
            SpawnFrequency::RandomInterval(min, max) => {
                Some(Uniform::new_inclusive(min, max).sample(rng))
            }
            SpawnFrequency::Custom(_) => None,
        }
    }
}

impl fmt::Debug for SpawnFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnFrequency::Every(period) => f.debug_tuple("Every").field(period).finish(),
            SpawnFrequency::RandomInterval(min, max) => {
                f.debug_tuple("RandomInterval").field(min).field(max).finish()
            }
            SpawnFrequency::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl VehicleFactory {
    /// Creates a factory whose first vehicle is due immediately.
    pub fn new(frequency: SpawnFrequency, template: VehicleTemplate) -> Result<Self> {
        frequency.validate()?;
        Ok(Self {
            frequency,
            template,
            creator: None,
            next_spawn: 0.0,
            last_spawned: None,
        })
    }

    /// Passes the attributes of every vehicle through `f` before it is spawned.
    pub fn with_creator(
        self,
        f: impl Fn(f64, VehicleAttributes) -> VehicleAttributes + 'static,
    ) -> Self {
        Self {
            creator: Some(Rc::new(f)),
            ..self
        }
    }

    pub fn frequency(&self) -> &SpawnFrequency {
        &self.frequency
    }

    pub fn template(&self) -> &VehicleTemplate {
        &self.template
    }

    /// The last vehicle spawned, which may since have left the simulation.
    pub fn last_spawned(&self) -> Option<VehicleId> {
        self.last_spawned
    }

    /// Whether to spawn a vehicle at time `t`.
    ///
    /// # Parameters
    /// * `last` - The last vehicle spawned, if it still exists
    /// * `has_room` - Whether the start of the segment is clear
    pub(crate) fn should_spawn(
        &self,
        t: f64,
        last: Option<&Vehicle>,
        has_room: bool,
        settings: &Settings,
    ) -> bool {
        match &self.frequency {
            SpawnFrequency::Custom(f) => f(t, last),
            _ => t >= self.next_spawn && (has_room || settings.force_spawn),
        }
    }

    /// Records a spawn at time `t` and schedules the next one.
    pub(crate) fn spawned(&mut self, t: f64, id: Option<VehicleId>, rng: &mut impl Rng) {
        if let Some(interval) = self.frequency.interval(rng) {
            self.next_spawn = t + interval;
        }
        self.last_spawned = id;
    }

    /// The attributes of the vehicle spawned at time `t`.
    pub(crate) fn attributes(
        &self,
        t: f64,
        settings: &Settings,
        speed_limit: f64,
        rng: &mut impl Rng,
    ) -> VehicleAttributes {
        let template = &self.template;
        let mut attributes = VehicleAttributes::from_settings(settings);
        attributes.v = template.speed.unwrap_or(speed_limit);
        attributes.a = template.acceleration.unwrap_or(0.0);

        attributes.color = if template.random_color {
            let [lo, hi] = settings.random_color;
            let channel = Uniform::new_inclusive(lo, hi);
            [channel.sample(rng), channel.sample(rng), channel.sample(rng)]
        } else {
            template.color.unwrap_or(settings.vehicle_color)
        };
        attributes.length = if template.random_length {
            let [lo, hi] = settings.random_length;
            Uniform::new_inclusive(lo, hi).sample(rng)
        } else {
            template.length.unwrap_or(settings.vehicle_length)
        };
        attributes.width = if template.random_width {
            let [lo, hi] = settings.random_width;
            Uniform::new_inclusive(lo, hi).sample(rng)
        } else {
            template.width.unwrap_or(settings.vehicle_width)
        };

        match &self.creator {
            Some(create) => create(t, attributes),
            None => attributes,
        }
    }
}

impl fmt::Debug for VehicleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VehicleFactory")
            .field("frequency", &self.frequency)
            .field("template", &self.template)
            .field("creator", &self.creator.is_some())
            .field("next_spawn", &self.next_spawn)
            .finish()
    }
}
