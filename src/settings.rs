use crate::error::positive;
use crate::vehicle::DriverParams;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// The car following model used to compute vehicle accelerations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowingModel {
    /// The intelligent driver model.
    Idm,
    /// The improved intelligent driver model, which does not overshoot
    /// when a vehicle drives faster than its desired speed.
    #[default]
    ImprovedIdm,
}

/// The tunable constants of a simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The length of a simulation tick, in s.
    pub dt: f64,
    /// The car following model.
    pub model: FollowingModel,
    /// Seed of the random number generator; `None` seeds from entropy.
    pub seed: Option<u64>,

    /// Minimum bumper to bumper gap between vehicles, in m.
    pub delta_d_min: f64,
    /// Maximum acceleration of a vehicle, in m/s^2.
    pub a_max: f64,
    /// Comfortable deceleration of a vehicle, a positive number in m/s^2.
    pub a_min_comfort: f64,
    /// Acceleration exponent, controls how smoothly vehicles approach their desired speed.
    pub a_exp: f64,
    /// Reaction time of a driver, in s.
    pub t_react: f64,
    /// Deceleration applied to frozen vehicles, a positive number in m/s^2.
    pub emergency_deceleration: f64,

    /// Default speed limit of a segment, in m/s.
    pub v_max: f64,
    /// Default width of a segment, in m.
    pub road_width: f64,
    /// Length of the zone at the end of a segment over which the speed limit
    /// blends into the next segment's, in m.
    pub transition_zone: f64,
    /// Number of straight parts a curved segment is made of.
    pub curve_parts: usize,
    /// Factor applied to the speed limit of curved segments built from a scenario.
    pub curve_speed_factor: f64,
    /// Spacing of lane marking arrows, in m.
    pub arrow_period: f64,

    /// Weight of the vehicle directly ahead when computing the virtual leader.
    pub weight_in_front: f64,
    /// Weight of the vehicles on the next segments when computing the virtual leader.
    pub weight_next_segment: f64,
    /// Weight of vehicles being bumped into when computing the virtual leader.
    pub weight_bumping: f64,

    /// If true, leaders across junctions are averaged over every possible next segment,
    /// weighted by their probabilities. Otherwise only the front vehicle's own next segment is used.
    pub weighted_lookahead: bool,
    /// Maximum number of segments to look through when searching for a leader.
    pub max_lookahead_depth: usize,
    /// Maximum distance to look ahead when searching for a leader, in m.
    pub max_lookahead_distance: f64,

    /// Duration of the red light, in s.
    pub red_duration: f64,
    /// Duration of the orange light, in s. May be zero.
    pub orange_duration: f64,
    /// Duration of the green light, in s.
    pub green_duration: f64,
    /// The larger this is, the closer to the stop line vehicles aim to stop on orange.
    pub orange_slow_down_coeff: f64,
    /// Distance past the end of a segment at which vehicles aim to stop for a stop sign, in m.
    pub stop_sign_offset: f64,

    /// Default vehicle length, in m.
    pub vehicle_length: f64,
    /// Default vehicle width, in m.
    pub vehicle_width: f64,
    /// Default vehicle colour.
    pub vehicle_color: [u8; 3],
    /// Range of the colour channels of randomly coloured vehicles.
    pub random_color: [u8; 2],
    /// Range of random vehicle lengths, in m.
    pub random_length: [f64; 2],
    /// Range of random vehicle widths, in m.
    pub random_width: [f64; 2],
    /// If true, factories spawn vehicles even when the entrance of their segment is occupied.
    pub force_spawn: bool,
}

/// The default width of a road, in m.
pub(crate) const DEFAULT_ROAD_WIDTH: f64 = 3.0;

/// The default number of straight parts approximating a curved road.
pub(crate) const DEFAULT_CURVE_PARTS: usize = 10;

impl Default for Settings {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            model: FollowingModel::ImprovedIdm,
            seed: None,
            delta_d_min: 2.0,
            a_max: 1.0,
            a_min_comfort: 1.5,
            a_exp: 4.0,
            t_react: 1.0,
            emergency_deceleration: 6.0,
            v_max: 13.9,
            road_width: DEFAULT_ROAD_WIDTH,
            transition_zone: 10.0,
            curve_parts: DEFAULT_CURVE_PARTS,
            curve_speed_factor: 0.45,
            arrow_period: 10.0,
            weight_in_front: 5.0,
            weight_next_segment: 5.0,
            weight_bumping: 10.0,
            weighted_lookahead: false,
            max_lookahead_depth: 10,
            max_lookahead_distance: 250.0,
            red_duration: 30.0,
            orange_duration: 4.0,
            green_duration: 26.0,
            orange_slow_down_coeff: 0.5,
            stop_sign_offset: 1.0,
            vehicle_length: 3.0,
            vehicle_width: 1.8,
            vehicle_color: [30, 140, 130],
            random_color: [70, 180],
            random_length: [2.0, 4.5],
            random_width: [1.8, 2.4],
            force_spawn: false,
        }
    }
}

impl Settings {
    /// The default driver parameters.
    pub fn driver(&self) -> DriverParams {
        DriverParams {
            a_max: self.a_max,
            a_min_comfort: self.a_min_comfort,
            a_exp: self.a_exp,
            t_react: self.t_react,
            delta_d_min: self.delta_d_min,
        }
    }

    /// Checks the settings for values that would break the simulation.
    pub fn validate(&self) -> Result<()> {
        positive("dt", self.dt)?;
        positive("v_max", self.v_max)?;
        positive("road_width", self.road_width)?;
        positive("curve_speed_factor", self.curve_speed_factor)?;
        positive("arrow_period", self.arrow_period)?;
        positive("orange_slow_down_coeff", self.orange_slow_down_coeff)?;
        positive("red_duration", self.red_duration)?;
        positive("green_duration", self.green_duration)?;
        positive("emergency_deceleration", self.emergency_deceleration)?;
        positive("curve_parts", self.curve_parts as f64)?;
        for (name, [lo, hi]) in [
            ("random_length", self.random_length),
            ("random_width", self.random_width),
        ] {
            positive(name, lo)?;
            if hi < lo {
                return Err(Error::InvalidParameter { name, value: hi });
            }
        }
        if self.random_color[1] < self.random_color[0] {
            return Err(Error::InvalidParameter {
                name: "random_color",
                value: self.random_color[1] as f64,
            });
        }
        self.driver().validate()
    }
}
