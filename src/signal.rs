use crate::error::positive;
use crate::{Error, Result, Settings};
use serde::{Deserialize, Serialize};

/// The state of a traffic light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightState {
    #[default]
    Red,
    Orange,
    Green,
}

/// The durations of the phases of a traffic light, in s.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightTimings {
    pub red: f64,
    pub orange: f64,
    pub green: f64,
}

/// A traffic light cycling Red, Green, Orange, Red...
///
/// The state is a pure function of the simulation time, so replaying
/// from any time gives the same sequence of states.
#[derive(Clone, Debug)]
pub struct TrafficLight {
    /// The phase durations.
    timings: LightTimings,
    /// The state at `t = 0`.
    initial: LightState,
    /// A static light never leaves its initial state.
    is_static: bool,
    /// The state as of the last update.
    state: LightState,
}

/// A stop sign. Vehicles always stop in front of it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StopSign {
    /// Distance past the end of the segment at which vehicles aim to stop, in m.
    offset: f64,
}

/// A signal controlling the end of a segment.
#[derive(Clone, Debug)]
pub enum Signal {
    TrafficLight(TrafficLight),
    StopSign(StopSign),
}

impl LightTimings {
    /// The default timings of the given settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            red: settings.red_duration,
            orange: settings.orange_duration,
            green: settings.green_duration,
        }
    }

    /// The duration of a full cycle.
    pub fn cycle(&self) -> f64 {
        self.red + self.orange + self.green
    }

    fn validate(&self) -> Result<()> {
        positive("red_duration", self.red)?;
        positive("green_duration", self.green)?;
        if self.orange < 0.0 || !self.orange.is_finite() {
            return Err(Error::InvalidParameter {
                name: "orange_duration",
                value: self.orange,
            });
        }
        Ok(())
    }
}

impl TrafficLight {
    /// Creates a traffic light.
    pub fn new(timings: LightTimings, initial: LightState, is_static: bool) -> Result<Self> {
        timings.validate()?;
        Ok(Self {
            timings,
            initial,
            is_static,
            state: initial,
        })
    }

    /// The current state of the light.
    pub fn state(&self) -> LightState {
        self.state
    }

    /// The phase durations.
    pub fn timings(&self) -> &LightTimings {
        &self.timings
    }

    /// Computes the state of the light at time `t`.
    pub fn state_at(&self, t: f64) -> LightState {
        if self.is_static {
            return self.initial;
        }
        let LightTimings { orange, green, .. } = self.timings;
        let offset = match self.initial {
            LightState::Green => 0.0,
            LightState::Orange => green,
            LightState::Red => green + orange,
        };
        let phase = (t + offset).rem_euclid(self.timings.cycle());
        if phase < green {
            LightState::Green
        } else if phase < green + orange {
            LightState::Orange
        } else {
            LightState::Red
        }
    }

    fn update(&mut self, t: f64) {
        self.state = self.state_at(t);
    }
}

impl StopSign {
    /// Creates a stop sign, with vehicles stopping `offset` metres past the end of the segment.
    pub fn new(offset: f64) -> Self {
        Self { offset }
    }
}

impl Signal {
    /// A stop sign with the offset configured in the settings.
    pub fn stop_sign(settings: &Settings) -> Self {
        Self::StopSign(StopSign::new(settings.stop_sign_offset))
    }

    /// Updates the signal to time `t`.
    pub(crate) fn update(&mut self, t: f64) {
        if let Signal::TrafficLight(light) = self {
            light.update(t);
        }
    }

    /// The light state, or `None` for a stop sign.
    pub fn light_state(&self) -> Option<LightState> {
        match self {
            Signal::TrafficLight(light) => Some(light.state()),
            Signal::StopSign(_) => None,
        }
    }

    /// Where the dummy vehicle of the signal stands, as a distance past the end of the
    /// segment, or `None` if the signal can be passed.
    pub(crate) fn dummy_offset(&self, settings: &Settings) -> Option<f64> {
        match self {
            Signal::TrafficLight(light) => match light.state() {
                LightState::Green => None,
                LightState::Orange => Some(settings.delta_d_min / settings.orange_slow_down_coeff),
                LightState::Red => Some(settings.delta_d_min),
            },
            Signal::StopSign(sign) => Some(sign.offset),
        }
    }

    /// Whether vehicles must not leave the segment at all.
    pub(crate) fn holds_traffic(&self) -> bool {
        match self {
            Signal::TrafficLight(light) => light.state() == LightState::Red,
            Signal::StopSign(_) => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn light(initial: LightState) -> TrafficLight {
        let timings = LightTimings {
            red: 30.0,
            orange: 4.0,
            green: 26.0,
        };
        TrafficLight::new(timings, initial, false).unwrap()
    }

    #[test]
    fn cycle_from_red() {
        let light = light(LightState::Red);
        assert_eq!(light.state_at(0.0), LightState::Red);
        assert_eq!(light.state_at(29.9), LightState::Red);
        assert_eq!(light.state_at(30.0), LightState::Green);
        assert_eq!(light.state_at(55.9), LightState::Green);
        assert_eq!(light.state_at(56.0), LightState::Orange);
        assert_eq!(light.state_at(60.0), LightState::Red);
    }

    #[test]
    fn cycle_from_orange() {
        let light = light(LightState::Orange);
        assert_eq!(light.state_at(0.0), LightState::Orange);
        assert_eq!(light.state_at(4.0), LightState::Red);
        assert_eq!(light.state_at(34.0), LightState::Green);
    }

    #[test]
    fn state_repeats_every_cycle() {
        let light = light(LightState::Green);
        for i in 0..200 {
            let t = 0.37 * i as f64;
            for k in 1..4 {
                assert_eq!(light.state_at(t), light.state_at(t + 60.0 * k as f64));
            }
        }
    }

    #[test]
    fn static_light_never_changes() {
        let timings = LightTimings::from_settings(&Settings::default());
        let light = TrafficLight::new(timings, LightState::Green, true).unwrap();
        assert!((0..100).all(|i| light.state_at(i as f64) == LightState::Green));
    }

    #[test]
    fn dummy_positions() {
        let settings = Settings::default();
        let mut signal = Signal::TrafficLight(light(LightState::Red));
        signal.update(0.0);
        assert_eq!(signal.dummy_offset(&settings), Some(2.0));
        signal.update(57.0);
        assert_eq!(signal.dummy_offset(&settings), Some(4.0));
        signal.update(31.0);
        assert_eq!(signal.dummy_offset(&settings), None);
        assert_eq!(Signal::stop_sign(&settings).dummy_offset(&settings), Some(1.0));
    }

    #[test]
    fn rejects_bad_timings() {
        let timings = LightTimings {
            red: 0.0,
            orange: 4.0,
            green: 26.0,
        };
        assert!(TrafficLight::new(timings, LightState::Red, false).is_err());
    }
}
