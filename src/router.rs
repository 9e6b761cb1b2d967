use crate::{Error, Result, SegmentId};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

/// Probabilities must sum to one within this tolerance.
const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// A routing function of the arrival time.
pub type RouteFn = Rc<dyn Fn(f64) -> Option<SegmentId>>;

/// Decides which segment a vehicle moves onto when it leaves a segment.
///
/// A router is consulted exactly once per vehicle, when the vehicle enters the segment.
#[derive(Clone, Default)]
pub enum Router {
    /// Vehicles leave the simulation at the end of the segment.
    #[default]
    Despawn,
    /// Vehicles always continue onto the same segment.
    FixedNext(SegmentId),
    /// Each vehicle picks its next segment at random.
    WeightedChoice(WeightedChoice),
    /// The next segment is a function of the arrival time.
    TimeFn(RouteFn),
}

/// A probability distribution over next segments.
#[derive(Clone)]
pub struct WeightedChoice {
    choices: Vec<(SegmentId, f64)>,
    index: Option<WeightedIndex<f64>>,
}

impl Router {
    /// A router picking among `choices`, each a segment and its probability.
    /// Checked by [Router::validate] when the road graph is installed.
    pub fn weighted(choices: impl IntoIterator<Item = (SegmentId, f64)>) -> Self {
        let choices: Vec<_> = choices.into_iter().collect();
        let index = WeightedIndex::new(choices.iter().map(|(_, p)| *p)).ok();
        Self::WeightedChoice(WeightedChoice { choices, index })
    }

    /// A router calling `f` with the arrival time of each vehicle.
    pub fn time_fn(f: impl Fn(f64) -> Option<SegmentId> + 'static) -> Self {
        Self::TimeFn(Rc::new(f))
    }

    /// Checks that the router only refers to known segments and that its probabilities
    /// form a distribution.
    ///
    /// # Parameters
    /// * `owner` - The name of the segment the router belongs to, for error messages.
    /// * `exists` - Whether a segment exists.
    pub(crate) fn validate(&self, owner: &str, exists: impl Fn(SegmentId) -> bool) -> Result<()> {
        let unknown = |id: SegmentId| Error::UnknownSegment(format!("{:?} (routed from {})", id, owner));
        match self {
            Router::Despawn | Router::TimeFn(_) => Ok(()),
            Router::FixedNext(id) if exists(*id) => Ok(()),
            Router::FixedNext(id) => Err(unknown(*id)),
            Router::WeightedChoice(choice) => {
                if let Some((id, _)) = choice.choices.iter().find(|(id, _)| !exists(*id)) {
                    return Err(unknown(*id));
                }
                if let Some((_, p)) = choice.choices.iter().find(|(_, p)| *p < 0.0) {
                    return Err(Error::NegativeProbability {
                        segment: owner.into(),
                        probability: *p,
                    });
                }
                let sum: f64 = choice.choices.iter().map(|(_, p)| p).sum();
                if (sum - 1.0).abs() > PROBABILITY_TOLERANCE || choice.index.is_none() {
                    return Err(Error::InvalidProbabilities {
                        segment: owner.into(),
                        sum,
                    });
                }
                Ok(())
            }
        }
    }

    /// Picks the next segment of a vehicle arriving at time `t`.
    pub fn resolve(&self, t: f64, rng: &mut impl Rng) -> Option<SegmentId> {
        match self {
            Router::Despawn => None,
            Router::FixedNext(id) => Some(*id),
            Router::WeightedChoice(choice) => choice
                .index
                .as_ref()
                .map(|index| choice.choices[index.sample(rng)].0),
            Router::TimeFn(f) => f(t),
        }
    }

    /// The segments reachable from the segment at time `t`, with their probabilities.
    pub fn hops(&self, t: f64) -> SmallVec<[(SegmentId, f64); 4]> {
        match self {
            Router::Despawn => SmallVec::new(),
            Router::FixedNext(id) => smallvec::smallvec![(*id, 1.0)],
            Router::WeightedChoice(choice) => choice
                .choices
                .iter()
                .filter(|(_, p)| *p > 0.0)
                .copied()
                .collect(),
            Router::TimeFn(f) => f(t).into_iter().map(|id| (id, 1.0)).collect(),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Router::Despawn => write!(f, "Despawn"),
            Router::FixedNext(id) => f.debug_tuple("FixedNext").field(id).finish(),
            Router::WeightedChoice(choice) => {
                f.debug_tuple("WeightedChoice").field(&choice.choices).finish()
            }
            Router::TimeFn(_) => write!(f, "TimeFn"),
        }
    }
}
