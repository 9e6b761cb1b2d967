//! The road graph and the search for leaders across segment boundaries.

use crate::vehicle::{Leader, LeaderSource};
use crate::{Router, SegmentId, SegmentSet, Settings, VehicleSet};
use slotmap::SecondaryMap;
use smallvec::SmallVec;

/// The declarative routing of a network: the router at the end of each segment.
/// Segments without an entry despawn their vehicles.
#[derive(Clone, Debug, Default)]
pub struct RoadGraph {
    routes: SecondaryMap<SegmentId, Router>,
}

impl RoadGraph {
    /// Creates an empty road graph.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the router at the end of `from`.
    pub fn insert(&mut self, from: SegmentId, router: Router) -> &mut Self {
        self.routes.insert(from, router);
        self
    }

    /// Vehicles at the end of `from` continue onto `to`.
    pub fn connect(&mut self, from: SegmentId, to: SegmentId) -> &mut Self {
        self.insert(from, Router::FixedNext(to))
    }

    /// The router at the end of `from`.
    pub fn get(&self, from: SegmentId) -> Option<&Router> {
        self.routes.get(from)
    }

    /// Iterates over every segment with a router.
    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &Router)> + '_ {
        self.routes.iter()
    }
}

/// Finds the leaders of the front vehicle of a segment beyond its end, with gaps
/// measured from the end of the segment.
///
/// If lookahead is unweighted, the search follows the next segment the front vehicle
/// was assigned. Otherwise, or when the segment is empty, every segment the router may
/// pick is searched with a weight proportional to its probability.
pub(crate) fn resolve_leaders(
    segments: &SegmentSet,
    vehicles: &VehicleSet,
    from: SegmentId,
    t: f64,
    settings: &Settings,
) -> SmallVec<[Leader; 4]> {
    let segment = &segments[from];
    let front = segment.vehicles().next().map(|id| &vehicles[id]);
    let hops = match front {
        Some(vehicle) if !settings.weighted_lookahead => match vehicle.next_segment {
            Some(next) => smallvec::smallvec![(next, 1.0)],
            None => SmallVec::new(),
        },
        _ => segment.router().hops(t),
    };

    hops.into_iter()
        .filter_map(|(id, p)| {
            let (gap, vel) = look_ahead(segments, vehicles, id, 0.0, 1, t, settings)?;
            Some(Leader {
                gap,
                vel,
                weight: settings.weight_next_segment * p,
                source: LeaderSource::Route(id),
            })
        })
        .collect()
}

/// Searches `id` and the segments beyond it for something to follow.
///
/// Returns the gap from the point `offset` metres before the start of `id`,
/// and the velocity, or `None` if nothing is found within the lookahead bounds.
fn look_ahead(
    segments: &SegmentSet,
    vehicles: &VehicleSet,
    id: SegmentId,
    offset: f64,
    depth: usize,
    t: f64,
    settings: &Settings,
) -> Option<(f64, f64)> {
    if depth > settings.max_lookahead_depth || offset > settings.max_lookahead_distance {
        log::trace!("Lookahead from {:?} ran out at depth {}", id, depth);
        return None;
    }
    let segment = segments.get(id)?;

    if let Some((_, rear, vel)) = segment.rear_vehicle(vehicles) {
        return Some((offset + rear, vel));
    }
    if let Some(stop) = segment.stop_position(settings) {
        return Some((offset + stop, 0.0));
    }

    // Nothing on this segment: average over whatever lies beyond
    let offset = offset + segment.length();
    let (total, gap, vel) = segment
        .router()
        .hops(t)
        .into_iter()
        .filter_map(|(next, p)| {
            look_ahead(segments, vehicles, next, offset, depth + 1, t, settings).map(|l| (p, l))
        })
        .fold((0.0, 0.0, 0.0), |(total, gap, vel), (p, (g, v))| {
            (total + p, gap + p * g, vel + p * v)
        });
    if total > 0.0 {
        Some((gap / total, vel / total))
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Point2d;
    use crate::{Segment, SegmentAttributes, Signal, StraightAttributes, Vehicle, VehicleAttributes, VehicleId};
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Default)]
    struct Network {
        segments: SegmentSet,
        vehicles: VehicleSet,
        limits: SecondaryMap<SegmentId, f64>,
    }

    impl Network {
        fn straight(&mut self, start: f64, end: f64) -> SegmentId {
            let attribs = SegmentAttributes::Straight(StraightAttributes::new(
                Point2d::new(start, 0.0),
                Point2d::new(end, 0.0),
                10.0,
            ));
            let id = self
                .segments
                .insert_with_key(|id| Segment::new(id, &attribs).unwrap());
            self.limits.insert(id, 10.0);
            id
        }

        fn place(&mut self, segment: SegmentId, d: f64) -> VehicleId {
            let attributes = VehicleAttributes::from_settings(&Settings::default()).at(d);
            let id = self
                .vehicles
                .insert_with_key(|id| Vehicle::new(id, &attributes, segment));
            let mut rng = StdRng::seed_from_u64(3);
            self.segments[segment]
                .new_car(&mut self.vehicles, id, 0.0, &mut rng, &self.limits)
                .unwrap();
            id
        }

        fn leaders(&self, from: SegmentId, settings: &Settings) -> SmallVec<[Leader; 4]> {
            resolve_leaders(&self.segments, &self.vehicles, from, 0.0, settings)
        }
    }

    /// A 100 m, a 50 m and a 150 m segment in a row, with a vehicle 30 m into the last.
    fn chain() -> (Network, [SegmentId; 3]) {
        let mut net = Network::default();
        let a = net.straight(0.0, 100.0);
        let b = net.straight(100.0, 150.0);
        let c = net.straight(150.0, 300.0);
        net.segments[a].set_router(Router::FixedNext(b));
        net.segments[b].set_router(Router::FixedNext(c));
        net.place(c, 30.0);
        (net, [a, b, c])
    }

    #[test]
    fn gap_spans_an_empty_segment() {
        let (net, [a, b, _]) = chain();
        let settings = Settings::default();
        let leaders = net.leaders(a, &settings);
        assert_eq!(leaders.len(), 1);
        assert_approx_eq!(leaders[0].gap, 50.0 + 30.0 - settings.vehicle_length);
        assert_approx_eq!(leaders[0].vel, 0.0);
        assert_approx_eq!(leaders[0].weight, settings.weight_next_segment);
        assert_eq!(leaders[0].source, LeaderSource::Route(b));
    }

    #[test]
    fn signal_on_the_next_segment_is_followed() {
        let (mut net, [a, b, _]) = chain();
        let settings = Settings::default();
        net.segments[b].set_signal(Some(Signal::stop_sign(&settings)));
        let leaders = net.leaders(a, &settings);
        assert_eq!(leaders.len(), 1);
        assert_approx_eq!(leaders[0].gap, 50.0 + settings.stop_sign_offset);
    }

    #[test]
    fn lookahead_stops_at_its_bounds() {
        let (net, [a, _, _]) = chain();
        let near = Settings {
            max_lookahead_distance: 40.0,
            ..Default::default()
        };
        assert!(net.leaders(a, &near).is_empty());
        let shallow = Settings {
            max_lookahead_depth: 1,
            ..Default::default()
        };
        assert!(net.leaders(a, &shallow).is_empty());
    }

    #[test]
    fn weighted_lookahead_searches_every_choice() {
        let mut net = Network::default();
        let a = net.straight(0.0, 100.0);
        let b = net.straight(100.0, 200.0);
        let d = net.straight(100.0, 300.0);
        net.segments[a].set_router(Router::weighted([(b, 0.25), (d, 0.75)]));
        net.place(b, 20.0);
        net.place(d, 40.0);
        let front = net.place(a, 50.0);
        net.vehicles[front].next_segment = Some(b);

        let settings = Settings::default();
        let leaders = net.leaders(a, &settings);
        assert_eq!(leaders.len(), 1);
        assert_eq!(leaders[0].source, LeaderSource::Route(b));
        assert_approx_eq!(leaders[0].gap, 20.0 - settings.vehicle_length);

        let weighted = Settings {
            weighted_lookahead: true,
            ..Default::default()
        };
        let leaders = net.leaders(a, &weighted);
        assert_eq!(leaders.len(), 2);
        let to_d = leaders
            .iter()
            .find(|leader| leader.source == LeaderSource::Route(d))
            .unwrap();
        assert_approx_eq!(to_d.gap, 40.0 - weighted.vehicle_length);
        assert_approx_eq!(to_d.weight, 0.75 * weighted.weight_next_segment);
    }
}
