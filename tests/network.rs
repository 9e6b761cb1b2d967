//! Tests that involve vehicles moving between several segments.

use assert_approx_eq::assert_approx_eq;
use traffic_flow::{
    math::{Point2d, Vector2d},
    CurvedAttributes, LightState, LightTimings, RoadGraph, Router, Scenario, SegmentAttributes,
    SegmentId, Settings, Signal, Simulation, SpawnFrequency, StraightAttributes, TrafficLight,
    VehicleAttributes, VehicleFactory, VehicleId,
};

fn simulation() -> Simulation {
    Simulation::new(Settings {
        seed: Some(11),
        ..Default::default()
    })
    .unwrap()
}

fn straight(sim: &mut Simulation, start: (f64, f64), end: (f64, f64)) -> SegmentId {
    let attribs = StraightAttributes::new(
        Point2d::new(start.0, start.1),
        Point2d::new(end.0, end.1),
        13.9,
    );
    sim.add_segment(&SegmentAttributes::Straight(attribs)).unwrap()
}

/// A vehicle crossing a segment boundary is on exactly one segment at every tick.
#[test]
fn hand_off_keeps_vehicle_on_one_segment() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (50.0, 0.0));
    let b = straight(&mut sim, (50.0, 0.0), (150.0, 0.0));
    let mut graph = RoadGraph::new();
    graph.connect(a, b);
    sim.set_road_graph(graph).unwrap();

    let attributes = VehicleAttributes::from_settings(sim.settings())
        .at(45.0)
        .with_velocity(10.0);
    let veh = sim.spawn_vehicle(a, &attributes).unwrap();
    assert_eq!(sim.get_vehicle(veh).unwrap().next_segment(), Some(b));

    for _ in 0..120 {
        sim.step().unwrap();
        let holders = sim
            .iter_segments()
            .filter(|segment| segment.vehicles().any(|id| id == veh))
            .count();
        assert_eq!(holders, 1);
    }

    let vehicle = sim.get_vehicle(veh).unwrap();
    assert_eq!(vehicle.segment_id(), b);
    assert_eq!(vehicle.next_segment(), None);
    assert!(sim.vehicle_position(veh).unwrap() > 10.0);
}

/// A vehicle leaving the last segment of a route despawns.
#[test]
fn vehicle_despawns_at_end_of_route() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (20.0, 0.0));
    let attributes = VehicleAttributes::from_settings(sim.settings())
        .at(15.0)
        .with_velocity(10.0);
    let veh = sim.spawn_vehicle(a, &attributes).unwrap();
    sim.run(2.0).unwrap();
    assert!(sim.get_vehicle(veh).is_none());
    assert_eq!(sim.iter_vehicles().count(), 0);
}

/// The parts of a curved segment add up to its length, and a vehicle leaves it heading
/// in the end direction.
#[test]
fn curved_segment_joins_straight() {
    let mut sim = simulation();
    let curve = sim
        .add_segment(&SegmentAttributes::Curved(CurvedAttributes::new(
            Point2d::new(0.0, 0.0),
            Vector2d::new(1.0, 0.0),
            Point2d::new(50.0, 50.0),
            Vector2d::new(0.0, 1.0),
            8.0,
        )))
        .unwrap();
    let exit = straight(&mut sim, (50.0, 50.0), (50.0, 150.0));
    let mut graph = RoadGraph::new();
    graph.connect(curve, exit);
    sim.set_road_graph(graph).unwrap();

    let segment = sim.get_segment(curve).unwrap();
    let parts: f64 = segment.parts().iter().map(|part| part.length()).sum();
    assert_approx_eq!(segment.length(), parts);
    assert!(segment.length() > 50.0 * std::f64::consts::SQRT_2);
    assert!(segment.length() < 100.0);

    let attributes = VehicleAttributes::from_settings(sim.settings()).with_velocity(8.0);
    let veh = sim.spawn_vehicle(curve, &attributes).unwrap();
    while sim.get_vehicle(veh).unwrap().segment_id() == curve {
        assert!(sim.current_time() < 30.0, "vehicle never left the curve");
        sim.step().unwrap();
    }

    let end = sim.get_segment(curve).unwrap().end();
    assert_approx_eq!(end.x, 50.0);
    assert_approx_eq!(end.y, 50.0);

    let vehicle = sim.get_vehicle(veh).unwrap();
    assert_eq!(vehicle.segment_id(), exit);
    assert_approx_eq!(vehicle.direction().x, 0.0);
    assert_approx_eq!(vehicle.direction().y, 1.0);
    let front = vehicle.position() + vehicle.direction() * (0.5 * vehicle.length());
    let along = sim.vehicle_position(veh).unwrap();
    assert!(along < 1.0, "{} m into the exit", along);
    assert_approx_eq!(front.x, 50.0);
    assert_approx_eq!(front.y, 50.0 + along);
}

/// Weighted routing picks each next segment with its probability.
#[test]
fn weighted_routing_follows_probabilities() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (100.0, 0.0));
    let b = straight(&mut sim, (100.0, 0.0), (200.0, 0.0));
    let c = straight(&mut sim, (100.0, 0.0), (100.0, 100.0));
    let mut graph = RoadGraph::new();
    graph.insert(a, Router::weighted([(b, 0.3), (c, 0.7)]));
    sim.set_road_graph(graph).unwrap();

    let attributes = VehicleAttributes::from_settings(sim.settings());
    let mut to_b = 0;
    for _ in 0..2000 {
        let veh = sim.spawn_vehicle(a, &attributes).unwrap();
        match sim.get_vehicle(veh).unwrap().next_segment() {
            Some(next) if next == b => to_b += 1,
            Some(next) => assert_eq!(next, c),
            None => panic!("vehicle has no route"),
        }
    }
    assert!((to_b as i32 - 600).abs() < 80, "{} of 2000 routed to b", to_b);
}

/// Probabilities that do not sum to one are rejected and the old routing kept.
#[test]
fn invalid_routing_is_rejected() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (100.0, 0.0));
    let b = straight(&mut sim, (100.0, 0.0), (200.0, 0.0));
    let mut graph = RoadGraph::new();
    graph.insert(a, Router::weighted([(b, 0.5)]));
    assert!(sim.set_road_graph(graph).is_err());
    assert!(sim.road_graph().get(a).is_none());
}

/// A traffic light repeats its cycle.
#[test]
fn traffic_light_is_periodic() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (100.0, 0.0));
    let timings = LightTimings {
        red: 30.0,
        orange: 4.0,
        green: 26.0,
    };
    let light = TrafficLight::new(timings, LightState::Green, false).unwrap();
    sim.set_signal(a, Some(Signal::TrafficLight(light))).unwrap();
    assert_eq!(sim.signal_state(a), Some(LightState::Green));

    let mut states = vec![];
    for _ in 0..480 {
        sim.tick(0.5).unwrap();
        states.push(sim.signal_state(a).unwrap());
    }
    for i in 0..360 {
        assert_eq!(states[i], states[i + 120]);
    }
    let red = states[..120].iter().filter(|s| **s == LightState::Red).count();
    assert!((59..=61).contains(&red));
}

/// Vehicles stop before a red light and do not leave the segment.
#[test]
fn red_light_holds_traffic() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (100.0, 0.0));
    let b = straight(&mut sim, (100.0, 0.0), (200.0, 0.0));
    let mut graph = RoadGraph::new();
    graph.connect(a, b);
    sim.set_road_graph(graph).unwrap();
    let light = TrafficLight::new(
        LightTimings::from_settings(sim.settings()),
        LightState::Red,
        true,
    )
    .unwrap();
    sim.set_signal(a, Some(Signal::TrafficLight(light))).unwrap();

    let attributes = VehicleAttributes::from_settings(sim.settings()).with_velocity(13.9);
    let veh = sim.spawn_vehicle(a, &attributes).unwrap();
    sim.run(60.0).unwrap();

    let vehicle = sim.get_vehicle(veh).unwrap();
    assert_eq!(vehicle.segment_id(), a);
    assert!(vehicle.has_stopped());
    let pos = sim.vehicle_position(veh).unwrap();
    assert!(pos > 95.0 && pos < 100.0, "stopped at {}", pos);
}

/// Runs the simulation and returns the hardest braking of a vehicle while it exists, in m/s^2.
fn hardest_braking(sim: &mut Simulation, veh: VehicleId, duration: f64) -> f64 {
    let dt = sim.settings().dt;
    let mut worst: f64 = 0.0;
    let ticks = (duration / dt).round() as usize;
    for _ in 0..ticks {
        let before = match sim.get_vehicle(veh) {
            Some(vehicle) => vehicle.vel(),
            None => break,
        };
        sim.step().unwrap();
        if let Some(vehicle) = sim.get_vehicle(veh) {
            worst = worst.max((before - vehicle.vel()) / dt);
        }
    }
    worst
}

/// Approaching a red light, vehicles never brake harder than the emergency deceleration.
#[test]
fn red_light_braking_is_bounded() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (100.0, 0.0));
    let light = TrafficLight::new(
        LightTimings::from_settings(sim.settings()),
        LightState::Red,
        true,
    )
    .unwrap();
    sim.set_signal(a, Some(Signal::TrafficLight(light))).unwrap();

    let attributes = VehicleAttributes::from_settings(sim.settings()).with_velocity(13.9);
    let veh = sim.spawn_vehicle(a, &attributes).unwrap();
    let worst = hardest_braking(&mut sim, veh, 60.0);
    assert!(worst <= sim.settings().emergency_deceleration + 1e-9, "braked at {}", worst);
    assert!(sim.get_vehicle(veh).unwrap().has_stopped());
}

/// A vehicle too close to stop when the light turns red drives through it.
#[test]
fn vehicle_near_the_line_passes_when_the_light_turns() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (100.0, 0.0));
    let b = straight(&mut sim, (100.0, 0.0), (200.0, 0.0));
    let mut graph = RoadGraph::new();
    graph.connect(a, b);
    sim.set_road_graph(graph).unwrap();
    let timings = LightTimings::from_settings(sim.settings());
    let turns_red = timings.green + timings.orange;
    let light = TrafficLight::new(timings, LightState::Green, false).unwrap();
    sim.set_signal(a, Some(Signal::TrafficLight(light))).unwrap();

    sim.run(turns_red - 0.5).unwrap();
    let attributes = VehicleAttributes::from_settings(sim.settings())
        .at(90.0)
        .with_velocity(13.9);
    let veh = sim.spawn_vehicle(a, &attributes).unwrap();
    let worst = hardest_braking(&mut sim, veh, 2.0);

    assert_eq!(sim.signal_state(a), Some(LightState::Red));
    assert_eq!(sim.get_vehicle(veh).unwrap().segment_id(), b);
    assert!(worst <= sim.settings().emergency_deceleration + 1e-9, "braked at {}", worst);
}

/// A follower stops behind a frozen vehicle two segments ahead, across an empty segment.
#[test]
fn follower_stops_behind_frozen_vehicle_two_segments_ahead() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (100.0, 0.0));
    let b = straight(&mut sim, (100.0, 0.0), (150.0, 0.0));
    let c = straight(&mut sim, (150.0, 0.0), (300.0, 0.0));
    let mut graph = RoadGraph::new();
    graph.connect(a, b).connect(b, c);
    sim.set_road_graph(graph).unwrap();

    let stopped = VehicleAttributes::from_settings(sim.settings()).at(30.0);
    let frozen = sim.spawn_vehicle(c, &stopped).unwrap();
    sim.set_vehicle_frozen(frozen, true);
    let moving = VehicleAttributes::from_settings(sim.settings()).with_velocity(13.9);
    let follower = sim.spawn_vehicle(a, &moving).unwrap();
    sim.run(200.0).unwrap();

    let ahead = sim.get_vehicle(frozen).unwrap();
    let behind = sim.get_vehicle(follower).unwrap();
    assert!(behind.has_stopped());
    let rear = ahead.position().x - 0.5 * ahead.length();
    let front = behind.position().x + 0.5 * behind.length();
    let gap = rear - front;
    let delta_d_min = sim.settings().delta_d_min;
    assert!(gap > delta_d_min - 0.5 && gap < delta_d_min + 0.3, "gap of {}", gap);
}

/// A vehicle routed to a segment that does not exist is despawned with an error.
#[test]
fn vehicle_routed_to_missing_segment_is_despawned() {
    let mut other = simulation();
    let foreign = (0..3)
        .map(|i| straight(&mut other, (0.0, 10.0 * i as f64), (50.0, 10.0 * i as f64)))
        .last()
        .unwrap();

    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (50.0, 0.0));
    let b = straight(&mut sim, (50.0, 0.0), (150.0, 0.0));
    let mut graph = RoadGraph::new();
    graph.connect(a, b);
    graph.insert(b, Router::time_fn(move |_| Some(foreign)));
    sim.set_road_graph(graph).unwrap();

    let attributes = VehicleAttributes::from_settings(sim.settings())
        .at(45.0)
        .with_velocity(10.0);
    let veh = sim.spawn_vehicle(a, &attributes).unwrap();
    let mut failed = false;
    for _ in 0..120 {
        if sim.step().is_err() {
            failed = true;
            break;
        }
    }
    assert!(failed);
    assert!(sim.get_vehicle(veh).is_none());
    assert!(sim.iter_segments().all(|segment| segment.vehicles().all(|id| id != veh)));

    assert!(sim.spawn_vehicle(b, &attributes).is_err());
    assert_eq!(sim.iter_vehicles().count(), 0);
    sim.step().unwrap();
}

/// A factory spawns vehicles which a sensor records once each.
#[test]
fn sensor_records_spawned_vehicles() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (200.0, 0.0));
    let factory = VehicleFactory::new(SpawnFrequency::Every(2.0), Default::default()).unwrap();
    sim.set_factory(a, factory).unwrap();
    sim.add_sensor(a, 0.5).unwrap();
    sim.run(30.0).unwrap();

    let segment = sim.get_segment(a).unwrap();
    let sensor = segment.sensors().next().unwrap();
    let observations = sensor.observations();
    assert!(observations.len() >= 10, "only {} observations", observations.len());

    let mut seen: Vec<_> = observations.iter().map(|o| o.vehicle).collect();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), observations.len());
    for (earlier, later) in observations.iter().zip(&observations[1..]) {
        assert!(earlier.t <= later.t);
    }
    for observation in observations {
        assert!(observation.v > 0.0);
        assert!(observation.total_distance >= 100.0);
    }
}

/// The bundled demo scenario builds and runs.
#[test]
fn demo_scenario_runs() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/junction.json");
    let scenario = Scenario::load(path).unwrap();
    let (mut sim, ids) = scenario.build().unwrap();
    assert_eq!(sim.iter_segments().count(), 5);
    assert!(ids.get(4).is_some());
    sim.run(120.0).unwrap();
    assert!(sim.iter_vehicles().count() > 0);
}

/// A factory with its own spawn and creation functions.
#[test]
fn custom_factory_spawns_behind_its_last_vehicle() {
    let mut sim = simulation();
    let a = straight(&mut sim, (0.0, 0.0), (200.0, 0.0));
    let frequency = SpawnFrequency::custom(|_, last| last.map_or(true, |vehicle| vehicle.d() > 20.0));
    let factory = VehicleFactory::new(frequency, Default::default())
        .unwrap()
        .with_creator(|t, attributes| VehicleAttributes {
            color: [0, 0, (2.0 * t) as u8],
            ..attributes
        });
    sim.set_factory(a, factory).unwrap();
    sim.run(30.0).unwrap();

    let segment = sim.get_segment(a).unwrap();
    let on_segment: Vec<_> = segment
        .vehicles()
        .map(|id| sim.get_vehicle(id).unwrap())
        .collect();
    assert!(on_segment.len() >= 5, "only {} vehicles", on_segment.len());
    for pair in on_segment.windows(2) {
        let (ahead, behind) = (pair[0], pair[1]);
        assert!(ahead.d_rear() - behind.d() > 15.0);
        assert!(ahead.color()[2] < behind.color()[2]);
    }
}
