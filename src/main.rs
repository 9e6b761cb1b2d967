use std::process::ExitCode;
use std::time::Instant;
use traffic_flow::Scenario;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: traffic-flow <scenario.json>");
            return ExitCode::FAILURE;
        }
    };

    match simulate(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}: {}", path, err);
            ExitCode::FAILURE
        }
    }
}

fn simulate(path: &str) -> traffic_flow::Result<()> {
    let scenario = Scenario::load(path)?;
    let (mut sim, _) = scenario.build()?;
    log::info!(
        "Loaded {} segments, simulating {} s",
        sim.iter_segments().count(),
        scenario.duration
    );

    let start = Instant::now();
    sim.run(scenario.duration)?;
    let elapsed = start.elapsed();
    log::info!(
        "Took {:?} ({:.0}x real time)",
        elapsed,
        scenario.duration / elapsed.as_secs_f64().max(1e-9)
    );

    for segment in sim.iter_segments() {
        for sensor in segment.sensors() {
            let observations = sensor.observations();
            let mean_speed = observations.iter().map(|o| o.v).sum::<f64>()
                / observations.len().max(1) as f64;
            println!(
                "{} at {:.0}%: {} vehicles, mean speed {:.2} m/s",
                segment.name(),
                100.0 * sensor.fraction(),
                observations.len(),
                mean_speed
            );
        }
    }
    Ok(())
}
