/// Integrates a longitudinal position and velocity over `dt` with a constant acceleration.
///
/// Uses a second order Taylor step for the position and a first order step for the
/// velocity. If the velocity would become negative during the step, the vehicle is
/// instead brought to rest exactly at its analytic stopping point.
///
/// Returns the distance travelled and the new velocity.
pub fn integrate(vel: f64, acc: f64, dt: f64) -> (f64, f64) {
    let new_vel = vel + acc * dt;
    if new_vel >= 0.0 {
        (vel * dt + 0.5 * acc * dt * dt, new_vel)
    } else {
        // acc < 0 here, so the stopping distance is non-negative
        (-vel * vel / (2.0 * acc), 0.0)
    }
}
