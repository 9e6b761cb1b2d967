use super::DriverParams;
use crate::settings::FollowingModel;

/// A leader as seen by the car following model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VirtualLeader {
    /// Bumper to bumper distance to the leader in m. Must be positive.
    pub gap: f64,
    /// The leader's velocity in m/s.
    pub vel: f64,
}

impl DriverParams {
    /// The desired gap to a leader, given own velocity and the approach rate.
    pub fn desired_gap(&self, vel: f64, approach: f64) -> f64 {
        let factor = 1. / (2. * self.a_min_comfort * self.a_max).sqrt();
        let dynamic = vel * self.t_react + vel * approach * factor;
        self.delta_d_min + f64::max(0.0, dynamic)
    }

    /// The free road acceleration term, without any leader.
    fn free_road(&self, vel: f64, v_max: f64) -> f64 {
        self.a_max * (1. - (vel / v_max).powf(self.a_exp))
    }

    /// Computes an acceleration using the intelligent driver model.
    ///
    /// # Arguments
    /// * `vel` - The velocity of the simulated vehicle (m/s).
    /// * `v_max` - The desired velocity (m/s).
    /// * `leader` - The vehicle ahead, if any.
    pub fn idm(&self, vel: f64, v_max: f64, leader: Option<VirtualLeader>) -> f64 {
        let free = self.free_road(vel, v_max);
        match leader {
            None => free,
            Some(leader) => {
                debug_assert!(leader.gap > 0.0, "gap to leader must be positive");
                let term = self.desired_gap(vel, vel - leader.vel) / leader.gap;
                free - self.a_max * term * term
            }
        }
    }

    /// Computes an acceleration using the improved intelligent driver model.
    /// Arguments are as for [DriverParams::idm].
    pub fn iidm(&self, vel: f64, v_max: f64, leader: Option<VirtualLeader>) -> f64 {
        let z = leader.map(|leader| {
            debug_assert!(leader.gap > 0.0, "gap to leader must be positive");
            self.desired_gap(vel, vel - leader.vel) / leader.gap
        });

        if vel <= v_max {
            let free = self.free_road(vel, v_max);
            match z {
                None => free,
                Some(z) if z >= 1.0 => self.a_max * (1. - z * z),
                Some(z) if free > 0.0 => free * (1. - z.powf(2. * self.a_max / free)),
                Some(_) => 0.0,
            }
        } else {
            let exponent = self.a_max * self.a_max / self.a_min_comfort;
            let free = -self.a_min_comfort * (1. - (v_max / vel).powf(exponent));
            match z {
                Some(z) if z >= 1.0 => free + self.a_max * (1. - z * z),
                _ => free,
            }
        }
    }

    /// Computes an acceleration with the given model.
    pub fn acceleration(
        &self,
        model: FollowingModel,
        vel: f64,
        v_max: f64,
        leader: Option<VirtualLeader>,
    ) -> f64 {
        match model {
            FollowingModel::Idm => self.idm(vel, v_max, leader),
            FollowingModel::ImprovedIdm => self.iidm(vel, v_max, leader),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn params() -> DriverParams {
        DriverParams {
            a_max: 1.0,
            a_min_comfort: 1.5,
            a_exp: 4.0,
            t_react: 1.0,
            delta_d_min: 2.0,
        }
    }

    #[test]
    fn free_road_acceleration_decreases_towards_limit() {
        for model in [FollowingModel::Idm, FollowingModel::ImprovedIdm] {
            let mut last = f64::INFINITY;
            for i in 0..139 {
                let vel = 0.1 * i as f64;
                let acc = params().acceleration(model, vel, 13.9, None);
                assert!(acc > 0.0);
                assert!(acc < last);
                last = acc;
            }
        }
    }

    #[test]
    fn braking_increases_as_gap_shrinks() {
        let p = params();
        for model in [FollowingModel::Idm, FollowingModel::ImprovedIdm] {
            let s_star = p.desired_gap(8.0, 2.0);
            let mut last = f64::INFINITY;
            for i in 0..40 {
                let gap = s_star * (4.0 - 0.075 * i as f64);
                let leader = VirtualLeader { gap, vel: 6.0 };
                let acc = p.acceleration(model, 8.0, 13.9, Some(leader));
                assert!(acc < last, "{:?} at gap {}", model, gap);
                last = acc;
            }
        }
    }

    #[test]
    fn improved_model_decelerates_gently_above_limit() {
        let p = params();
        let acc = p.iidm(20.0, 10.0, None);
        assert!(acc < 0.0);
        assert!(acc >= -p.a_min_comfort);
        // The plain model brakes far harder for the same situation.
        assert!(p.idm(20.0, 10.0, None) < acc);
    }

    #[test]
    fn standstill_at_minimum_gap_is_balanced() {
        let p = params();
        let leader = VirtualLeader { gap: p.delta_d_min, vel: 0.0 };
        assert_approx_eq!(p.iidm(0.0, 13.9, Some(leader)), 0.0);
    }

    #[test]
    fn desired_gap_ignores_negative_dynamic_term() {
        let p = params();
        assert_approx_eq!(p.desired_gap(0.0, -5.0), p.delta_d_min);
        assert_approx_eq!(p.desired_gap(5.0, -100.0), p.delta_d_min);
    }
}
