use crate::filament::Filament;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

// MARK: Modes
/// Which sub-vortices take part in a circulation update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvectMode {
    /// Only the sub-vortex at the trailing edge, coupled to the solver.
    ImplicitOnly,
    /// Only the downstream sub-vortices, advected from the saved state.
    ExplicitOnly,
    All,
}

impl ConvectMode {
    fn implicit(self) -> bool {
        matches!(self, ConvectMode::ImplicitOnly | ConvectMode::All)
    }

    fn explicit(self) -> bool {
        matches!(self, ConvectMode::ExplicitOnly | ConvectMode::All)
    }
}

/// Unsteady analysis type selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnalysisType {
    #[default]
    Impulse,
    Heave,
    RollRate,
    PitchRate,
    YawRate,
    /// Body flies a prescribed path through still air; the wake lives in
    /// the inertial frame.
    Path,
}

impl AnalysisType {
    pub fn superposes_free_stream(self) -> bool {
        !matches!(self, AnalysisType::Path)
    }
}

/// Fixed wing or rotor blade. For a rotor the filament is expressed in the
/// blade-fixed frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum WakeMotion {
    #[default]
    FixedWing,
    Rotor {
        rpm: f64,
        axis: [f64; 3],
        origin: [f64; 3],
    },
}

impl WakeMotion {
    /// Apparent velocity of a point fixed in the inertial frame, seen from
    /// the rotating blade frame: `-Ω × (x - origin)`.
    pub fn frame_velocity(&self, x: &Vector3<f64>) -> Vector3<f64> {
        match self {
            WakeMotion::FixedWing => Vector3::zeros(),
            WakeMotion::Rotor { rpm, axis, origin } => {
                let axis = Vector3::from(*axis);
                let Some(axis) = axis.try_normalize(1e-12) else {
                    return Vector3::zeros();
                };
                let omega = axis * (rpm * 2.0 * PI / 60.0);
                -omega.cross(&(x - Vector3::from(*origin)))
            }
        }
    }
}

// MARK: Convection
impl Filament {
    /// Caps the induced sample at `velocity_limit_ratio * vinf`. Returns the
    /// (possibly) clipped velocity and whether clipping happened.
    fn limit_velocity(&self, q: Vector3<f64>) -> (Vector3<f64>, bool) {
        let cap = self.velocity_limit_ratio * self.vinf;
        if self.vinf <= 0.0 || cap <= 0.0 {
            return (q, false);
        }
        let mag = q.norm();
        if mag > cap {
            (q * (cap / mag), true)
        } else {
            (q, false)
        }
    }

    /// One (¼, ½, ¼) pass over the interior scratch samples.
    fn smooth_velocity(&mut self) {
        let n = self.velocities.len();
        if n < 3 {
            return;
        }
        let old: Vec<Vector3<f64>> = self.velocities.iter().map(|v| v.scratch).collect();
        for i in 1..n - 1 {
            self.velocities[i].scratch = 0.25 * old[i - 1] + 0.5 * old[i] + 0.25 * old[i + 1];
        }
    }

    /// Pulls interior nodes toward the point the spacing law predicts from
    /// their neighbours. The pull on each node is scaled by how far it moved
    /// this update relative to its local spacing, so nodes at rest stay put.
    /// A straight filament at its own spacing is a fixed point.
    fn smooth(&mut self, previous: &[Vector3<f64>]) {
        let n = self.nodes.len();
        let w = self.smoothing_weight;
        if n < 3 || w <= 0.0 {
            return;
        }
        let old = self.nodes.clone();
        for i in 1..n - 1 {
            let spacing = 0.5 * (self.s[i + 1] - self.s[i - 1]) * self.length;
            let moved = (old[i] - previous[i]).norm();
            let weight = w * (moved / spacing).min(1.0);
            if weight <= 0.0 {
                continue;
            }
            let t = (self.s[i] - self.s[i - 1]) / (self.s[i + 1] - self.s[i - 1]);
            let predicted = old[i - 1] + (old[i + 1] - old[i - 1]) * t;
            self.nodes[i] = old[i] * (1.0 - weight) + predicted * weight;
        }
    }

    /// Velocity the wake leaves the trailing edge with: the local velocity
    /// there when the caller supplied one.
    fn departure_velocity(&self) -> Option<Vector3<f64>> {
        let local = self.local_velocity_at_trailing_edge;
        (local.norm() > self.tolerance).then_some(local)
    }

    fn free_stream_term(&self) -> Vector3<f64> {
        if self.time_analysis_type.superposes_free_stream() {
            self.free_stream_velocity
        } else {
            Vector3::zeros()
        }
    }

    /// Moves every node once using the stored velocity samples and returns
    /// the largest node displacement.
    ///
    /// The samples hold the induced and interference velocity loaded by the
    /// caller. Free stream and the rotating-frame term are added here. The
    /// trailing-edge node never moves.
    pub fn update_wake_location(&mut self) -> f64 {
        let n = self.nodes.len();

        let mut clipped = 0;
        for i in 0..n {
            let (q, hit) = self.limit_velocity(self.velocities[i].velocity);
            self.velocities[i].scratch = q;
            clipped += hit as usize;
        }
        if clipped > 0 {
            log::warn!(
                "Wing {} node {}: clipped {} velocity samples above {:.3} x Vinf",
                self.wing,
                self.node,
                clipped,
                self.velocity_limit_ratio
            );
        }
        self.smooth_velocity();

        let stream = self.free_stream_term();
        let frame: Vec<Vector3<f64>> = self.nodes.iter().map(|x| self.motion.frame_velocity(x)).collect();
        let q: Vec<Vector3<f64>> = (0..n)
            .map(|i| self.velocities[i].scratch + stream + frame[i])
            .collect();

        let old = self.nodes.clone();
        if self.time_accurate {
            self.advance_nodes(&q, &stream, &frame);
        } else {
            self.retrace_nodes(&q);
        }

        if self.max_convected_distance > 0.0 {
            for (x, x0) in self.nodes.iter_mut().zip(&old).skip(1) {
                let d = *x - x0;
                let mag = d.norm();
                if mag > self.max_convected_distance {
                    *x = x0 + d * (self.max_convected_distance / mag);
                }
            }
        }

        self.smooth(&old);
        self.rebuild_edges();

        self.nodes
            .iter()
            .zip(&old)
            .map(|(x, x0)| (x - x0).norm())
            .fold(0.0, f64::max)
    }

    /// Time-accurate step: `x += q dt`. Exact-shift nodes move rigidly with
    /// the trailing-edge departure velocity (free stream unless a local value
    /// was supplied) plus the frame velocity.
    fn advance_nodes(&mut self, q: &[Vector3<f64>], stream: &Vector3<f64>, frame: &[Vector3<f64>]) {
        let dt = self.time_step;
        let shift = self.departure_velocity().unwrap_or(*stream);
        for i in 1..self.nodes.len() {
            let v = if i <= self.number_of_exact_shift_points {
                shift + frame[i]
            } else {
                q[i]
            };
            self.nodes[i] += v * dt;
        }
    }

    /// Steady relaxation: re-trace the filament from the trailing edge along
    /// the local mean velocity, keeping the arc-length spacing. Segments with
    /// no mean velocity keep their current shape.
    fn retrace_nodes(&mut self, q: &[Vector3<f64>]) {
        let old = self.nodes.clone();
        let tol = self.tolerance;
        let departure = self
            .departure_velocity()
            .and_then(|v| v.try_normalize(tol))
            .unwrap_or(self.te_vec);
        for i in 0..old.len() - 1 {
            let ds = (self.s[i + 1] - self.s[i]) * self.length;
            let step = if i < self.number_of_exact_shift_points {
                departure * ds
            } else {
                match (0.5 * (q[i] + q[i + 1])).try_normalize(tol) {
                    Some(direction) => direction * ds,
                    None => old[i + 1] - old[i],
                }
            };
            self.nodes[i + 1] = self.nodes[i] + step;
        }
    }

    /// Updates circulation for the selected subset of sub-vortices.
    ///
    /// Steady runs give every touched sub-vortex the aggregate strength. Time
    /// accurate runs feed the trailing-edge sub-vortex from the aggregate and
    /// advect the rest downstream with a first-order upwind step from the
    /// saved state; the nodes are then convected whenever the explicit part
    /// is included.
    pub fn convect_wake_vorticity(&mut self, mode: ConvectMode) {
        let n = self.levels[0].len();
        self.gamma_new.copy_from_slice(&self.gamma);

        if mode.implicit() {
            self.gamma_new[1] = self.gamma[0];
        }

        if mode.explicit() {
            for i in 2..=n {
                self.gamma_new[i] = if self.time_accurate {
                    let ds = self.levels[0][i - 1].length();
                    let courant = if ds > self.tolerance {
                        (self.vinf * self.time_step / ds).clamp(0.0, 1.0)
                    } else {
                        1.0
                    };
                    self.gamma_save[i] + courant * (self.gamma_save[i - 1] - self.gamma_save[i])
                } else {
                    self.gamma[0]
                };
            }
        }

        self.gamma.copy_from_slice(&self.gamma_new);
        self.update_gamma();

        if mode.explicit() && self.time_accurate {
            let moved = self.update_wake_location();
            log::debug!("Wing {} node {}: convected, max displacement {:.4e}", self.wing, self.node, moved);
        }
    }

    // MARK: Controls
    pub fn time_accurate(&self) -> bool {
        self.time_accurate
    }

    pub fn set_time_accurate(&mut self, time_accurate: bool) {
        self.time_accurate = time_accurate;
    }

    pub fn time_analysis_type(&self) -> AnalysisType {
        self.time_analysis_type
    }

    pub fn set_time_analysis_type(&mut self, analysis: AnalysisType) {
        self.time_analysis_type = analysis;
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn set_time_step(&mut self, dt: f64) {
        self.time_step = dt;
    }

    pub fn vinf(&self) -> f64 {
        self.vinf
    }

    pub fn set_vinf(&mut self, vinf: f64) {
        self.vinf = vinf;
    }

    pub fn max_convected_distance(&self) -> f64 {
        self.max_convected_distance
    }

    pub fn set_max_convected_distance(&mut self, distance: f64) {
        self.max_convected_distance = distance;
    }

    pub fn number_of_exact_shift_points(&self) -> usize {
        self.number_of_exact_shift_points
    }

    pub fn set_number_of_exact_shift_points(&mut self, count: usize) {
        self.number_of_exact_shift_points = count;
    }

    pub fn motion(&self) -> &WakeMotion {
        &self.motion
    }

    pub fn set_motion(&mut self, motion: WakeMotion) {
        self.motion = motion;
    }

    pub fn rotor_analysis(&self) -> bool {
        matches!(self.motion, WakeMotion::Rotor { .. })
    }

    pub fn blade_rpm(&self) -> Option<f64> {
        match self.motion {
            WakeMotion::Rotor { rpm, .. } => Some(rpm),
            WakeMotion::FixedWing => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WakeConfig;
    use approx::assert_relative_eq;

    fn filament(config: &WakeConfig) -> Filament {
        Filament::setup(10, 20.0, &Vector3::zeros(), &Vector3::new(20.0, 0.0, 0.0), config).unwrap()
    }

    #[test]
    fn test_zero_velocity_time_accurate_step_is_still() {
        let mut config = WakeConfig::default();
        config.time_accurate = true;
        config.free_stream = [0.0, 0.0, 0.0];
        let mut f = filament(&config);
        let before = f.nodes().to_vec();

        f.save_vortex_state();
        f.convect_wake_vorticity(ConvectMode::All);

        for (a, b) in f.nodes().iter().zip(&before) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    /// Interior nodes pushed alternately sideways, first segment left on
    /// the axis.
    fn zigzag(config: &WakeConfig) -> Filament {
        let mut f = filament(config);
        for i in 2..f.number_of_nodes() {
            let offset = if i % 2 == 0 { 5.0 } else { -5.0 };
            f.nodes[i].y += offset;
        }
        f.rebuild_edges();
        f
    }

    #[test]
    fn test_bent_filament_at_rest_stays_put() {
        let mut config = WakeConfig::default();
        config.free_stream = [0.0, 0.0, 0.0];
        config.smoothing_weight = 0.5;

        for time_accurate in [true, false] {
            config.time_accurate = time_accurate;
            let mut f = zigzag(&config);
            f.set_uniform_gamma(1.0);
            let before = f.nodes().to_vec();

            for i in 0..f.number_of_nodes() {
                f.set_velocity(i, Vector3::zeros());
            }
            f.save_vortex_state();
            f.convect_wake_vorticity(ConvectMode::All);
            let moved = f.update_wake_location();

            assert!(moved < 1e-12, "time_accurate = {}: moved {}", time_accurate, moved);
            for (a, b) in f.nodes().iter().zip(&before) {
                assert_relative_eq!(a, b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_smoothing_damps_moving_zigzag() {
        let mut config = WakeConfig::default();
        config.time_accurate = true;
        config.free_stream = [0.0, 0.0, 1.0];
        config.time_step = 1.0;
        config.smoothing_weight = 0.5;
        let mut f = zigzag(&config);
        let amplitude = |f: &Filament| (2..f.number_of_nodes() - 1).map(|i| f.nodes()[i].y.abs()).fold(0.0, f64::max);
        let before = amplitude(&f);

        f.update_wake_location();
        assert!(amplitude(&f) < before);
    }

    #[test]
    fn test_local_trailing_edge_velocity_sets_departure() {
        let mut config = WakeConfig::default();
        config.number_of_exact_shift_points = 2;
        config.smoothing_weight = 0.0;
        let mut f = filament(&config);
        f.set_local_velocity_at_trailing_edge(Vector3::new(0.0, 0.0, 3.0));

        f.update_wake_location();
        for edge in &f.edges(1)[..2] {
            assert_relative_eq!(edge.direction().normalize(), Vector3::z(), epsilon = 1e-12);
        }
        // Downstream segments still follow the free stream
        assert_relative_eq!(f.edges(1)[5].direction().normalize(), Vector3::x(), epsilon = 1e-12);

        let mut config = WakeConfig::default();
        config.time_accurate = true;
        config.time_step = 0.5;
        config.smoothing_weight = 0.0;
        config.number_of_exact_shift_points = 2;
        let mut f = filament(&config);
        let before = f.nodes().to_vec();
        f.set_local_velocity_at_trailing_edge(Vector3::new(0.0, 2.0, 0.0));

        f.update_wake_location();
        for i in 1..=2 {
            assert_relative_eq!(f.nodes()[i] - before[i], Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        }
        assert_relative_eq!(f.nodes()[3] - before[3], Vector3::new(0.5, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_stream_translates_downstream_nodes() {
        let mut config = WakeConfig::default();
        config.time_accurate = true;
        config.free_stream = [0.0, 0.0, 2.0];
        config.time_step = 0.5;
        config.smoothing_weight = 0.0;
        let mut f = filament(&config);
        let before = f.nodes().to_vec();

        let moved = f.update_wake_location();

        assert_relative_eq!(moved, 1.0, epsilon = 1e-12);
        assert_eq!(f.te_node(), before[0]);
        for (a, b) in f.nodes().iter().zip(&before).skip(1) {
            assert_relative_eq!(a - b, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_max_convected_distance_truncates_step() {
        let mut config = WakeConfig::default();
        config.time_accurate = true;
        config.free_stream = [0.0, 0.0, 10.0];
        config.time_step = 1.0;
        config.max_convected_distance = 0.5;
        let mut f = filament(&config);

        let moved = f.update_wake_location();
        assert_relative_eq!(moved, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_limit_velocity_caps_samples() {
        let mut config = WakeConfig::default();
        config.velocity_limit_ratio = 2.0;
        let f = filament(&config);

        let (q, hit) = f.limit_velocity(Vector3::new(0.0, 30.0, 40.0));
        assert!(hit);
        assert_relative_eq!(q.norm(), 2.0, epsilon = 1e-12);

        let (q, hit) = f.limit_velocity(Vector3::new(0.0, 1.0, 0.0));
        assert!(!hit);
        assert_eq!(q, Vector3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_smooth_velocity_damps_spike() {
        let config = WakeConfig::default();
        let mut f = filament(&config);
        f.velocities[5].scratch = Vector3::new(0.0, 4.0, 0.0);
        f.smooth_velocity();
        assert_relative_eq!(f.scratch_velocity(5).y, 2.0);
        assert_relative_eq!(f.scratch_velocity(4).y, 1.0);
        assert_relative_eq!(f.scratch_velocity(6).y, 1.0);
    }

    #[test]
    fn test_steady_relaxation_aligns_with_free_stream() {
        let mut config = WakeConfig::default();
        config.free_stream = [1.0, 0.0, 1.0];
        config.number_of_exact_shift_points = 0;
        let mut f = filament(&config);

        let moved = f.update_wake_location();
        assert!(moved > 0.0);

        let dir = Vector3::new(1.0, 0.0, 1.0).normalize();
        for edge in f.edges(1) {
            assert_relative_eq!(edge.direction().normalize(), dir, epsilon = 1e-9);
        }
        // Arc length is preserved
        assert_relative_eq!(f.wake_length(), 20.0, epsilon = 1e-9);

        // Converged: a second sweep does nothing
        assert!(f.update_wake_location() < 1e-9);
    }

    #[test]
    fn test_steady_gamma_takes_aggregate() {
        let mut f = filament(&WakeConfig::default());
        f.set_gamma(0, 3.0);
        f.convect_wake_vorticity(ConvectMode::ImplicitOnly);
        assert_eq!(f.gamma(1), 3.0);
        assert_eq!(f.gamma(2), 0.0);

        f.convect_wake_vorticity(ConvectMode::ExplicitOnly);
        assert!(f.gammas().iter().all(|g| *g == 3.0));
        assert_relative_eq!(f.edges(f.number_of_levels())[0].gamma, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_time_accurate_gamma_advects_downstream() {
        let mut config = WakeConfig::default();
        config.time_accurate = true;
        config.stretching_ratio = 1.0;
        config.free_stream = [0.0, 0.0, 0.0];
        config.vinf = Some(2.5);
        config.time_step = 1.0;
        // Edges are 2 long, so the Courant number clamps to 1
        let mut f = filament(&config);

        f.set_gamma(0, 1.0);
        f.save_vortex_state();
        f.convect_wake_vorticity(ConvectMode::All);
        assert_eq!(f.gamma(1), 1.0);
        assert_eq!(f.gamma(2), 0.0);

        f.save_vortex_state();
        f.convect_wake_vorticity(ConvectMode::All);
        assert_eq!(f.gamma(2), 1.0);
        assert_eq!(f.gamma(3), 0.0);
        assert_eq!(f.gamma_new(), f.gammas());
    }

    #[test]
    fn test_rotor_frame_velocity() {
        let motion = WakeMotion::Rotor {
            rpm: 60.0,
            axis: [0.0, 0.0, 1.0],
            origin: [0.0, 0.0, 0.0],
        };
        let v = motion.frame_velocity(&Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(v, Vector3::new(0.0, -2.0 * PI, 0.0), epsilon = 1e-12);
        assert_eq!(WakeMotion::FixedWing.frame_velocity(&Vector3::x()), Vector3::zeros());
    }

    #[test]
    fn test_path_analysis_ignores_free_stream() {
        let mut config = WakeConfig::default();
        config.time_accurate = true;
        config.analysis_type = AnalysisType::Path;
        config.free_stream = [5.0, 0.0, 0.0];
        let mut f = filament(&config);
        assert!(f.update_wake_location() < 1e-12);
    }
}
