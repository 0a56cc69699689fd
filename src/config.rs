use crate::convection::{AnalysisType, WakeMotion};
use crate::error::{Result, WakeError};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

// MARK: Wake numerics
/// Per-filament discretization, kernel and time-stepping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Geometric growth of edge length from the trailing edge downstream.
    pub stretching_ratio: f64,
    /// Smallest first edge, as a fraction of the filament length. The
    /// stretching ratio is reduced until the first edge reaches it.
    pub min_first_edge_fraction: f64,
    /// Explicit core radius; overrides `core_size_fraction`.
    pub core_size: Option<f64>,
    /// Core radius as a fraction of the first (trailing-edge) edge.
    pub core_size_fraction: f64,
    /// Cutoff distance for agglomerated queries; defaults to twice the length.
    pub sigma: Option<f64>,
    pub tolerance: f64,
    /// Distance / edge-length ratio above which a coarse edge is used as is.
    pub agglomeration_ratio: f64,
    /// Induced-velocity cap as a multiple of `vinf`.
    pub velocity_limit_ratio: f64,
    pub smoothing_weight: f64,
    pub number_of_exact_shift_points: usize,
    /// Per-step displacement cap; 0 disables it.
    pub max_convected_distance: f64,
    pub time_step: f64,
    pub free_stream: [f64; 3],
    /// Reference speed; defaults to the free-stream magnitude.
    pub vinf: Option<f64>,
    pub time_accurate: bool,
    pub analysis_type: AnalysisType,
    pub motion: WakeMotion,
    pub ground_effect: bool,
}

impl Default for WakeConfig {
    fn default() -> Self {
        WakeConfig {
            stretching_ratio: 1.1,
            min_first_edge_fraction: 1e-3,
            core_size: None,
            core_size_fraction: 0.05,
            sigma: None,
            tolerance: 1e-9,
            agglomeration_ratio: 2.0,
            velocity_limit_ratio: 2.0,
            smoothing_weight: 0.25,
            number_of_exact_shift_points: 1,
            max_convected_distance: 0.0,
            time_step: 0.01,
            free_stream: [1.0, 0.0, 0.0],
            vinf: None,
            time_accurate: false,
            analysis_type: AnalysisType::Impulse,
            motion: WakeMotion::FixedWing,
            ground_effect: false,
        }
    }
}

impl WakeConfig {
    pub fn free_stream_velocity(&self) -> Vector3<f64> {
        Vector3::from(self.free_stream)
    }

    pub fn reference_speed(&self) -> f64 {
        self.vinf.unwrap_or_else(|| self.free_stream_velocity().norm())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.stretching_ratio >= 1.0) {
            return Err(WakeError::InvalidParameter(format!(
                "stretching_ratio must be at least 1, got {}",
                self.stretching_ratio
            )));
        }
        if !(self.min_first_edge_fraction > 0.0 && self.min_first_edge_fraction <= 1.0) {
            return Err(WakeError::InvalidParameter(format!(
                "min_first_edge_fraction must lie in (0, 1], got {}",
                self.min_first_edge_fraction
            )));
        }
        if let Some(core) = self.core_size {
            if !(core > 0.0) {
                return Err(WakeError::InvalidCoreSize(core));
            }
        }
        if !(self.core_size_fraction > 0.0) {
            return Err(WakeError::InvalidCoreSize(self.core_size_fraction));
        }
        if !(self.tolerance > 0.0) {
            return Err(WakeError::InvalidParameter(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.time_step > 0.0) {
            return Err(WakeError::InvalidParameter(format!(
                "time_step must be positive, got {}",
                self.time_step
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing_weight) {
            return Err(WakeError::InvalidParameter(format!(
                "smoothing_weight must lie in [0, 1], got {}",
                self.smoothing_weight
            )));
        }
        if self.max_convected_distance < 0.0 {
            return Err(WakeError::InvalidParameter(
                "max_convected_distance must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

// MARK: Driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingEdgeConfig {
    pub node1: [f64; 3],
    pub node2: [f64; 3],
    pub gamma: f64,
    #[serde(default)]
    pub wing: usize,
    #[serde(default)]
    pub node: usize,
}

/// Prescribed rigid motion applied to every filament each step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyMotionConfig {
    #[serde(default)]
    pub velocity: [f64; 3],
    #[serde(default)]
    pub origin: [f64; 3],
    pub axis: [f64; 3],
    /// rad/s
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub wake: WakeConfig,
    pub trailing_edges: Vec<TrailingEdgeConfig>,
    pub subdivisions: usize,
    pub far_dist: f64,
    pub mach: f64,
    pub karman_tsien: bool,
    pub steps: usize,
    /// 0 disables checkpoints.
    pub checkpoint_interval: usize,
    pub convergence_tolerance: f64,
    pub body_motion: Option<BodyMotionConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        // Horseshoe wake of a 10-unit span wing
        SimulationConfig {
            wake: WakeConfig::default(),
            trailing_edges: vec![
                TrailingEdgeConfig {
                    node1: [1.0, -5.0, 0.0],
                    node2: [2.0, -5.0, 0.0],
                    gamma: -1.0,
                    wing: 0,
                    node: 0,
                },
                TrailingEdgeConfig {
                    node1: [1.0, 5.0, 0.0],
                    node2: [2.0, 5.0, 0.0],
                    gamma: 1.0,
                    wing: 0,
                    node: 1,
                },
            ],
            subdivisions: 32,
            far_dist: 50.0,
            mach: 0.0,
            karman_tsien: false,
            steps: 200,
            checkpoint_interval: 0,
            convergence_tolerance: 1e-6,
            body_motion: None,
        }
    }
}

impl SimulationConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: SimulationConfig = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.wake.validate()?;
        if self.subdivisions < 1 {
            return Err(WakeError::InvalidSubdivision(self.subdivisions));
        }
        if !(self.far_dist > 0.0) {
            return Err(WakeError::InvalidParameter(format!(
                "far_dist must be positive, got {}",
                self.far_dist
            )));
        }
        if !(0.0..1.0).contains(&self.mach) {
            return Err(WakeError::InvalidMach(self.mach));
        }
        if self.trailing_edges.is_empty() {
            return Err(WakeError::InvalidParameter(
                "at least one trailing edge is required".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(WakeConfig::default().validate().is_ok());
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "subdivisions": 8,
            "wake": { "time_accurate": true, "analysis_type": "Heave" },
            "trailing_edges": [
                { "node1": [0.0, 0.0, 0.0], "node2": [1.0, 0.0, 0.0], "gamma": 2.0 }
            ]
        }"#;
        let config: SimulationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.subdivisions, 8);
        assert!(config.wake.time_accurate);
        assert_eq!(config.wake.analysis_type, AnalysisType::Heave);
        assert_eq!(config.wake.stretching_ratio, 1.1);
        assert_eq!(config.trailing_edges[0].wing, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rotor_motion_from_json() {
        let json = r#"{ "motion": { "Rotor": { "rpm": 600.0, "axis": [0.0, 0.0, 1.0], "origin": [0.0, 0.0, 0.0] } } }"#;
        let config: WakeConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(config.motion, WakeMotion::Rotor { rpm, .. } if rpm == 600.0));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = SimulationConfig::default();
        config.mach = 1.2;
        assert!(matches!(config.validate(), Err(WakeError::InvalidMach(_))));

        let mut config = SimulationConfig::default();
        config.subdivisions = 0;
        assert!(matches!(config.validate(), Err(WakeError::InvalidSubdivision(0))));

        let mut wake = WakeConfig::default();
        wake.core_size = Some(0.0);
        assert!(matches!(wake.validate(), Err(WakeError::InvalidCoreSize(_))));

        // Spacing must grow downstream
        let mut wake = WakeConfig::default();
        wake.stretching_ratio = 0.9;
        assert!(matches!(wake.validate(), Err(WakeError::InvalidParameter(_))));
        wake.stretching_ratio = 1.0;
        assert!(wake.validate().is_ok());

        let mut wake = WakeConfig::default();
        wake.min_first_edge_fraction = 0.0;
        assert!(matches!(wake.validate(), Err(WakeError::InvalidParameter(_))));
    }
}
