//! Trailing-vortex wake filaments for lifting-surface solvers.
//!
//! A [`Filament`] is shed from a trailing-edge node and discretized into
//! straight sub-vortices on several levels of resolution. It reports the
//! velocity it induces anywhere in space, convects with the local flow or
//! relaxes to a steady shape, and follows prescribed rigid body motion.

pub mod adb;
pub mod compressibility;
pub mod config;
pub mod convection;
pub mod error;
pub mod filament;
pub mod motion;
pub mod physics;
pub mod quat;
pub mod simulation;

pub use compressibility::FlowContext;
pub use config::{SimulationConfig, WakeConfig};
pub use convection::{AnalysisType, ConvectMode, WakeMotion};
pub use error::{Result, WakeError};
pub use filament::{Filament, VortexEdge};
pub use quat::Quat;
pub use simulation::WakeSimulation;
