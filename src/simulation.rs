// External crates
use crate::compressibility::FlowContext;
use crate::config::{BodyMotionConfig, SimulationConfig};
use crate::convection::ConvectMode;
use crate::error::Result;
use crate::filament::Filament;
use crate::quat::Quat;
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

// MARK: Data Structures
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SimulationStats {
    pub time_points: Vec<f64>,
    /// Largest node displacement of each step.
    pub residual: Vec<f64>,
    /// Summed polyline length of all filaments.
    pub wake_length: Vec<f64>,
}

/// Per-step driver for a set of trailing-vortex filaments.
#[derive(Debug, Serialize, Deserialize)]
pub struct WakeSimulation {
    pub config: SimulationConfig,
    pub context: FlowContext,
    pub filaments: Vec<Filament>,
    pub time: f64,
    pub step: usize,
    pub stats: SimulationStats,
}

// MARK: Implementation
impl WakeSimulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let context = FlowContext::new(config.mach, config.karman_tsien)?;
        Self::with_context(config, context)
    }

    pub fn with_context(config: SimulationConfig, context: FlowContext) -> Result<Self> {
        config.validate()?;

        let mut filaments = Vec::with_capacity(config.trailing_edges.len());
        for te in &config.trailing_edges {
            let mut filament = Filament::setup(
                config.subdivisions,
                config.far_dist,
                &Vector3::from(te.node1),
                &Vector3::from(te.node2),
                &config.wake,
            )?;
            filament.wing = te.wing;
            filament.node = te.node;

            // Impulsive start: only the trailing-edge strength exists yet
            if config.wake.time_accurate {
                filament.set_gamma(0, te.gamma);
                filament.update_gamma();
            } else {
                filament.set_uniform_gamma(te.gamma);
            }
            filament.save_vortex_state();
            filaments.push(filament);
        }

        log::info!(
            "Wake simulation: {} filaments x {} sub-vortices, {}",
            filaments.len(),
            config.subdivisions,
            if config.wake.time_accurate { "time accurate" } else { "steady relaxation" }
        );

        Ok(WakeSimulation {
            config,
            context,
            filaments,
            time: 0.0,
            step: 0,
            stats: SimulationStats::default(),
        })
    }

    /// Loads every filament's velocity samples with its self-induced
    /// velocity at its own nodes.
    pub fn sample_velocities(&mut self) {
        let ctx = self.context;
        self.filaments.par_iter_mut().for_each(|filament| {
            let samples: Vec<Vector3<f64>> = filament
                .nodes()
                .iter()
                .map(|x| filament.induced_velocity(x, &ctx))
                .collect();
            for (i, q) in samples.into_iter().enumerate() {
                filament.set_velocity(i, q);
            }
        });
    }

    fn apply_body_motion(&mut self, motion: &BodyMotionConfig) -> Result<()> {
        let dt = self.config.wake.time_step;
        let velocity = Vector3::from(motion.velocity);
        let origin = Vector3::from(motion.origin) + velocity * self.time;
        let translation = velocity * dt;

        let quat = Quat::form_rotation_quat(&Vector3::from(motion.axis), motion.rate * dt);
        let inv_quat = quat.inverse()?;

        for filament in &mut self.filaments {
            filament.update_geometry_location(&translation, &origin, &quat, &inv_quat);
        }
        Ok(())
    }

    /// One driver step. Returns the largest node displacement.
    pub fn step(&mut self) -> Result<f64> {
        self.sample_velocities();

        if let Some(motion) = self.config.body_motion.clone() {
            self.apply_body_motion(&motion)?;
        }

        let residual = if self.config.wake.time_accurate {
            self.filaments
                .par_iter_mut()
                .map(|filament| {
                    let before = filament.nodes().to_vec();
                    filament.save_vortex_state();
                    filament.convect_wake_vorticity(ConvectMode::All);
                    max_displacement(&before, filament.nodes())
                })
                .reduce(|| 0.0, f64::max)
        } else {
            self.filaments
                .par_iter_mut()
                .map(|filament| {
                    filament.convect_wake_vorticity(ConvectMode::All);
                    filament.update_wake_location()
                })
                .reduce(|| 0.0, f64::max)
        };

        if self.config.wake.time_accurate {
            self.time += self.config.wake.time_step;
        }
        self.step += 1;
        self.update_statistics(residual);

        Ok(residual)
    }

    /// Runs up to `config.steps` steps, stopping early once a steady
    /// relaxation converges. Returns the number of steps taken.
    pub fn run(&mut self, output_dir: Option<&Path>, show_progress: bool) -> Result<usize> {
        let steps = self.config.steps;
        println!("Running wake simulation for {} steps...", steps);

        let progress_bar = if show_progress {
            ProgressBar::new(steps as u64)
        } else {
            ProgressBar::hidden()
        };
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut taken = 0;
        for step in 0..steps {
            progress_bar.set_position(step as u64);

            let residual = self.step()?;
            taken += 1;

            if step % 10 == 0 {
                progress_bar.set_message(format!("Residual: {:.4e}", residual));
            }

            let interval = self.config.checkpoint_interval;
            if let Some(dir) = output_dir {
                if interval > 0 && self.step % interval == 0 {
                    let checkpoint = dir.join(format!("checkpoint_{}.json", self.step));
                    if let Err(e) = self.save_checkpoint(&checkpoint) {
                        log::error!("Error saving checkpoint: {}", e);
                    }
                }
            }

            if !self.config.wake.time_accurate && residual < self.config.convergence_tolerance {
                log::info!("Wake converged after {} steps (residual {:.3e})", taken, residual);
                break;
            }
        }

        progress_bar.finish_with_message("Simulation complete!");
        Ok(taken)
    }

    /// Induced velocity of every filament at each field point.
    pub fn induced_velocity_at(&self, points: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        induced_velocities(&self.filaments, points, &self.context)
    }

    fn update_statistics(&mut self, residual: f64) {
        let wake_length: f64 = self.filaments.iter().map(Filament::wake_length).sum();
        self.stats.time_points.push(self.time);
        self.stats.residual.push(residual);
        self.stats.wake_length.push(wake_length);
    }

    // MARK: Output
    pub fn save_checkpoint<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        log::info!("Saving checkpoint to {}...", filename.as_ref().display());
        let file = File::create(filename)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load_checkpoint<P: AsRef<Path>>(filename: P) -> Result<Self> {
        log::info!("Loading checkpoint from {}...", filename.as_ref().display());
        let file = File::open(filename)?;
        let sim: WakeSimulation = serde_json::from_reader(file)?;
        Ok(sim)
    }

    /// Writes `wake.adb` (all filaments back to back) and `stats.json`.
    pub fn save_results(&self, output_dir: &Path) -> Result<()> {
        println!("Saving results to {}...", output_dir.display());

        let mut adb = BufWriter::new(File::create(output_dir.join("wake.adb"))?);
        for filament in &self.filaments {
            filament.write_adb(&mut adb)?;
        }

        let stats = File::create(output_dir.join("stats.json"))?;
        serde_json::to_writer_pretty(stats, &self.stats)?;
        Ok(())
    }
}

/// Total induced velocity of `filaments` at each point, evaluated in
/// parallel across points.
pub fn induced_velocities(
    filaments: &[Filament],
    points: &[Vector3<f64>],
    ctx: &FlowContext,
) -> Vec<Vector3<f64>> {
    points
        .par_iter()
        .map(|p| {
            filaments
                .iter()
                .fold(Vector3::zeros(), |acc, f| acc + f.induced_velocity(p, ctx))
        })
        .collect()
}

fn max_displacement(before: &[Vector3<f64>], after: &[Vector3<f64>]) -> f64 {
    before
        .iter()
        .zip(after)
        .map(|(a, b)| (b - a).norm())
        .fold(0.0, f64::max)
}
