use clap::Parser;
use std::path::PathBuf;
use vortex_wake::compressibility::{self, FlowContext};
use vortex_wake::{Result, SimulationConfig, WakeSimulation};

#[derive(Parser, Debug)]
#[command(name = "vortex-wake", about = "Trailing-vortex wake relaxation and convection")]
struct Args {
    /// JSON configuration file; built-in horseshoe wake if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for results and checkpoints
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    #[arg(long)]
    steps: Option<usize>,

    #[arg(long)]
    mach: Option<f64>,

    /// Enable the Karman-Tsien correction
    #[arg(long)]
    karman_tsien: bool,

    #[arg(long)]
    time_accurate: bool,

    /// Checkpoint every N steps
    #[arg(long)]
    checkpoint: Option<usize>,

    /// Resume from a checkpoint file
    #[arg(long)]
    resume: Option<PathBuf>,

    #[arg(long)]
    no_progress: bool,
}

fn main() {
    env_logger::init();
    println!("Trailing Vortex Wake Simulation");

    if let Err(e) = run(Args::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut sim = match &args.resume {
        Some(path) => WakeSimulation::load_checkpoint(path)?,
        None => {
            let mut config = match &args.config {
                Some(path) => SimulationConfig::from_file(path)?,
                None => SimulationConfig::default(),
            };
            if let Some(mach) = args.mach {
                config.mach = mach;
            }
            if args.karman_tsien {
                config.karman_tsien = true;
            }
            if args.time_accurate {
                config.wake.time_accurate = true;
            }
            config.validate()?;

            compressibility::install(FlowContext::new(config.mach, config.karman_tsien)?)?;
            WakeSimulation::with_context(config, FlowContext::global())?
        }
    };

    if let Some(steps) = args.steps {
        sim.config.steps = steps;
    }
    if let Some(interval) = args.checkpoint {
        sim.config.checkpoint_interval = interval;
    }

    std::fs::create_dir_all(&args.output)?;
    let taken = sim.run(Some(&args.output), !args.no_progress)?;
    sim.save_results(&args.output)?;

    println!(
        "Simulation complete after {} steps (final residual {:.3e})",
        taken,
        sim.stats.residual.last().copied().unwrap_or(0.0)
    );
    Ok(())
}
