//! turbsim — drive a bank of simulated turbidostats through the cycle service.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimRig             LogEventSink   FsHistoryStore   Manifest   │
//! │  (Sensor+Actuator)  (EventSink)    (HistoryStore)   (CSV)      │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            CycleService (pure logic)                   │    │
//! │  │  ControllerBank · ParamEstimator                       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every vessel grows at a known rate, so the printed summary shows how well
//! each controller recovered it.  History is checkpointed on exit even when
//! the run fails part way, and `--load` resumes from it.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use turbctl::adapters::fs_store::FsHistoryStore;
use turbctl::adapters::log_sink::LogEventSink;
use turbctl::app::commands::AppCommand;
use turbctl::app::ports::EventSink;
use turbctl::app::service::CycleService;
use turbctl::bank::{ControllerBank, StepTiming};
use turbctl::config::{SystemConfig, VesselConfig};
use turbctl::manifest::{self, Manifest, WELLS_PER_PLATE};
use turbctl::sim::{NoiseModel, SetpointSchedule, SimRig, SimVessel, staggered_growth};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Simulated turbidostat run",
    long_about = "Runs parameter-estimating controllers against simulated vessels with\n\
        known growth rates, measurement noise and pipetting noise."
)]
struct Args {
    /// Number of simulated vessels
    #[arg(long, default_value_t = 24)]
    channels: usize,

    /// Number of cycles to run
    #[arg(long, default_value_t = 200)]
    cycles: u64,

    /// JSON run configuration (simulation defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Manifest CSV of per-well target ODs; wells missing from it are not started
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// History directory (overrides the configuration)
    #[arg(long)]
    history_dir: Option<PathBuf>,

    /// Resume every channel from saved history
    #[arg(long)]
    load: bool,

    /// Random seed for reproducibility
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Disable measurement and pipetting noise
    #[arg(long)]
    noiseless: bool,

    /// Hold this target OD instead of the square-wave schedule
    #[arg(long)]
    fixed_setpoint: Option<f64>,

    /// Also checkpoint every N cycles
    #[arg(long)]
    checkpoint_every: Option<u64>,
}

/// Defaults for a simulated run: 15-minute cycles and dilution bounded to
/// 5-68 % of the vessel.
fn sim_config() -> SystemConfig {
    let mut config = SystemConfig {
        history_dir: "sim_controller_history".into(),
        vessel: VesselConfig {
            volume_ul: 150.0,
            min_transfer_ul: 7.5,
            max_transfer_ul: 102.0,
        },
        ..SystemConfig::default()
    };
    config.controller.setpoint = Some(0.45);
    config.controller.initial_k = 0.45;
    config
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SystemConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => sim_config(),
    };
    if let Some(dir) = &args.history_dir {
        config.history_dir = dir.display().to_string();
    }
    config.validate().context("invalid configuration")?;

    info!("turbsim v{}", env!("CARGO_PKG_VERSION"));

    // ── Channels ──────────────────────────────────────────────
    let keys: Vec<String> = manifest::channel_keys(args.channels.div_ceil(WELLS_PER_PLATE), WELLS_PER_PLATE)
        .into_iter()
        .take(args.channels)
        .collect();
    let template = config.channel_config();
    let channels = match &args.manifest {
        Some(path) => Manifest::read_with(path, &config)
            .with_context(|| format!("reading manifest {}", path.display()))?
            .channel_configs(&keys, &template),
        None => keys.iter().map(|k| (k.clone(), Ok(template.clone()))).collect(),
    };

    let mut sink = LogEventSink::new();
    let mut service = CycleService::start(ControllerBank::build(channels), &config, &mut sink)
        .with_timing(StepTiming::Elapsed(config.cycle_secs));
    if service.bank().is_empty() {
        bail!("no channel could be started");
    }

    let store = FsHistoryStore::from_config(&config);
    if args.load {
        service.restore(&store, &mut sink);
    }

    // ── Rig ───────────────────────────────────────────────────
    let noise = if args.noiseless {
        NoiseModel::none()
    } else {
        NoiseModel::default()
    };
    let growth = staggered_growth(service.bank().len());
    let mut rig = if args.load {
        // Pick up each vessel where its controller left off.
        let vessels = service
            .bank()
            .iter()
            .zip(&growth)
            .map(|(c, &k)| SimVessel::new(c.last_known_od() / (1.0 + c.last_known_output()), k))
            .collect();
        SimRig::new(vessels, config.cycle_secs, noise, args.seed)
    } else {
        SimRig::random_start(&growth, (0.0002, 0.5), config.cycle_secs, noise, args.seed)
    };

    // ── Run ───────────────────────────────────────────────────
    let outcome = run(&args, &mut service, &mut rig, &store, &mut sink);
    let saved = service
        .checkpoint(&store, &mut sink)
        .with_context(|| format!("checkpointing to {}", store.root().display()));
    outcome?;
    saved?;

    print_summary(&service, &rig, &growth);
    Ok(())
}

fn run(
    args: &Args,
    service: &mut CycleService,
    rig: &mut SimRig,
    store: &FsHistoryStore,
    sink: &mut impl EventSink,
) -> Result<()> {
    let mut schedule = args
        .fixed_setpoint
        .is_none()
        .then(|| SetpointSchedule::new(args.seed.wrapping_add(1)));
    if let Some(setpoint) = args.fixed_setpoint {
        apply_to_all(service, setpoint, store, sink)?;
    }

    for cycle in 0..args.cycles {
        if let Some(setpoint) = schedule.as_mut().and_then(|s| s.at(cycle)) {
            apply_to_all(service, setpoint, store, sink)?;
        }
        service.tick(rig, sink)?;
        if let Some(every) = args.checkpoint_every.filter(|&n| n > 0) {
            if (cycle + 1) % every == 0 {
                service.checkpoint(store, sink)?;
            }
        }
    }
    Ok(())
}

fn apply_to_all(
    service: &mut CycleService,
    setpoint: f64,
    store: &FsHistoryStore,
    sink: &mut impl EventSink,
) -> Result<()> {
    let targets = service
        .bank()
        .names()
        .into_iter()
        .map(|name| (name.to_owned(), setpoint))
        .collect();
    service
        .handle_command(AppCommand::ApplySetpoints(targets), store, sink)
        .context("applying setpoint")
}

fn print_summary(service: &CycleService, rig: &SimRig, growth: &[f64]) {
    println!(
        "{:<12} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "channel", "k true", "k est", "od true", "od est", "target"
    );
    for ((c, vessel), k_true) in service.bank().iter().zip(rig.vessels()).zip(growth) {
        println!(
            "{:<12} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3}",
            c.name(),
            k_true,
            c.k_estimate(),
            vessel.od,
            c.od(),
            c.setpoint()
        );
    }
    println!("{} cycles completed", service.cycle_count());
}
