//! Priority queue simulator CLI
//!
//! ```bash
//! # One run with the default model and a fixed seed
//! priority-queue-sim --seed 42
//!
//! # Watch the queue fill up
//! priority-queue-sim --capacity 3 --processing-time 0.2 --tui
//!
//! # 50 independent replications
//! priority-queue-sim --replications 50 --seed 7
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use priority_queue_sim::{
    ArrivalConfig, BusyTimePolicy, SimConfig, Simulation, SystemEvent, display, run_batch,
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Single-server queue with bounded priority admission.
///
/// Runs in virtual time; results are reproducible when a seed is given.
#[derive(Parser, Debug)]
#[command(name = "priority-queue-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Rate of the fast inter-arrival phase
    #[arg(long, default_value = "60")]
    rate_fast: f64,

    /// Rate of the slow inter-arrival phase
    #[arg(long, default_value = "120")]
    rate_slow: f64,

    /// Probability of drawing a gap from the fast phase
    #[arg(long, default_value = "0.7")]
    fast_probability: f64,

    /// Service time per request, in seconds
    #[arg(short = 'p', long, default_value = "0.136")]
    processing_time: f64,

    /// Queue capacity (0 disables waiting)
    #[arg(short = 'k', long, default_value = "5")]
    capacity: usize,

    /// Simulated-time budget, in seconds
    #[arg(short = 't', long, default_value = "50")]
    max_time: f64,

    /// Budget on processed + rejected requests
    #[arg(short = 'n', long, default_value = "500")]
    max_requests: u64,

    #[arg(long, default_value = "1")]
    min_priority: u8,

    #[arg(long, default_value = "4")]
    max_priority: u8,

    /// How server busy time is accounted
    #[arg(long, value_enum, default_value_t = BusyTimePolicy::PerServiceEntry)]
    busy_time_policy: BusyTimePolicy,

    /// Random seed for reproducible results. When omitted, a random seed is used.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of independent replications to aggregate
    #[arg(short = 'r', long, default_value = "1")]
    replications: u32,

    /// Write the full report, occupancy series included, as JSON
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Show the run in a terminal UI
    #[arg(long)]
    tui: bool,

    /// Events replayed per UI frame
    #[arg(long, default_value = "4")]
    ui_events_per_frame: usize,
}

impl Args {
    fn config(&self) -> SimConfig {
        let mut config = SimConfig::default()
            .with_arrivals(ArrivalConfig {
                rate_fast: self.rate_fast,
                rate_slow: self.rate_slow,
                fast_probability: self.fast_probability,
            })
            .with_processing_time(self.processing_time)
            .with_queue_capacity(self.capacity)
            .with_max_sim_time(self.max_time)
            .with_max_requests(self.max_requests)
            .with_priorities(self.min_priority..=self.max_priority)
            .with_busy_time_policy(self.busy_time_policy);
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Log lines would tear the alternate screen.
    let default_filter = if args.tui {
        "error"
    } else {
        "warn,priority_queue_sim=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.config();
    config.validate().context("invalid simulation parameters")?;

    if args.replications > 1 {
        if args.tui || args.output.is_some() {
            anyhow::bail!("--tui and --output apply to single runs only");
        }
        let summary = run_batch(config, args.replications).await?;
        println!("{summary}");
        return Ok(());
    }

    let report = if args.tui {
        let capacity = config.queue_capacity;
        let (ui_tx, ui_rx) = mpsc::channel::<SystemEvent>(1024);

        let simulation = Simulation::from_config(config)?.with_sink(ui_tx);
        let sim_handle = tokio::task::spawn_blocking(move || {
            let mut simulation = simulation;
            simulation.run()
        });
        let ui_handle = tokio::task::spawn_blocking(move || {
            display::run_ui(ui_rx, capacity, args.ui_events_per_frame)
        });

        let (report, ui) = tokio::join!(sim_handle, ui_handle);
        ui?.context("terminal UI failed")?;
        report??
    } else {
        Simulation::from_config(config)?.run()?
    };

    println!("{report}");

    if let Some(path) = &args.output {
        report
            .write_json(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    Ok(())
}
