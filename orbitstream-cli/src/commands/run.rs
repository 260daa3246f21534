//! Run command - drive the refresh pipeline from a fixed-frame loop.
//!
//! Stands in for a real-time simulation: every frame calls
//! `RefreshCoordinator::refresh`, logs whatever was applied, then sleeps out
//! the rest of the frame. Positions come from the synthetic orbit source.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Args;
use orbitstream::config::PipelineConfig;
use orbitstream::coordinator::AdvanceOutcome;
use orbitstream::entity::{EntityId, PositionQueue};
use orbitstream::fetch::{FetchOutcome, HoldAfterFailures, PositionFetcher, SyntheticOrbitFetcher};
use orbitstream::service::RefreshService;
use orbitstream::telemetry::TelemetrySnapshot;
use tracing::{debug, info};

use super::common::load_config;
use crate::error::CliError;
use crate::logging::{self, LogLevel};

/// How often a one-line status is printed while running.
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Config file (defaults to the per-user location)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds between coordinator ticks (overrides config)
    #[arg(long)]
    pub cadence: Option<f64>,

    /// Catalog number to track; repeat for several (overrides config)
    #[arg(long = "entity", value_name = "ID")]
    pub entities: Vec<EntityId>,

    /// Simulation frame length in milliseconds
    #[arg(long, default_value_t = 16)]
    pub frame_ms: u64,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    pub duration_secs: Option<f64>,

    /// Make every Nth fetch fail, to exercise reject handling
    #[arg(long, value_name = "N")]
    pub fail_every: Option<u32>,

    /// Log verbosity (overrides RUST_LOG)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Run the run command.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let _log_guard = logging::init(args.log_level, args.log_file.as_deref())?;
    let config = apply_overrides(load_config(args.config.as_deref())?, &args)?;
    let source = SyntheticOrbitFetcher::new(config.synthetic.clone());

    match args.fail_every {
        Some(every) if every > 0 => drive(
            &config,
            HoldAfterFailures::new(FaultInjector::new(source, every)),
            &args,
        ),
        _ => drive(&config, source, &args),
    }
}

/// CLI takes precedence, then config.
fn apply_overrides(mut config: PipelineConfig, args: &RunArgs) -> Result<PipelineConfig, CliError> {
    if let Some(cadence) = args.cadence {
        if !cadence.is_finite() || cadence <= 0.0 {
            return Err(CliError::Config(format!(
                "--cadence must be a positive number of seconds, got {}",
                cadence
            )));
        }
        config = config.with_refresh_cadence(cadence);
    }
    if !args.entities.is_empty() {
        config = config.with_entities(args.entities.iter().copied());
    }
    if let Some(duration) = args.duration_secs {
        duration_from_secs(duration)?;
    }
    Ok(config)
}

fn duration_from_secs(secs: f64) -> Result<Duration, CliError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        CliError::Config(format!(
            "--duration-secs must be a finite, non-negative number of seconds, got {}",
            secs
        ))
    })
}

/// `None` runs until Ctrl+C.
fn run_deadline(started: Instant, secs: Option<f64>) -> Result<Option<Instant>, CliError> {
    let Some(secs) = secs else {
        return Ok(None);
    };
    started
        .checked_add(duration_from_secs(secs)?)
        .map(Some)
        .ok_or_else(|| {
            CliError::Config(format!("--duration-secs {} is too far in the future", secs))
        })
}

fn drive<F: PositionFetcher>(
    config: &PipelineConfig,
    fetcher: F,
    args: &RunArgs,
) -> Result<(), CliError> {
    let ids = config
        .entities
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    println!("Orbitstream v{}", orbitstream::VERSION);
    println!("==================");
    println!();
    println!("Entities: {}", ids);
    println!("Cadence:  {} s", config.refresh_cadence_secs);
    println!("Frame:    {} ms", args.frame_ms);
    if let Some(every) = args.fail_every.filter(|n| *n > 0) {
        println!("Faults:   every {} fetches rejected", every);
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    let deadline = run_deadline(Instant::now(), args.duration_secs)?;
    let mut service = RefreshService::start(config, fetcher)?;

    let frame = Duration::from_millis(args.frame_ms.max(1));
    let mut last_status = Instant::now();

    while !shutdown.load(Ordering::SeqCst) && deadline.map_or(true, |d| Instant::now() < d) {
        let frame_start = Instant::now();

        if let Some(report) = service.coordinator_mut().refresh() {
            for (id, outcome) in &report.entries {
                log_outcome(*id, outcome);
            }
        }

        if last_status.elapsed() >= STATUS_INTERVAL {
            print_status(&service.metrics().snapshot());
            last_status = Instant::now();
        }

        thread::sleep(frame.saturating_sub(frame_start.elapsed()));
    }

    println!();
    println!("Stopping...");
    let summary = service.shutdown()?;
    print_summary(&summary);
    Ok(())
}

fn log_outcome(id: EntityId, outcome: &AdvanceOutcome) {
    match outcome {
        AdvanceOutcome::Advanced(p) => {
            info!(entity = %id, x = p.x, y = p.y, z = p.z, "Applied position");
        }
        AdvanceOutcome::RefillRequested => debug!(entity = %id, "Queue empty, awaiting refill"),
        AdvanceOutcome::Held => debug!(entity = %id, "Entity on hold"),
        AdvanceOutcome::Contended => {}
    }
}

fn print_status(snapshot: &TelemetrySnapshot) {
    println!(
        "[{}] Applied: {} | Fetches: {} ok, {} failed | Held: {}",
        snapshot.uptime_human(),
        snapshot.samples_applied,
        snapshot.fetches_ok,
        snapshot.fetches_rejected + snapshot.fetches_retried,
        snapshot.fetches_held + snapshot.holds
    );
}

fn print_summary(snapshot: &TelemetrySnapshot) {
    println!();
    println!("Session Summary");
    println!("───────────────");
    println!(
        "  Positions applied: {} ({} ticks)",
        snapshot.samples_applied, snapshot.cadence_ticks
    );
    println!(
        "  Fetches:           {} ({:.0}% ok, {} panicked)",
        snapshot.total_fetches(),
        snapshot.fetch_success_rate() * 100.0,
        snapshot.fetch_panics
    );
    println!("  Samples fetched:   {}", snapshot.samples_appended);
    println!(
        "  Refills requested: {} ({} contended skips)",
        snapshot.refills_requested, snapshot.contended_skips
    );
    println!(
        "  Holds:             {} by fetcher, {} by operator ({} resumed)",
        snapshot.fetches_held, snapshot.holds, snapshot.resumes
    );
    println!("  Uptime:            {}", snapshot.uptime_human());
}

/// Rejects every `every`-th fetch without consulting the wrapped source.
struct FaultInjector<F> {
    inner: F,
    every: u32,
    calls: u32,
}

impl<F> FaultInjector<F> {
    fn new(inner: F, every: u32) -> Self {
        Self {
            inner,
            every: every.max(1),
            calls: 0,
        }
    }
}

impl<F: PositionFetcher> PositionFetcher for FaultInjector<F> {
    fn fetch(&mut self, id: EntityId, queue: &mut PositionQueue) -> FetchOutcome {
        self.calls = self.calls.wrapping_add(1);
        if self.calls % self.every == 0 {
            debug!(entity = %id, "Injected fetch failure");
            return FetchOutcome::Reject;
        }
        self.inner.fetch(id, queue)
    }
}
