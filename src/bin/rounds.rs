//! `rounds`: drive the check lifecycle engine from the command line.
//!
//! - `simulate` replays a deterministic timeline on a manual clock and
//!   prints per-slot history as JSON.
//! - `run` starts the engine loop on the wall clock and prints each
//!   published view as a JSON line.
//! - `status` prints the seeded view.
//! - `config` prints the effective configuration as TOML.
//!
//! Logs go to stderr; stdout carries only JSON/TOML output.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use rounds::checks::{CheckStatus, ObservedState, ResidentObservation};
use rounds::engine::CompletionRoute;
use rounds::{Clock, Engine, ManualClock, RoundsConfig, SystemClock, Timestamp};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rounds")]
#[command(about = "Check lifecycle and reconciliation engine for supervised rounds")]
struct Cli {
    /// Path to configuration file (defaults to ~/.config/rounds/config.toml if present)
    #[arg(short, long, env = "ROUNDS_CONFIG")]
    config: Option<PathBuf>,

    /// Seed fixture (JSON); overrides the config file
    #[arg(long, env = "ROUNDS_FIXTURE")]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a deterministic round on a manual clock
    Simulate {
        /// Minutes of round time to simulate
        #[arg(long, default_value_t = 45)]
        minutes: u32,

        /// Clock step between sweeps, in seconds
        #[arg(long, default_value_t = 60)]
        step_secs: u32,

        /// Simulation start (RFC 3339); defaults to now
        #[arg(long)]
        start: Option<DateTime<Utc>>,

        /// Minute at which connectivity drops
        #[arg(long)]
        offline_at: Option<u32>,

        /// Minute at which connectivity returns
        #[arg(long)]
        online_at: Option<u32>,

        /// Completion as SCAN@MINUTE (slot, location or check id); repeatable
        #[arg(long = "complete", value_name = "SCAN@MINUTE")]
        completions: Vec<String>,
    },
    /// Run the engine on the wall clock, printing each published view
    Run {
        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Print the seeded live view as JSON
    Status,
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rounds=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    if let Some(fixture) = cli.fixture {
        config.fixture.path = Some(fixture);
    }

    match cli.command {
        Commands::Simulate {
            minutes,
            step_secs,
            start,
            offline_at,
            online_at,
            completions,
        } => {
            let timeline = Timeline {
                minutes,
                step: Duration::seconds(i64::from(step_secs.max(1))),
                offline_at,
                online_at,
                completions: completions
                    .iter()
                    .map(|arg| parse_completion(arg))
                    .collect::<anyhow::Result<_>>()?,
            };
            let report = simulate(&config, start.unwrap_or_else(Utc::now), &timeline)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Run { duration_secs } => run(&config, duration_secs).await?,
        Commands::Status => {
            let now = Utc::now();
            let engine = Engine::from_config(&config, now)?;
            println!("{}", serde_json::to_string_pretty(&engine.view(now))?);
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RoundsConfig> {
    if let Some(path) = path {
        return RoundsConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    let default_path = RoundsConfig::default_config_path();
    if default_path.exists() {
        info!("using config {}", default_path.display());
        return Ok(RoundsConfig::from_file(&default_path)?);
    }
    Ok(RoundsConfig::default())
}

struct Timeline {
    minutes: u32,
    step: Duration,
    offline_at: Option<u32>,
    online_at: Option<u32>,
    completions: Vec<(String, u32)>,
}

fn parse_completion(arg: &str) -> anyhow::Result<(String, u32)> {
    let (scan, minute) = arg
        .rsplit_once('@')
        .with_context(|| format!("expected SCAN@MINUTE, got {arg:?}"))?;
    let minute = minute
        .parse()
        .with_context(|| format!("invalid minute in {arg:?}"))?;
    Ok((scan.to_owned(), minute))
}

#[derive(Serialize)]
struct SimulationReport {
    start: Timestamp,
    end: Timestamp,
    slots: Vec<SlotReport>,
    supplemental: usize,
    queued: usize,
    late: usize,
}

#[derive(Serialize)]
struct SlotReport {
    slot_id: String,
    generations: Vec<GenerationReport>,
    missed_cycles: u32,
}

#[derive(Serialize)]
struct GenerationReport {
    check_id: String,
    due_at: Timestamp,
    status: CheckStatus,
    last_checked_at: Option<Timestamp>,
    completion_status: Option<String>,
}

fn simulate(
    config: &RoundsConfig,
    start: Timestamp,
    timeline: &Timeline,
) -> anyhow::Result<SimulationReport> {
    let clock = ManualClock::new(start);
    let mut engine = Engine::from_config(config, start)?;
    let end = start + Duration::minutes(i64::from(timeline.minutes));
    info!("simulating {} minutes from {start}", timeline.minutes);

    while clock.now() <= end {
        let now = clock.now();
        // Deferred steps fire at their own instants, not at the next sweep.
        while let Some(deadline) = engine.next_deadline() {
            if deadline > now {
                break;
            }
            engine.advance(deadline);
        }

        let minute = u32::try_from((now - start).num_minutes()).unwrap_or(u32::MAX);
        let on_minute = (now - start).num_seconds() % 60 < timeline.step.num_seconds();
        if on_minute {
            if timeline.offline_at == Some(minute) {
                engine.lose_connectivity(now);
            }
            if timeline.online_at == Some(minute) {
                if let Err(e) = engine.restore_connectivity(now) {
                    warn!("sync failed: {e}");
                }
            }
            for (scan, _) in timeline.completions.iter().filter(|(_, m)| *m == minute) {
                complete_scan(&mut engine, scan, now);
            }
        }

        engine.tick(now);
        clock.advance(timeline.step);
    }

    let mut slot_ids: Vec<&str> = engine
        .checks()
        .iter()
        .filter(|check| check.is_scheduled())
        .map(|check| check.slot_id.as_str())
        .collect();
    slot_ids.sort_unstable();
    slot_ids.dedup();

    let slots = slot_ids
        .into_iter()
        .map(|slot_id| SlotReport {
            slot_id: slot_id.to_owned(),
            generations: engine
                .history(slot_id)
                .into_iter()
                .map(|check| GenerationReport {
                    check_id: check.id.clone(),
                    due_at: check.due_at,
                    status: engine
                        .status_of(&check.id, end)
                        .unwrap_or(check.status),
                    last_checked_at: check.last_checked_at,
                    completion_status: check.completion_status.clone(),
                })
                .collect(),
            missed_cycles: engine.missed_cycles(slot_id),
        })
        .collect();

    let view = engine.view(end);
    Ok(SimulationReport {
        start,
        end,
        slots,
        supplemental: engine.supplemental_checks().len(),
        queued: view.queued_count,
        late: view.late_count,
    })
}

fn complete_scan(engine: &mut Engine, scan: &str, now: Timestamp) {
    let check_id = match engine.resolve_scan(scan) {
        Ok(id) => id,
        Err(e) => {
            warn!("scan {scan} ignored: {e}");
            return;
        }
    };
    let statuses = engine
        .check(&check_id)
        .map(|check| {
            check
                .residents
                .iter()
                .map(|r| ResidentObservation::new(r.id.clone(), ObservedState::Sleeping))
                .collect()
        })
        .unwrap_or_default();
    match engine.complete_check(&check_id, statuses, None, now) {
        Ok(CompletionRoute::Queued) => info!("{check_id} queued while offline"),
        Ok(CompletionRoute::Completing { commit_at }) => {
            info!("{check_id} completing, commit at {commit_at}");
        }
        Err(e) => warn!("completion of {check_id} rejected: {e}"),
    }
}

async fn run(config: &RoundsConfig, duration_secs: Option<u64>) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Engine::from_config(config, clock.now())?;
    let (task, handle) = rounds::spawn(engine, clock, &config.runtime);
    let mut views = handle.subscribe();

    let deadline = duration_secs.map(|secs| {
        tokio::time::Instant::now() + std::time::Duration::from_secs(secs)
    });
    let stop = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("ctrl-c handler failed: {e}");
                }
            }
        }
    };
    tokio::pin!(stop);

    let mut last_printed = None;
    loop {
        tokio::select! {
            _ = &mut stop => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                // Ticks republish even when nothing moved; print changes only.
                let key = (view.live.clone(), view.connection, view.queued_count);
                if last_printed.as_ref() != Some(&key) {
                    println!("{}", serde_json::to_string(&view)?);
                    last_printed = Some(key);
                }
            }
        }
    }

    drop(views);
    drop(handle);
    task.await.context("engine task panicked")?;
    info!("stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;

    fn start() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 14, 21, 0, 0).unwrap()
    }

    #[test]
    fn parse_completion_splits_on_last_at() {
        assert_eq!(parse_completion("C1@5").unwrap(), ("C1".to_owned(), 5));
        assert!(parse_completion("C1").is_err());
        assert!(parse_completion("C1@soon").is_err());
    }

    #[test]
    fn simulate_without_completions_misses_every_slot() {
        let timeline = Timeline {
            minutes: 20,
            step: Duration::seconds(60),
            offline_at: None,
            online_at: None,
            completions: Vec::new(),
        };
        let report = simulate(&RoundsConfig::default(), start(), &timeline).unwrap();
        assert_eq!(report.slots.len(), 4);
        let c3 = report.slots.iter().find(|s| s.slot_id == "C3").unwrap();
        assert_eq!(c3.missed_cycles, 1);
        assert_eq!(c3.generations[0].status, CheckStatus::Missed);
    }

    #[test]
    fn simulate_offline_completion_syncs_on_restore() {
        let timeline = Timeline {
            minutes: 10,
            step: Duration::seconds(60),
            offline_at: Some(1),
            online_at: Some(4),
            completions: vec![("B1-101".to_owned(), 2)],
        };
        let report = simulate(&RoundsConfig::default(), start(), &timeline).unwrap();
        assert_eq!(report.queued, 0);
        let c1 = report.slots.iter().find(|s| s.slot_id == "C1").unwrap();
        assert_eq!(c1.generations[0].status, CheckStatus::Complete);
        assert_eq!(
            c1.generations[0].last_checked_at,
            Some(start() + Duration::minutes(4))
        );
        assert_eq!(c1.generations.len(), 2);
    }
}
