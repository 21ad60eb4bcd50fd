//! Engine background loop.
//!
//! Spawns a tokio task that owns the [`Engine`] and serializes every
//! mutation: clock ticks, deferred deadlines and requests from any number of
//! [`EngineHandle`]s. After each step the current [`EngineView`] is published
//! on a watch channel. The loop exits once every handle is dropped.

use crate::checks::{ResidentObservation, Timestamp};
use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::engine::{
    Command, CommandOutcome, CommandResult, CompletionRoute, ConnectionState, Engine, EngineView,
    TickReport,
};
use crate::error::{Result, RoundsError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

/// Requests accepted by the engine loop.
enum Request {
    Apply {
        command: Command,
        reply: oneshot::Sender<CommandResult<CommandOutcome>>,
    },
    CompleteCheck {
        check_id: String,
        statuses: Vec<ResidentObservation>,
        notes: Option<String>,
        reply: oneshot::Sender<CommandResult<CompletionRoute>>,
    },
    LoseConnectivity,
    RestoreConnectivity {
        reply: oneshot::Sender<CommandResult<ConnectionState>>,
    },
    ResolveScan {
        scanned: String,
        reply: oneshot::Sender<CommandResult<String>>,
    },
    Tick {
        reply: oneshot::Sender<TickReport>,
    },
}

/// Cloneable front end to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Request>,
    view_rx: watch::Receiver<EngineView>,
}

impl EngineHandle {
    /// Apply a command and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RoundsError::Command`] on rejection, or
    /// [`RoundsError::Channel`] if the engine loop has stopped.
    pub async fn apply(&self, command: Command) -> Result<CommandOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Apply { command, reply })?;
        Ok(recv(rx).await??)
    }

    /// Route a completion intent through the choreographer.
    ///
    /// # Errors
    ///
    /// Returns the rejection, or [`RoundsError::Channel`] if the loop stopped.
    pub async fn complete_check(
        &self,
        check_id: impl Into<String>,
        statuses: Vec<ResidentObservation>,
        notes: Option<String>,
    ) -> Result<CompletionRoute> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::CompleteCheck {
            check_id: check_id.into(),
            statuses,
            notes,
            reply,
        })?;
        Ok(recv(rx).await??)
    }

    /// Report lost connectivity (or force offline mode).
    ///
    /// # Errors
    ///
    /// Returns [`RoundsError::Channel`] if the loop stopped.
    pub fn lose_connectivity(&self) -> Result<()> {
        self.send(Request::LoseConnectivity)
    }

    /// Report restored connectivity; resolves once any sync has finished.
    ///
    /// # Errors
    ///
    /// Returns the sync rejection, or [`RoundsError::Channel`] if the loop stopped.
    pub async fn restore_connectivity(&self) -> Result<ConnectionState> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::RestoreConnectivity { reply })?;
        Ok(recv(rx).await??)
    }

    /// Map a scanned code to the live check it refers to.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing live matches.
    pub async fn resolve_scan(&self, scanned: impl Into<String>) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::ResolveScan {
            scanned: scanned.into(),
            reply,
        })?;
        Ok(recv(rx).await??)
    }

    /// Run one clock tick now instead of waiting for the interval.
    ///
    /// # Errors
    ///
    /// Returns [`RoundsError::Channel`] if the loop stopped.
    pub async fn tick(&self) -> Result<TickReport> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Tick { reply })?;
        recv(rx).await
    }

    /// The most recently published view.
    pub fn view(&self) -> EngineView {
        self.view_rx.borrow().clone()
    }

    /// Receiver that is notified on every published view.
    pub fn subscribe(&self) -> watch::Receiver<EngineView> {
        self.view_rx.clone()
    }

    fn send(&self, request: Request) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| RoundsError::Channel("engine loop has stopped".to_owned()))
    }
}

async fn recv<T>(rx: oneshot::Receiver<T>) -> Result<T> {
    rx.await
        .map_err(|_| RoundsError::Channel("engine loop dropped the reply".to_owned()))
}

/// Spawn the engine loop.
///
/// Returns the task handle and the first [`EngineHandle`].
pub fn spawn(
    mut engine: Engine,
    clock: Arc<dyn Clock>,
    config: &RuntimeConfig,
) -> (tokio::task::JoinHandle<()>, EngineHandle) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(engine.view(clock.now()));
    let tick_every = std::time::Duration::from_millis(config.tick_interval_ms.max(1));

    let task = tokio::spawn(async move {
        info!("engine started with {} checks", engine.checks().len());
        let mut interval = tokio::time::interval(tick_every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let deadline = engine.next_deadline();
            let wake = wake_instant(clock.now(), deadline);

            tokio::select! {
                _ = interval.tick() => {
                    let report = engine.tick(clock.now());
                    if !report.missed.is_empty() {
                        debug!(missed = ?report.missed, "sweep missed checks");
                    }
                }
                _ = tokio::time::sleep_until(wake), if deadline.is_some() => {
                    engine.advance(clock.now());
                }
                request = rx.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    handle(&mut engine, request, clock.now());
                }
            }

            view_tx.send_replace(engine.view(clock.now()));
        }
        info!("engine stopped: all handles dropped");
    });

    (task, EngineHandle { tx, view_rx })
}

fn handle(engine: &mut Engine, request: Request, now: Timestamp) {
    // A dropped reply receiver means the caller stopped waiting; the
    // request has still been applied.
    match request {
        Request::Apply { command, reply } => {
            let _ = reply.send(engine.apply(command, now));
        }
        Request::CompleteCheck {
            check_id,
            statuses,
            notes,
            reply,
        } => {
            let _ = reply.send(engine.complete_check(&check_id, statuses, notes, now));
        }
        Request::LoseConnectivity => engine.lose_connectivity(now),
        Request::RestoreConnectivity { reply } => {
            let _ = reply.send(engine.restore_connectivity(now));
        }
        Request::ResolveScan { scanned, reply } => {
            let _ = reply.send(engine.resolve_scan(&scanned));
        }
        Request::Tick { reply } => {
            let _ = reply.send(engine.tick(now));
        }
    }
}

/// Translate an engine deadline into a tokio instant.
fn wake_instant(now: Timestamp, deadline: Option<Timestamp>) -> tokio::time::Instant {
    let wait = deadline
        .and_then(|deadline| (deadline - now).to_std().ok())
        .unwrap_or_default();
    tokio::time::Instant::now() + wait
}
