//! Command handler.
//!
//! [`Engine`] owns the check collection, the connection state machine (and
//! with it the offline queue) and the deferred-command queue. It is the only
//! place any of them is mutated. Commands are validated before anything is
//! touched, so a rejection always leaves state unchanged.

use crate::checks::{
    Check, CheckKind, CheckStatus, CompletionPayload, Fixture, QueueEntry, ResidentObservation,
    StatusWindows, Timestamp, next_generation, summarize,
};
use crate::config::RoundsConfig;
use crate::engine::choreographer::{
    CompletionPlan, CompletionRoute, DeferredAction, DeferredCommand, DeferredQueue,
    DeferredTarget, saturating_ms,
};
use crate::engine::command::{Command, CommandKind, CommandOutcome, EngineEvent};
use crate::engine::connection::{ConnectionMachine, ConnectionState, Transition};
use crate::engine::error::CommandError;
use crate::engine::sweeper;
use crate::engine::view::{EngineView, LiveCheck};
use chrono::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome type for command handling.
pub type CommandResult<T> = std::result::Result<T, CommandError>;

/// Pushes replayed queue entries to the backing store during `Sync`.
///
/// Returning `Err` aborts the sync and keeps the queue intact.
pub type SyncTransport =
    Box<dyn FnMut(&[QueueEntry]) -> std::result::Result<(), String> + Send>;

/// What one clock tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Deferred commands that fired (including skipped stale ones).
    pub fired: usize,
    /// Checks missed by the sweep.
    pub missed: Vec<String>,
}

/// The check lifecycle engine.
pub struct Engine {
    /// Every generation ever created, append-only per slot.
    checks: Vec<Check>,
    connection: ConnectionMachine,
    deferred: DeferredQueue,
    fixture: Fixture,
    windows: StatusWindows,
    plan: CompletionPlan,
    /// Bumped by `Reset`; deferred commands from an older epoch are stale.
    epoch: u64,
    transport: Option<SyncTransport>,
    event_tx: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl Engine {
    /// Create an engine seeded from `fixture` at `now`.
    pub fn new(config: &RoundsConfig, fixture: Fixture, now: Timestamp) -> Self {
        let windows = config.status;
        let settle = Duration::milliseconds(saturating_ms(config.connection.settle_ms));
        Self {
            checks: fixture.build_checks(now, &windows),
            connection: ConnectionMachine::new(settle, now),
            deferred: DeferredQueue::new(),
            fixture,
            windows,
            plan: CompletionPlan::from_config(&config.choreography),
            epoch: 0,
            transport: None,
            event_tx: None,
        }
    }

    /// Create an engine from config, loading the fixture file if one is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the fixture cannot be loaded.
    pub fn from_config(config: &RoundsConfig, now: Timestamp) -> crate::Result<Self> {
        config.validate()?;
        let fixture = match &config.fixture.path {
            Some(path) => Fixture::from_file(path)?,
            None => Fixture::builtin(),
        };
        Ok(Self::new(config, fixture, now))
    }

    /// Push synced entries through `transport` before committing them.
    pub fn with_transport(mut self, transport: SyncTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Report every applied/rejected command and state change on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    // -----------------------------------------------------------------------
    // Command API
    // -----------------------------------------------------------------------

    /// Apply one command atomically.
    ///
    /// # Errors
    ///
    /// Returns the [`CommandError`] describing why the command was rejected;
    /// state is unchanged in that case.
    pub fn apply(&mut self, command: Command, now: Timestamp) -> CommandResult<CommandOutcome> {
        let kind = command.kind();
        let result = match command {
            Command::Complete { check_id, payload } => self.complete(&check_id, payload, now),
            Command::Miss {
                check_id,
                missed_at,
            } => self.miss(&check_id, missed_at, now),
            Command::AddSupplemental {
                location_id,
                payload,
                incident_type,
            } => self.add_supplemental(location_id, payload, incident_type),
            Command::SetCompleting { check_id } => self.set_completing(&check_id),
            Command::SetQueued { check_id, payload } => self.set_queued(&check_id, payload, now),
            Command::Sync { sync_time } => self.sync(sync_time),
            Command::Reset { at } => Ok(self.reset(at)),
        };

        match &result {
            Ok(outcome) => {
                debug!(command = %kind, ?outcome, "command applied");
                self.emit(EngineEvent::Applied {
                    command: kind,
                    outcome: outcome.clone(),
                    at: now,
                });
            }
            Err(e) => {
                warn!(command = %kind, "command rejected: {e}");
                self.emit(EngineEvent::Rejected {
                    command: kind,
                    error: e.clone(),
                    at: now,
                });
            }
        }
        result
    }

    fn complete(
        &mut self,
        check_id: &str,
        payload: CompletionPayload,
        now: Timestamp,
    ) -> CommandResult<CommandOutcome> {
        let idx = self.index_of(check_id)?;
        let status = self.checks[idx].status;
        if status.is_terminal() {
            return Err(CommandError::invalid(check_id, status, CheckStatus::Complete));
        }
        // A queued completion belongs to the queue until Sync replays it.
        if status == CheckStatus::Queued {
            return Err(CommandError::invalid(check_id, status, CheckStatus::Complete));
        }
        if self.connection.is_offline() {
            return Err(CommandError::precondition(
                "connection is offline; completions must be queued",
            ));
        }
        Ok(self.commit_completion(idx, payload, now))
    }

    fn commit_completion(
        &mut self,
        idx: usize,
        payload: CompletionPayload,
        now: Timestamp,
    ) -> CommandOutcome {
        let check = &mut self.checks[idx];
        check.status = CheckStatus::Complete;
        check.last_checked_at = Some(payload.completion_time);
        check.completion_status = Some(summarize(&payload.statuses));
        check.notes = payload.notes;
        let check_id = check.id.clone();
        info!(
            check_id = %check_id,
            summary = check.completion_status.as_deref().unwrap_or_default(),
            "check complete"
        );

        let successor = self.recur(idx, now);
        CommandOutcome::Completed {
            check_id,
            successor,
        }
    }

    fn miss(
        &mut self,
        check_id: &str,
        missed_at: Timestamp,
        now: Timestamp,
    ) -> CommandResult<CommandOutcome> {
        let idx = self.index_of(check_id)?;
        let status = self.checks[idx].status;
        if status.is_terminal() || matches!(status, CheckStatus::Completing | CheckStatus::Queued)
        {
            return Err(CommandError::invalid(check_id, status, CheckStatus::Missed));
        }

        let check = &mut self.checks[idx];
        check.status = CheckStatus::Missed;
        check.last_checked_at = Some(missed_at);
        info!(check_id = %check_id, due_at = %check.due_at, "check missed");

        let successor = self.recur(idx, now);
        Ok(CommandOutcome::Missed {
            check_id: check_id.to_owned(),
            successor,
        })
    }

    fn add_supplemental(
        &mut self,
        location_id: String,
        payload: CompletionPayload,
        incident_type: String,
    ) -> CommandResult<CommandOutcome> {
        if !self.fixture.knows_location(&location_id) {
            return Err(CommandError::not_found(location_id));
        }

        let id = format!("sup-{}", uuid::Uuid::new_v4());
        let special_classifications = self
            .fixture
            .slots
            .iter()
            .filter(|slot| slot.location_id == location_id)
            .flat_map(|slot| slot.special_classifications.iter().cloned())
            .collect();

        let check = Check {
            id: id.clone(),
            slot_id: id.clone(),
            residents: self.fixture.residents_at(&location_id),
            location_id,
            kind: CheckKind::Supplemental,
            status: CheckStatus::Complete,
            due_at: payload.completion_time,
            walking_order_index: 0,
            special_classifications,
            generation_id: 0,
            base_interval_minutes: 0,
            last_checked_at: Some(payload.completion_time),
            completion_status: Some(summarize(&payload.statuses)),
            notes: payload.notes,
            incident_type: Some(incident_type),
            hidden: false,
        };
        info!(
            check_id = %id,
            location = %check.location_id,
            "supplemental check logged"
        );
        self.checks.push(check);
        Ok(CommandOutcome::SupplementalAdded { check_id: id })
    }

    fn set_completing(&mut self, check_id: &str) -> CommandResult<CommandOutcome> {
        let idx = self.index_of(check_id)?;
        let status = self.checks[idx].status;
        if status.is_terminal() || matches!(status, CheckStatus::Completing | CheckStatus::Queued)
        {
            return Err(CommandError::invalid(
                check_id,
                status,
                CheckStatus::Completing,
            ));
        }
        self.checks[idx].status = CheckStatus::Completing;
        Ok(CommandOutcome::Completing {
            check_id: check_id.to_owned(),
        })
    }

    fn set_queued(
        &mut self,
        check_id: &str,
        payload: CompletionPayload,
        now: Timestamp,
    ) -> CommandResult<CommandOutcome> {
        if !self.connection.is_offline() {
            return Err(CommandError::precondition(format!(
                "connection is {}; queueing requires offline",
                self.connection.state()
            )));
        }
        let idx = self.index_of(check_id)?;
        let status = self.checks[idx].status;
        if status.is_terminal() || status == CheckStatus::Queued {
            return Err(CommandError::invalid(check_id, status, CheckStatus::Queued));
        }

        // Queued checks stay live, even after the completing hold hid them.
        let check = &mut self.checks[idx];
        check.status = CheckStatus::Queued;
        check.hidden = false;
        self.connection.enqueue(QueueEntry {
            check_id: check_id.to_owned(),
            payload,
            queued_at: now,
        });
        let queue_len = self.connection.queued_len();
        info!(check_id = %check_id, queue_len, "completion queued while offline");
        Ok(CommandOutcome::Queued {
            check_id: check_id.to_owned(),
            queue_len,
        })
    }

    fn sync(&mut self, sync_time: Timestamp) -> CommandResult<CommandOutcome> {
        if self.connection.queued_len() == 0 {
            debug!("sync requested with an empty queue");
            return Ok(CommandOutcome::EmptyQueue);
        }

        let mut targets = Vec::with_capacity(self.connection.queued_len());
        for entry in self.connection.queue() {
            let idx = self.index_of(&entry.check_id)?;
            let status = self.checks[idx].status;
            if status != CheckStatus::Queued {
                return Err(CommandError::invalid(
                    &entry.check_id,
                    status,
                    CheckStatus::Complete,
                ));
            }
            targets.push(idx);
        }

        if let Some(transport) = self.transport.as_mut() {
            let entries: Vec<QueueEntry> = self.connection.queue().cloned().collect();
            transport(&entries).map_err(|reason| CommandError::SyncFailed { reason })?;
        }

        let entries = self.connection.drain_queue();
        let mut replayed = Vec::with_capacity(entries.len());
        for (entry, idx) in entries.into_iter().zip(targets) {
            let payload = CompletionPayload {
                completion_time: sync_time,
                ..entry.payload
            };
            let outcome = self.commit_completion(idx, payload, sync_time);
            self.emit(EngineEvent::Applied {
                command: CommandKind::Complete,
                outcome,
                at: sync_time,
            });
            replayed.push(entry.check_id);
        }

        info!("synced {} queued completions", replayed.len());
        Ok(CommandOutcome::Synced { replayed })
    }

    fn reset(&mut self, at: Timestamp) -> CommandOutcome {
        self.checks = self.fixture.build_checks(at, &self.windows);
        self.connection.clear_queue();
        self.epoch += 1;
        let seeded = self.checks.len();
        info!(epoch = self.epoch, "engine reset; reseeded {seeded} checks");
        CommandOutcome::Reset { seeded }
    }

    /// Append the successor of a just-terminated generation.
    fn recur(&mut self, idx: usize, now: Timestamp) -> Option<String> {
        let next = next_generation(&self.checks[idx], now, &self.windows)?;
        let id = next.id.clone();
        debug!(check_id = %id, due_at = %next.due_at, "scheduled next generation");
        self.checks.push(next);
        Some(id)
    }

    // -----------------------------------------------------------------------
    // Completion choreography
    // -----------------------------------------------------------------------

    /// Route a completion intent (scan resolved, form submitted).
    ///
    /// Offline, the completion is queued immediately. Online, the check enters
    /// the completing hold and the hide and commit steps are scheduled.
    ///
    /// # Errors
    ///
    /// Returns the rejection from `SetQueued` or `SetCompleting`.
    pub fn complete_check(
        &mut self,
        check_id: &str,
        statuses: Vec<ResidentObservation>,
        notes: Option<String>,
        now: Timestamp,
    ) -> CommandResult<CompletionRoute> {
        if self.connection.is_offline() {
            let payload = CompletionPayload {
                statuses,
                notes,
                completion_time: now,
            };
            self.apply(
                Command::SetQueued {
                    check_id: check_id.to_owned(),
                    payload,
                },
                now,
            )?;
            return Ok(CompletionRoute::Queued);
        }

        self.apply(
            Command::SetCompleting {
                check_id: check_id.to_owned(),
            },
            now,
        )?;
        let generation_id = self.checks[self.index_of(check_id)?].generation_id;
        let target = DeferredTarget {
            epoch: self.epoch,
            check_id: check_id.to_owned(),
            generation_id,
        };
        let commit_at = self
            .plan
            .schedule(&mut self.deferred, target, statuses, notes, now);
        Ok(CompletionRoute::Completing { commit_at })
    }

    fn fire_deferred(&mut self, deferred: DeferredCommand, now: Timestamp) {
        let target = deferred.target;
        let idx = match self.validate_target(&target) {
            Ok(idx) => idx,
            Err(reason) => {
                debug!(check_id = %target.check_id, "deferred step skipped: {reason}");
                self.emit(EngineEvent::DeferredSkipped {
                    check_id: target.check_id,
                    reason: reason.to_owned(),
                    at: now,
                });
                return;
            }
        };

        match deferred.action {
            DeferredAction::Hide => {
                self.checks[idx].hidden = true;
                self.emit(EngineEvent::CheckHidden {
                    check_id: target.check_id,
                    at: now,
                });
            }
            DeferredAction::Commit { statuses, notes } => {
                let payload = CompletionPayload {
                    statuses,
                    notes,
                    completion_time: now,
                };
                // Connectivity dropped during the hold: the commit joins the queue.
                let command = if self.connection.is_offline() {
                    Command::SetQueued {
                        check_id: target.check_id,
                        payload,
                    }
                } else {
                    Command::Complete {
                        check_id: target.check_id,
                        payload,
                    }
                };
                // Rejections are logged and reported by `apply`.
                let _ = self.apply(command, now);
            }
        }
    }

    fn validate_target(&self, target: &DeferredTarget) -> std::result::Result<usize, &'static str> {
        if target.epoch != self.epoch {
            return Err("engine was reset");
        }
        let idx = self
            .index_of(&target.check_id)
            .map_err(|_| "check no longer exists")?;
        let check = &self.checks[idx];
        if check.generation_id != target.generation_id {
            return Err("generation superseded");
        }
        if check.status != CheckStatus::Completing {
            return Err("check is no longer completing");
        }
        Ok(idx)
    }

    // -----------------------------------------------------------------------
    // Connection
    // -----------------------------------------------------------------------

    /// Connectivity lost, or the user forced offline mode.
    pub fn lose_connectivity(&mut self, now: Timestamp) {
        if let Some(transition) = self.connection.go_offline(now) {
            self.report_transition(transition, now);
        }
    }

    /// Connectivity restored. Syncs the queue when it is non-empty.
    ///
    /// # Errors
    ///
    /// Returns the sync rejection; the connection falls back to offline and
    /// the queue is kept for the next attempt.
    pub fn restore_connectivity(&mut self, now: Timestamp) -> CommandResult<ConnectionState> {
        let Some(transition) = self.connection.begin_restore(now) else {
            debug!(
                "connectivity restore ignored while {}",
                self.connection.state()
            );
            return Ok(self.connection.state());
        };
        self.report_transition(transition, now);

        if transition.to == ConnectionState::Syncing {
            let synced = self.apply(Command::Sync { sync_time: now }, now);
            if let Some(transition) = self.connection.finish_sync(synced.is_ok(), now) {
                self.report_transition(transition, now);
            }
            synced?;
        }
        Ok(self.connection.state())
    }

    fn report_transition(&mut self, transition: Transition, now: Timestamp) {
        info!("connection {} -> {}", transition.from, transition.to);
        self.emit(EngineEvent::ConnectionChanged {
            from: transition.from,
            to: transition.to,
            at: now,
        });
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    /// Fire due deferred commands and settle the connection state.
    ///
    /// Returns how many deferred commands fired.
    pub fn advance(&mut self, now: Timestamp) -> usize {
        let due = self.deferred.take_due(now);
        let fired = due.len();
        for deferred in due {
            self.fire_deferred(deferred, now);
        }
        if let Some(transition) = self.connection.advance(now) {
            self.report_transition(transition, now);
        }
        fired
    }

    /// One clock tick: [`Self::advance`], then one lifecycle sweep.
    pub fn tick(&mut self, now: Timestamp) -> TickReport {
        let fired = self.advance(now);
        let mut missed = Vec::new();
        for command in sweeper::sweep(&self.checks, now) {
            let Command::Miss { check_id, .. } = &command else {
                continue;
            };
            let check_id = check_id.clone();
            if self.apply(command, now).is_ok() {
                missed.push(check_id);
            }
        }
        TickReport { fired, missed }
    }

    /// Earliest instant at which [`Self::advance`] has work to do.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        match (self.deferred.next_deadline(), self.connection.settle_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // -----------------------------------------------------------------------
    // Read API
    // -----------------------------------------------------------------------

    /// Snapshot of the live round at `now`.
    pub fn view(&self, now: Timestamp) -> EngineView {
        let live: Vec<LiveCheck> = self
            .checks
            .iter()
            .filter(|check| check.is_scheduled() && !check.is_terminal() && !check.hidden)
            .map(|check| LiveCheck {
                check: check.clone(),
                display_status: self.windows.display(check, now),
            })
            .collect();
        let late_count = live
            .iter()
            .filter(|live| live.display_status == CheckStatus::Late)
            .count();

        EngineView {
            at: now,
            live,
            queued_count: self.connection.queued_len(),
            late_count,
            connection: self.connection.state(),
            epoch: self.epoch,
        }
    }

    /// Every record, historical ones included.
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn check(&self, check_id: &str) -> Option<&Check> {
        self.checks.iter().find(|check| check.id == check_id)
    }

    /// Display status of a record at `now`.
    pub fn status_of(&self, check_id: &str, now: Timestamp) -> Option<CheckStatus> {
        self.check(check_id)
            .map(|check| self.windows.display(check, now))
    }

    /// Every generation of a slot, oldest first.
    pub fn history(&self, slot_id: &str) -> Vec<&Check> {
        self.checks
            .iter()
            .filter(|check| check.slot_id == slot_id && check.is_scheduled())
            .collect()
    }

    /// Ad-hoc records, oldest first.
    pub fn supplemental_checks(&self) -> Vec<&Check> {
        self.checks
            .iter()
            .filter(|check| check.kind == CheckKind::Supplemental)
            .collect()
    }

    /// Consecutive missed generations at the end of a slot's history.
    pub fn missed_cycles(&self, slot_id: &str) -> u32 {
        let mut count = 0;
        for check in self.history(slot_id).into_iter().rev() {
            match check.status {
                CheckStatus::Missed => count += 1,
                status if status.is_terminal() => break,
                _ => {}
            }
        }
        count
    }

    /// Map a resolved scan (slot, location or check id) to the live check id.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NotFound`] when nothing live matches.
    pub fn resolve_scan(&self, scanned: &str) -> CommandResult<String> {
        self.checks
            .iter()
            .filter(|check| check.is_scheduled() && !check.is_terminal() && !check.hidden)
            .find(|check| {
                check.slot_id == scanned || check.location_id == scanned || check.id == scanned
            })
            .map(|check| check.id.clone())
            .ok_or_else(|| CommandError::not_found(scanned))
    }

    pub fn queue(&self) -> Vec<QueueEntry> {
        self.connection.queue().cloned().collect()
    }

    pub fn queued_count(&self) -> usize {
        self.connection.queued_len()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    fn index_of(&self, check_id: &str) -> CommandResult<usize> {
        self.checks
            .iter()
            .position(|check| check.id == check_id)
            .ok_or_else(|| CommandError::not_found(check_id))
    }

    fn emit(&mut self, event: EngineEvent) {
        let closed = match &self.event_tx {
            Some(tx) => tx.send(event).is_err(),
            None => false,
        };
        if closed {
            debug!("engine event channel closed, dropping sender");
            self.event_tx = None;
        }
    }
}
