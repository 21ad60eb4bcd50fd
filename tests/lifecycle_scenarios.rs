//! Integration tests for the check lifecycle.
//!
//! Drives a seeded engine through the clock, user actions and connectivity
//! changes, and checks the observable state after each step.

use chrono::{Duration, TimeZone, Utc};
use rounds::checks::{CompletionPayload, ObservedState, ResidentObservation, Timestamp};
use rounds::engine::{CommandKind, CompletionRoute, ConnectionState};
use rounds::{
    CheckKind, CheckStatus, Command, CommandError, CommandOutcome, Engine, EngineEvent, Fixture,
    RoundsConfig,
};
use tokio::sync::mpsc;

fn seeded_at() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 14, 21, 0, 0).unwrap()
}

fn engine() -> Engine {
    Engine::new(&RoundsConfig::default(), Fixture::builtin(), seeded_at())
}

fn sleeping(ids: &[&str]) -> Vec<ResidentObservation> {
    ids.iter()
        .map(|id| ResidentObservation::new(*id, ObservedState::Sleeping))
        .collect()
}

/// C1 is due 15 minutes after seeding with a 15 minute interval.
#[test]
fn test_scheduled_check_ages_then_is_missed_and_recurs() {
    let mut engine = engine();
    let due = engine.check("C1-g0").unwrap().due_at;
    assert_eq!(due, seeded_at() + Duration::minutes(15));

    let status = |engine: &Engine, at: Timestamp| engine.status_of("C1-g0", at).unwrap();
    assert_eq!(status(&engine, due - Duration::minutes(9)), CheckStatus::Early);
    assert_eq!(status(&engine, due - Duration::minutes(8)), CheckStatus::Pending);
    assert_eq!(status(&engine, due - Duration::minutes(3)), CheckStatus::DueSoon);
    assert_eq!(status(&engine, due - Duration::minutes(1)), CheckStatus::Due);

    // C2 and C3 fall due first; only C1 matters here.
    let report = engine.tick(due);
    assert!(report.missed.contains(&"C1-g0".to_owned()));

    let missed = engine.check("C1-g0").unwrap();
    assert_eq!(missed.status, CheckStatus::Missed);

    let successor = engine.check("C1-g1").unwrap();
    assert_eq!(successor.due_at, due + Duration::minutes(15));
    assert_eq!(successor.generation_id, 1);
    assert_eq!(successor.slot_id, "C1");
    assert_eq!(successor.residents, missed.residents);
    assert_eq!(
        successor.special_classifications,
        missed.special_classifications
    );

    let view = engine.view(due);
    assert!(view.find("C1-g0").is_none());
    assert_eq!(view.find_slot("C1").unwrap().check.id, "C1-g1");
}

#[test]
fn test_offline_completion_queues_then_syncs_on_restore() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut engine = engine().with_events(tx);
    let t = seeded_at() + Duration::minutes(2);

    engine.lose_connectivity(t);
    let route = engine
        .complete_check("C2-g0", sleeping(&["r-1003"]), None, t)
        .unwrap();
    assert_eq!(route, CompletionRoute::Queued);
    assert_eq!(engine.check("C2-g0").unwrap().status, CheckStatus::Queued);
    assert_eq!(engine.queued_count(), 1);

    // Queued checks stay visible and are not swept.
    let view = engine.view(t);
    assert_eq!(view.queued_count, 1);
    assert_eq!(
        view.find("C2-g0").unwrap().display_status,
        CheckStatus::Queued
    );
    let past_due = seeded_at() + Duration::minutes(13);
    let report = engine.tick(past_due);
    assert!(!report.missed.contains(&"C2-g0".to_owned()));

    let restored_at = past_due + Duration::seconds(30);
    let state = engine.restore_connectivity(restored_at).unwrap();
    assert_eq!(state, ConnectionState::Synced);

    let synced = engine.check("C2-g0").unwrap();
    assert_eq!(synced.status, CheckStatus::Complete);
    assert_eq!(synced.last_checked_at, Some(restored_at));
    assert_eq!(engine.queued_count(), 0);
    assert!(engine.check("C2-g1").is_some());

    engine.advance(restored_at + Duration::milliseconds(1999));
    assert_eq!(engine.connection_state(), ConnectionState::Synced);
    engine.advance(restored_at + Duration::seconds(2));
    assert_eq!(engine.connection_state(), ConnectionState::Online);

    let mut transitions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::ConnectionChanged { to, .. } = event {
            transitions.push(to);
        }
    }
    assert_eq!(
        transitions,
        vec![
            ConnectionState::Offline,
            ConnectionState::Syncing,
            ConnectionState::Synced,
            ConnectionState::Online,
        ]
    );
}

#[test]
fn test_restore_with_empty_queue_connects_without_sync() {
    let mut engine = engine();
    engine.lose_connectivity(seeded_at());
    let state = engine.restore_connectivity(seeded_at()).unwrap();
    assert_eq!(state, ConnectionState::Connected);
    engine.tick(seeded_at() + Duration::seconds(2));
    assert_eq!(engine.connection_state(), ConnectionState::Online);
}

#[test]
fn test_supplemental_check_is_complete_and_never_live() {
    let mut engine = engine();
    let before = engine.view(seeded_at()).live.len();
    let outcome = engine
        .apply(
            Command::AddSupplemental {
                location_id: "B1-102".into(),
                payload: CompletionPayload {
                    statuses: sleeping(&["r-1003"]),
                    notes: Some("resident reported noise next door".into()),
                    completion_time: seeded_at(),
                },
                incident_type: "noise complaint".into(),
            },
            seeded_at(),
        )
        .unwrap();
    let CommandOutcome::SupplementalAdded { check_id } = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };

    let record = engine.check(&check_id).unwrap();
    assert_eq!(record.kind, CheckKind::Supplemental);
    assert_eq!(record.status, CheckStatus::Complete);
    assert_eq!(record.incident_type.as_deref(), Some("noise complaint"));

    // Supplemental records never recur or get swept.
    engine.tick(seeded_at() + Duration::hours(3));
    assert_eq!(engine.supplemental_checks().len(), 1);
    assert_eq!(engine.view(seeded_at()).live.len(), before);
    assert!(engine.view(seeded_at()).find(&check_id).is_none());
}

#[test]
fn test_each_terminal_generation_has_at_most_one_successor() {
    let mut engine = engine();
    let mut now = seeded_at();
    for _ in 0..120 {
        now += Duration::minutes(1);
        engine.tick(now);
    }

    for slot in ["C1", "C2", "C3", "C4"] {
        let history = engine.history(slot);
        let live = history.iter().filter(|check| !check.is_terminal()).count();
        assert_eq!(live, 1, "slot {slot} must have exactly one live generation");
        for (gen_index, check) in history.iter().enumerate() {
            assert_eq!(check.generation_id, gen_index as u64);
        }
        for pair in history.windows(2) {
            assert_eq!(pair[1].due_at - pair[0].due_at, Duration::minutes(15));
        }
    }
}

#[test]
fn test_complete_only_follows_completing_in_online_flow() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut engine = engine().with_events(tx);
    let t = seeded_at() + Duration::minutes(4);

    for id in ["C1-g0", "C4-g0"] {
        engine
            .complete_check(id, Vec::new(), Some("quiet".into()), t)
            .unwrap();
    }
    engine.advance(t + Duration::seconds(2));

    let mut seen: Vec<(CommandKind, String)> = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::Applied {
            command,
            outcome:
                CommandOutcome::Completing { check_id } | CommandOutcome::Completed { check_id, .. },
            ..
        } = event
        {
            seen.push((command, check_id));
        }
    }
    for id in ["C1-g0", "C4-g0"] {
        let completing = seen
            .iter()
            .position(|(kind, c)| *kind == CommandKind::SetCompleting && c == id)
            .unwrap();
        let complete = seen
            .iter()
            .position(|(kind, c)| *kind == CommandKind::Complete && c == id)
            .unwrap();
        assert!(completing < complete);
    }
    assert_eq!(engine.check("C1-g0").unwrap().notes.as_deref(), Some("quiet"));
}

#[test]
fn test_reset_suppresses_delayed_complete() {
    let mut engine = engine();
    let t = seeded_at() + Duration::minutes(1);
    engine.complete_check("C2-g0", Vec::new(), None, t).unwrap();

    let reset_at = t + Duration::milliseconds(300);
    let outcome = engine.apply(Command::Reset { at: reset_at }, reset_at).unwrap();
    assert_eq!(outcome, CommandOutcome::Reset { seeded: 4 });

    engine.advance(t + Duration::seconds(10));
    let c2 = engine.check("C2-g0").unwrap();
    assert_ne!(c2.status, CheckStatus::Complete);
    assert_eq!(c2.due_at, reset_at + Duration::minutes(12));
    assert_eq!(engine.checks().len(), 4);
}

#[test]
fn test_reset_clears_offline_queue() {
    let mut engine = engine();
    engine.lose_connectivity(seeded_at());
    engine
        .complete_check("C1-g0", Vec::new(), None, seeded_at())
        .unwrap();
    engine
        .apply(Command::Reset { at: seeded_at() }, seeded_at())
        .unwrap();
    assert_eq!(engine.queued_count(), 0);
    assert_eq!(engine.check("C1-g0").unwrap().status, CheckStatus::Early);
}

#[test]
fn test_sync_twice_replays_nothing_the_second_time() {
    let mut engine = engine();
    engine.lose_connectivity(seeded_at());
    engine
        .complete_check("C3-g0", Vec::new(), None, seeded_at())
        .unwrap();
    engine
        .complete_check("C1-g0", Vec::new(), None, seeded_at())
        .unwrap();

    let sync_time = seeded_at() + Duration::minutes(1);
    let first = engine
        .apply(Command::Sync { sync_time }, sync_time)
        .unwrap();
    assert_eq!(
        first,
        CommandOutcome::Synced {
            replayed: vec!["C3-g0".into(), "C1-g0".into()]
        }
    );
    let snapshot = engine.checks().to_vec();

    let second = engine
        .apply(Command::Sync { sync_time }, sync_time)
        .unwrap();
    assert_eq!(second, CommandOutcome::EmptyQueue);
    assert_eq!(engine.checks(), snapshot.as_slice());
}

#[test]
fn test_rejected_command_leaves_state_unchanged() {
    let mut engine = engine();
    let snapshot = engine.checks().to_vec();
    let view = engine.view(seeded_at());

    let err = engine
        .apply(
            Command::Miss {
                check_id: "C9-g0".into(),
                missed_at: seeded_at(),
            },
            seeded_at(),
        )
        .unwrap_err();
    assert!(matches!(err, CommandError::NotFound { .. }));

    let err = engine
        .apply(
            Command::SetQueued {
                check_id: "C1-g0".into(),
                payload: CompletionPayload {
                    statuses: Vec::new(),
                    notes: None,
                    completion_time: seeded_at(),
                },
            },
            seeded_at(),
        )
        .unwrap_err();
    assert!(matches!(err, CommandError::PreconditionFailed { .. }));

    assert_eq!(engine.checks(), snapshot.as_slice());
    assert_eq!(engine.view(seeded_at()), view);
}

#[test]
fn test_late_count_tracks_overdue_live_checks() {
    let mut engine = engine();
    engine
        .complete_check("C3-g0", Vec::new(), None, seeded_at())
        .unwrap();
    // Held in completing past its due time: displays as completing, not late.
    let view = engine.view(seeded_at() + Duration::minutes(10));
    assert_eq!(view.late_count, 0);

    // Without a sweep, C2 (due +12) displays late once its due time passes.
    let view = engine.view(seeded_at() + Duration::minutes(12));
    assert_eq!(
        view.find("C2-g0").unwrap().display_status,
        CheckStatus::Late
    );
    assert_eq!(view.late_count, 1);
}

#[test]
fn test_queued_completion_matches_direct_completion_except_time() {
    let statuses = sleeping(&["r-1004", "r-1005"]);
    let notes = Some("both asleep".to_owned());
    let t = seeded_at() + Duration::minutes(3);

    let mut direct = engine();
    direct
        .apply(
            Command::Complete {
                check_id: "C3-g0".into(),
                payload: CompletionPayload {
                    statuses: statuses.clone(),
                    notes: notes.clone(),
                    completion_time: t,
                },
            },
            t,
        )
        .unwrap();

    let mut queued = engine();
    queued.lose_connectivity(t);
    queued
        .complete_check("C3-g0", statuses, notes, t)
        .unwrap();
    let sync_time = t + Duration::minutes(2);
    queued.restore_connectivity(sync_time).unwrap();

    let mut expected = direct.check("C3-g0").unwrap().clone();
    expected.last_checked_at = Some(sync_time);
    assert_eq!(queued.check("C3-g0").unwrap(), &expected);
    assert_eq!(
        queued.check("C3-g1").unwrap().due_at,
        direct.check("C3-g1").unwrap().due_at
    );
}
