//! Integration tests for loading configuration and seed fixtures from disk.

use chrono::{Duration, TimeZone, Utc};
use rounds::checks::{Resident, SlotSeed};
use rounds::{CheckStatus, Engine, Fixture, RoundsConfig, RoundsError, StatusWindows};

fn fixture() -> Fixture {
    Fixture {
        residents: vec![Resident {
            id: "r-1".into(),
            name: "Ada".into(),
            location: "W-1".into(),
        }],
        slots: vec![SlotSeed {
            slot_id: "W1".into(),
            location_id: "W-1".into(),
            walking_order_index: 0,
            base_interval_minutes: 30,
            due_in_minutes: 30,
            special_classifications: Vec::new(),
        }],
    }
}

#[test]
fn test_engine_loads_fixture_named_in_config() {
    let dir = tempfile::tempdir().unwrap();
    let fixture_path = dir.path().join("unit.json");
    std::fs::write(&fixture_path, serde_json::to_vec(&fixture()).unwrap()).unwrap();

    let mut config = RoundsConfig::default();
    config.fixture.path = Some(fixture_path);
    config.status = StatusWindows {
        pending_after_minutes: 10,
        due_soon_after_minutes: 20,
        due_after_minutes: 25,
    };
    let config_path = dir.path().join("rounds").join("config.toml");
    config.save_to_file(&config_path).unwrap();

    let loaded = RoundsConfig::from_file(&config_path).unwrap();
    assert_eq!(loaded, config);

    let now = Utc.with_ymd_and_hms(2026, 3, 14, 21, 0, 0).unwrap();
    let engine = Engine::from_config(&loaded, now).unwrap();
    let view = engine.view(now);
    assert_eq!(view.live.len(), 1);
    assert_eq!(view.live[0].check.id, "W1-g0");
    assert_eq!(view.live[0].check.residents[0].name, "Ada");

    let status = |minutes| {
        engine
            .status_of("W1-g0", now + Duration::minutes(minutes))
            .unwrap()
    };
    assert_eq!(status(9), CheckStatus::Early);
    assert_eq!(status(10), CheckStatus::Pending);
    assert_eq!(status(20), CheckStatus::DueSoon);
    assert_eq!(status(25), CheckStatus::Due);
    assert_eq!(status(30), CheckStatus::Late);
}

#[test]
fn test_missing_fixture_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RoundsConfig::default();
    config.fixture.path = Some(dir.path().join("absent.json"));
    let result = Engine::from_config(&config, Utc::now());
    assert!(matches!(result, Err(RoundsError::Io(_))));
}

#[test]
fn test_unordered_windows_are_rejected() {
    let mut config = RoundsConfig::default();
    config.status.due_soon_after_minutes = config.status.due_after_minutes;
    let result = Engine::from_config(&config, Utc::now());
    assert!(matches!(result, Err(RoundsError::Config(_))));
}

#[test]
fn test_partial_config_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[connection]\nsettle_ms = 500\n").unwrap();

    let config = RoundsConfig::from_file(&path).unwrap();
    assert_eq!(config.connection.settle_ms, 500);
    assert_eq!(config.status, StatusWindows::default());
    assert_eq!(config.choreography, RoundsConfig::default().choreography);
}
