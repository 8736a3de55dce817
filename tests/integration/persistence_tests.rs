//! History persistence through the filesystem store: round trips, missing
//! records, resumption after reload, and the on-disk format.

use std::fs;

use tempfile::TempDir;
use turbctl::adapters::fs_store::FsHistoryStore;
use turbctl::app::ports::HistoryStore;
use turbctl::config::ControllerConfig;
use turbctl::control::{Controller, HistoryLog, StateField};
use turbctl::error::Error;

fn stepped(name: &str, readings: &[f64]) -> Controller {
    let mut c = Controller::new(name, &ControllerConfig::with_setpoint(0.45)).unwrap();
    for &od in readings {
        c.step(Some(900.0), Some(od), None);
    }
    c
}

#[test]
fn save_then_load_reproduces_the_log() {
    let dir = TempDir::new().unwrap();
    let store = FsHistoryStore::new(dir.path());
    let original = stepped("plate0,A1", &[0.1, 0.13, 0.17, 0.2]);
    original.save_to(&store).unwrap();

    let mut restored = Controller::new("plate0,A1", &ControllerConfig::with_setpoint(0.45)).unwrap();
    restored.load_from(&store).unwrap();
    assert_eq!(restored.log(), original.log());
    assert_eq!(restored.history().len(), 4);

    // Saving the restored log again changes nothing on disk.
    let path = store.path_for("plate0,A1");
    let before = fs::read(&path).unwrap();
    restored.save_to(&store).unwrap();
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn load_without_a_record_is_not_found_and_keeps_state() {
    let dir = TempDir::new().unwrap();
    let store = FsHistoryStore::new(dir.path());
    let mut c = stepped("lonely", &[0.1, 0.2]);
    let before = c.log().clone();
    let err = c.load_from(&store).unwrap_err();
    assert!(matches!(err, Error::NotFound { ref name } if name == "lonely"));
    assert_eq!(c.log(), &before);
}

#[test]
fn saving_under_another_name() {
    let dir = TempDir::new().unwrap();
    let store = FsHistoryStore::new(dir.path());
    let c = stepped("a", &[0.1]);
    c.save_as(&store, "archive").unwrap();
    assert!(store.exists("archive"));
    assert!(!store.exists("a"));
}

#[test]
fn resumed_controller_continues_where_it_stopped() {
    let dir = TempDir::new().unwrap();
    let store = FsHistoryStore::new(dir.path().join("nested/history"));
    let first = stepped("ch", &[0.1, 0.13, 0.17, 0.21, 0.26]);
    first.save_to(&store).unwrap();

    let mut second = Controller::new("ch", &ControllerConfig::with_setpoint(0.45)).unwrap();
    second.load_from(&store).unwrap();
    assert!(!second.ever_updated());
    assert_eq!(second.last_known_od(), 0.26);
    assert_eq!(second.k_estimate(), first.k_estimate());

    let out = second.step(Some(900.0), Some(0.3), None);
    assert_eq!(out, first.last_known_output());
    let times = second.scrape(StateField::UpdateTime, f64::NAN);
    assert_eq!(times.len(), 6);
    assert!(times.windows(2).all(|w| w[1] >= w[0]));
}

#[test]
fn reads_history_written_by_older_tools() {
    // Absent fields are simply omitted; the seed has no output or delta.
    let text = r#"[
        {"update_time": 1600000000.0, "od": 1e-06, "k_estimate": 0.5},
        {"update_time": 1600000900.0, "od": 0.21, "delta_time": 900.0, "output": 0.0, "k_estimate": 0.5},
        {"update_time": 1600001800.0, "od": 0.25, "delta_time": 900.0, "output": 0.31, "k_estimate": 0.52}
    ]"#;
    let dir = TempDir::new().unwrap();
    let store = FsHistoryStore::new(dir.path());
    fs::write(store.path_for("legacy"), text).unwrap();

    let log = store.load("legacy").unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log.seed().output, None);
    assert_eq!(log.last().k_estimate, Some(0.52));

    let mut c = Controller::new("legacy", &ControllerConfig::with_setpoint(0.45)).unwrap();
    c.load_from(&store).unwrap();
    assert_eq!(c.k_estimate(), 0.52);
    assert_eq!(c.last_known_output(), 0.31);
}

#[test]
fn written_files_omit_absent_fields() {
    let dir = TempDir::new().unwrap();
    let store = FsHistoryStore::new(dir.path());
    stepped("fmt", &[]).save_to(&store).unwrap();
    let text = fs::read_to_string(store.path_for("fmt")).unwrap();
    assert!(text.contains("update_time"));
    assert!(!text.contains("delta_time"));
    assert!(!text.contains("null"));
}

#[test]
fn time_reversed_history_is_corrupted() {
    let text = r#"[{"update_time": 10.0, "od": 0.1}, {"update_time": 5.0, "od": 0.2, "delta_time": 0.0, "output": 0.1, "k_estimate": 0.5}]"#;
    assert!(HistoryLog::from_json(text.as_bytes()).is_err());

    let dir = TempDir::new().unwrap();
    let store = FsHistoryStore::new(dir.path());
    fs::write(store.path_for("bad"), text).unwrap();
    assert!(matches!(store.load("bad"), Err(Error::Corrupted { .. })));
}

#[test]
fn extreme_reading_survives_a_disk_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = FsHistoryStore::new(dir.path());
    let mut c = stepped("spike", &[0.3]);
    let out = c.step(Some(900.0), Some(1e308), None);
    assert!(out.is_finite());
    c.save_to(&store).unwrap();
    assert!(!fs::read_to_string(store.path_for("spike")).unwrap().contains("null"));

    let mut restored = Controller::new("spike", &ControllerConfig::with_setpoint(0.45)).unwrap();
    restored.load_from(&store).unwrap();
    assert_eq!(restored.log(), c.log());
    assert_eq!(restored.last_known_output(), out);
}
