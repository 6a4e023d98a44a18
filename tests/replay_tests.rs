use std::io::Write;
use std::sync::Arc;

use tempfile::{tempdir, Builder};
use trackrs::config::AppConfig;
use trackrs::database::{ActivityStore, Database};
use trackrs::export::{export_activity, ExportFormat};
use trackrs::heart_rate::HeartRateSimulator;
use trackrs::import::{replay::ReplayProvider, ImportManager};
use trackrs::session::{Clock, ManualClock};
use trackrs::tracker::{ActivityTracker, TrackerEvent};
use trackrs::{RejectReason, SampleOutcome, StoredActivity};

/// End-to-end replays of recorded tracks into a SQLite history

const START_MS: i64 = 1_714_543_200_000;

/// Track heading east along the equator, ~11 m per 5 s, with one
/// inaccurate fix and one spurious jump
fn write_csv_track() -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "time,lat,lon,alt,accuracy").unwrap();
    for i in 0..60i64 {
        let lon = i as f64 * 0.0001;
        let (lon, acc) = match i {
            20 => (lon, 35.0),
            40 => (lon + 0.01, 5.0),
            _ => (lon, 5.0),
        };
        let alt = if i < 30 { i as f64 } else { 59.0 - i as f64 };
        writeln!(file, "{},0.0,{},{},{}", START_MS + i * 5_000, lon, alt, acc).unwrap();
    }
    file
}

#[tokio::test(start_paused = true)]
async fn test_replay_csv_into_database() {
    let dir = tempdir().unwrap();
    let mut config = AppConfig::default();
    config.settings.data_dir = dir.path().to_path_buf();

    let track_file = write_csv_track();
    let track = ImportManager::new().import_track(track_file.path()).unwrap();
    assert_eq!(track.len(), 60);

    let clock = ManualClock::new(START_MS);
    let provider = ReplayProvider::new(track, 10.0).with_clock(clock.clone());
    let db = Database::new(config.database_path()).unwrap();

    let mut tracker = ActivityTracker::new(provider, db, Arc::new(clock.clone()), &config)
        .with_heart_rate_source(Box::new(HeartRateSimulator::with_seed(42)));
    tracker.start().unwrap();

    let mut low_accuracy = 0;
    let mut jumps = 0;
    let mut heart_rates = 0;
    while let Some(event) = tracker.next_event().await {
        match event {
            TrackerEvent::Sample {
                outcome: SampleOutcome::Rejected(reason),
                ..
            } => match reason {
                RejectReason::LowAccuracy { .. } => low_accuracy += 1,
                RejectReason::ImplausibleJump { .. } => jumps += 1,
                other => panic!("unexpected rejection {:?}", other),
            },
            TrackerEvent::HeartRate(_) => heart_rates += 1,
            TrackerEvent::LocationClosed => break,
            _ => {}
        }
    }

    assert_eq!(low_accuracy, 1);
    assert_eq!(jumps, 1);
    // 295 s of recording at 10x, heart rate every 2 s of runtime
    assert!(heart_rates >= 10);
    assert_eq!(clock.now_ms(), START_MS + 59 * 5_000);

    let finished = tracker.stop().unwrap();
    let id = finished.id.clone().unwrap();
    let activity = &finished.activity;

    assert_eq!(activity.path.len(), 58);
    assert_eq!(activity.duration_ms, 59 * 5_000);
    assert_eq!(activity.elevation_gain_meters, 29.0);
    assert!(activity.distance_meters > 600.0 && activity.distance_meters < 700.0);
    assert!(activity
        .heart_rate_samples
        .iter()
        .all(|bpm| (120..=180).contains(bpm)));

    // Reopen to make sure the write reached the file
    drop(tracker);
    let db = Database::new(config.database_path()).unwrap();
    let history = db.list_activities(None).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, id);
    assert_eq!(&history[0].activity, activity);

    let json_path = dir.path().join("activity.json");
    export_activity(&history[0], ExportFormat::Json, &json_path).unwrap();
    let exported: StoredActivity =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(exported, history[0]);
}

#[tokio::test(start_paused = true)]
async fn test_replay_gpx_without_timestamps() {
    let mut file = Builder::new().suffix(".gpx").tempfile().unwrap();
    write!(
        file,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="trackrs-tests" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><trkseg>
    <trkpt lat="10.0" lon="20.0"/>
    <trkpt lat="10.0" lon="20.0002"/>
    <trkpt lat="10.0" lon="20.0004"/>
  </trkseg></trk>
</gpx>"#
    )
    .unwrap();

    let track = ImportManager::new().import_track(file.path()).unwrap();
    let clock = ManualClock::new(START_MS);
    let provider = ReplayProvider::new(track, 1.0).with_clock(clock.clone());
    let dir = tempdir().unwrap();
    let db = Database::new(dir.path().join("history.db")).unwrap();
    let mut tracker = ActivityTracker::new(provider, db, Arc::new(clock.clone()), &AppConfig::default());
    tracker.start().unwrap();

    let mut stamps = Vec::new();
    while let Some(event) = tracker.next_event().await {
        match event {
            TrackerEvent::Sample { sample, outcome } => {
                assert!(outcome.is_admitted());
                stamps.push(sample.timestamp);
            }
            TrackerEvent::LocationClosed => break,
            _ => {}
        }
    }

    // Untimed fixes are stamped with the session clock on arrival
    assert_eq!(stamps, vec![START_MS; 3]);
    let finished = tracker.stop().unwrap();
    assert_eq!(finished.activity.path.len(), 3);
    assert!(finished.id.is_some());
}
