//! End-to-end pipeline tests: event queueing, slot-reuse races, duplicate
//! handling, and shutdown draining.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::{tempdir, TempDir};

use chronicler_core::{
    ChangeNotifier, DataPoint, ExtractError, MonitorConfig, SaveExtractor, SaveMonitor,
    StorageConfig,
};

struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn start(
        &mut self,
        _watch_dir: &Path,
        _sink: Box<dyn Fn(PathBuf) + Send>,
    ) -> Result<(), String> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Parses `day=N` save bodies, records every day it sees, and stalls on
/// day 1 so tests can race a slot rewrite against processing.
struct DayExtractor {
    processed_days: Arc<Mutex<Vec<i64>>>,
    first_started: Arc<AtomicBool>,
    stall_on_day_one: bool,
}

impl DayExtractor {
    fn new(stall_on_day_one: bool) -> Self {
        Self {
            processed_days: Arc::new(Mutex::new(Vec::new())),
            first_started: Arc::new(AtomicBool::new(false)),
            stall_on_day_one,
        }
    }
}

impl SaveExtractor for DayExtractor {
    fn extract(&self, save_file: &Path, _playthrough_id: &str) -> Result<DataPoint, ExtractError> {
        let content = fs::read_to_string(save_file)
            .map_err(|err| ExtractError::Failed(err.to_string()))?;
        let day: i64 = content
            .trim()
            .strip_prefix("day=")
            .map(|rest| {
                rest.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
            })
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| ExtractError::UnsupportedFormat("missing day marker".to_string()))?;

        self.processed_days.lock().expect("days lock").push(day);
        if day == 1 {
            self.first_started.store(true, Ordering::SeqCst);
            if self.stall_on_day_one {
                thread::sleep(Duration::from_millis(800));
            }
        }

        let mut point = DataPoint::default();
        point.metadata.game_day = Some(day);
        Ok(point)
    }
}

struct Fixture {
    _temp: TempDir,
    save_dir: PathBuf,
    storage: StorageConfig,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempdir().expect("temp dir");
        let save_dir = temp.path().join("saves");
        fs::create_dir_all(&save_dir).expect("save dir");
        let storage = StorageConfig::with_root(temp.path().join("data"));
        Self {
            _temp: temp,
            save_dir,
            storage,
        }
    }

    fn monitor(&self) -> SaveMonitor {
        SaveMonitor::new(
            self.save_dir.clone(),
            self.storage.clone(),
            fast_config(),
            Box::new(NullNotifier),
        )
        .expect("monitor")
    }
}

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        debounce_seconds: 0.0,
        poll_interval_ms: 20,
        stabilization_timeout_seconds: 5.0,
        queue_poll_ms: 50,
        io_retries: 3,
        io_retry_delay_ms: 10,
        ..MonitorConfig::default()
    }
}

fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    false
}

#[test]
fn same_slot_rewrite_while_processing_is_busy() {
    let fixture = Fixture::new();
    let mut monitor = fixture.monitor();

    let extractor = Arc::new(DayExtractor::new(true));
    let processed_days = Arc::clone(&extractor.processed_days);
    let first_started = Arc::clone(&extractor.first_started);

    monitor.start(extractor, false).expect("start");

    let slot = fixture.save_dir.join("Belgium_autosave.v3");
    fs::write(&slot, "day=1").expect("write slot");
    monitor.enqueue_event(slot.clone());

    assert!(
        wait_until(Duration::from_secs(5), || first_started
            .load(Ordering::SeqCst)),
        "first snapshot never reached the extractor"
    );

    // The first version was moved into quarantine, so the writer can
    // reuse the slot while processing is still busy with version one.
    fs::write(&slot, "day=2").expect("rewrite slot");
    monitor.enqueue_event(slot.clone());

    assert!(
        wait_until(Duration::from_secs(10), || monitor.run_stats().processed >= 2),
        "second snapshot was never processed: {:?}",
        monitor.run_stats()
    );

    monitor.stop();

    let stats = monitor.run_stats();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.captured, 2);

    let mut days = processed_days.lock().expect("days lock").clone();
    days.sort_unstable();
    assert_eq!(days, vec![1, 2]);
}

#[test]
fn duplicate_event_burst_is_captured_once() {
    let fixture = Fixture::new();
    let mut monitor = fixture.monitor();

    monitor
        .start(Arc::new(DayExtractor::new(false)), false)
        .expect("start");

    let manual = fixture.save_dir.join("manual_save.v3");
    fs::write(&manual, "day=10").expect("write");

    monitor.enqueue_event(manual.clone());
    monitor.enqueue_event(manual.clone());
    monitor.enqueue_event(manual.clone());

    assert!(
        wait_until(Duration::from_secs(10), || {
            let stats = monitor.run_stats();
            stats.captured == 1 && stats.event_duplicate_skipped == 2 && stats.processed == 1
        }),
        "burst did not settle to one capture: {:?}",
        monitor.run_stats()
    );

    monitor.stop();

    assert_eq!(monitor.playthrough_points("manual_save").len(), 1);
}

#[test]
fn same_game_day_across_different_files_is_skipped() {
    let fixture = Fixture::new();
    let mut monitor = fixture.monitor();

    monitor
        .start(Arc::new(DayExtractor::new(false)), false)
        .expect("start");

    // Different content, same playthrough, same logical day.
    let first = fixture.save_dir.join("Belgium_1.v3");
    let second = fixture.save_dir.join("Belgium_2.v3");
    fs::write(&first, "day=5").expect("write");
    fs::write(&second, "day=5 again").expect("write");

    monitor.enqueue_event(first.clone());
    monitor.enqueue_event(second.clone());

    assert!(
        wait_until(Duration::from_secs(10), || {
            let stats = monitor.run_stats();
            stats.captured == 2 && stats.processed + stats.duplicate_skipped == 2
        }),
        "both snapshots should be accounted for: {:?}",
        monitor.run_stats()
    );

    monitor.stop();

    let stats = monitor.run_stats();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.duplicate_skipped, 1);
    assert_eq!(monitor.playthrough_points("Belgium").len(), 1);

    // Duplicates still leave quarantine for the archive.
    let queue_dir = fixture.storage.playthrough_queue_dir("Belgium");
    let leftover = fs::read_dir(&queue_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[test]
fn stop_drains_queued_notifications_before_exit() {
    let fixture = Fixture::new();
    let mut monitor = fixture.monitor();

    monitor
        .start(Arc::new(DayExtractor::new(false)), false)
        .expect("start");

    for (name, body) in [
        ("Belgium_1.v3", "day=1"),
        ("Prussia_1.v3", "day=2xx"),
        ("Sweden_1.v3", "day=3yyyy"),
    ] {
        let path = fixture.save_dir.join(name);
        fs::write(&path, body).expect("write");
        monitor.enqueue_event(path);
    }

    // Nothing has been captured yet; stop must still account for all
    // three notifications before returning.
    monitor.stop();

    let stats = monitor.run_stats();
    assert_eq!(stats.captured, 3);
    assert_eq!(
        stats.processed + stats.duplicate_skipped + stats.unsupported_format + stats.error,
        3
    );
    assert_eq!(stats.processed, 3);
}

#[test]
fn startup_pass_runs_existing_saves_through_the_pipeline() {
    let fixture = Fixture::new();

    let first = fixture.save_dir.join("Belgium_1.v3");
    fs::write(&first, "day=1").expect("write");
    thread::sleep(Duration::from_millis(30));
    let second = fixture.save_dir.join("Belgium_2.v3");
    fs::write(&second, "day=2xx").expect("write");

    let mut monitor = fixture.monitor();
    let extractor = Arc::new(DayExtractor::new(false));
    let processed_days = Arc::clone(&extractor.processed_days);

    let startup_count = monitor.start(extractor, true).expect("start");
    assert_eq!(startup_count, 2);
    assert_eq!(monitor.run_stats().processed, 2);
    // Ascending modification time: oldest save first.
    assert_eq!(processed_days.lock().expect("days lock").clone(), vec![1, 2]);

    // A live notification for an unchanged file is an event duplicate.
    monitor.enqueue_event(first.clone());
    assert!(
        wait_until(Duration::from_secs(5), || {
            monitor.run_stats().event_duplicate_skipped == 1
        }),
        "unchanged file should dedup: {:?}",
        monitor.run_stats()
    );

    monitor.stop();

    // A fresh monitor over the same storage remembers what it processed.
    let mut restarted = fixture.monitor();
    let startup_count = restarted
        .start(Arc::new(DayExtractor::new(false)), true)
        .expect("restart");
    assert_eq!(startup_count, 0);
    let stats = restarted.run_stats();
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.event_duplicate_skipped, 2);
    restarted.stop();
}
