//! Lifecycle controller wiring the notifier, capture stage, and process
//! stage together.
//!
//! Owns the two worker threads and their queues; nothing else may touch
//! them. Startup optionally drains the existing directory contents through
//! the same capture-then-process contract before live events are admitted,
//! so the first live notification reflects only truly new changes.
//! Shutdown drains both stages in order via tagged stop sentinels; nothing
//! queued is ever dropped silently on a clean stop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};
use walkdir::WalkDir;

use chronicler_extract_protocol::{DataPoint, SaveExtractor, SAVE_EXTENSION};

use crate::capture::{is_watch_target, CaptureStage, SnapshotTask};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::points;
use crate::process::ProcessStage;
use crate::state::SignatureStore;
use crate::stats::{BacklogSnapshot, RunStats, StatsRegistry};
use crate::storage::StorageConfig;

const JOIN_POLL: Duration = Duration::from_millis(50);
const TEARDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The change-notification collaborator. Implementations call the sink
/// with a raw path whenever something under `watch_dir` is created,
/// modified, or moved; duplicate, out-of-order, and spurious calls are
/// all tolerated downstream.
pub trait ChangeNotifier: Send {
    fn start(
        &mut self,
        watch_dir: &Path,
        sink: Box<dyn Fn(PathBuf) + Send>,
    ) -> std::result::Result<(), String>;

    fn stop(&mut self);
}

enum CaptureMessage {
    Notify(PathBuf),
    Stop,
}

enum ProcessMessage {
    Task(SnapshotTask),
    Stop,
}

/// Monitors a save directory for changes and drives captured snapshots
/// through serialized processing.
pub struct SaveMonitor {
    save_directory: PathBuf,
    storage: StorageConfig,
    config: MonitorConfig,
    store: Arc<SignatureStore>,
    stats: Arc<StatsRegistry>,
    notifier: Box<dyn ChangeNotifier>,
    running: Arc<AtomicBool>,
    event_tx: Option<Sender<CaptureMessage>>,
    process_tx: Option<Sender<ProcessMessage>>,
    event_depth: Arc<AtomicUsize>,
    process_depth: Arc<AtomicUsize>,
    capture_worker: Option<JoinHandle<()>>,
    process_worker: Option<JoinHandle<()>>,
}

impl SaveMonitor {
    /// Creates a monitor over `save_directory`, loading persisted dedup
    /// state from the storage root (which is created if missing).
    pub fn new(
        save_directory: impl Into<PathBuf>,
        storage: StorageConfig,
        config: MonitorConfig,
        notifier: Box<dyn ChangeNotifier>,
    ) -> Result<Self> {
        storage
            .ensure_dirs()
            .map_err(|err| MonitorError::io("create storage directories", err))?;
        let store = Arc::new(SignatureStore::load(&storage.state_file()));

        Ok(Self {
            save_directory: save_directory.into(),
            storage,
            config,
            store,
            stats: Arc::new(StatsRegistry::default()),
            notifier,
            running: Arc::new(AtomicBool::new(false)),
            event_tx: None,
            process_tx: None,
            event_depth: Arc::new(AtomicUsize::new(0)),
            process_depth: Arc::new(AtomicUsize::new(0)),
            capture_worker: None,
            process_worker: None,
        })
    }

    /// Starts event-driven monitoring. When `process_existing` is set,
    /// every file currently in the directory is first run through the
    /// pipeline synchronously, in ascending modification-time order.
    /// Returns the number of data points stored during that pass.
    pub fn start(
        &mut self,
        extractor: Arc<dyn SaveExtractor>,
        process_existing: bool,
    ) -> Result<usize> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(0);
        }
        if !self.save_directory.exists() {
            return Err(MonitorError::SaveDirNotFound(self.save_directory.clone()));
        }

        self.stats.reset();
        self.event_depth.store(0, Ordering::SeqCst);
        self.process_depth.store(0, Ordering::SeqCst);

        let capture_stage = Arc::new(CaptureStage::new(
            self.save_directory.clone(),
            self.storage.clone(),
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
        ));
        let process_stage = Arc::new(ProcessStage::new(
            self.storage.clone(),
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
            extractor,
        ));

        let mut startup_count = 0;
        if process_existing {
            startup_count = self.process_backlog(&capture_stage, &process_stage);
        }

        let (event_tx, event_rx) = mpsc::channel::<CaptureMessage>();
        let (process_tx, process_rx) = mpsc::channel::<ProcessMessage>();

        self.running.store(true, Ordering::SeqCst);

        self.capture_worker = Some(spawn_capture_worker(
            Arc::clone(&capture_stage),
            event_rx,
            Arc::clone(&self.event_depth),
            process_tx.clone(),
            Arc::clone(&self.process_depth),
            self.config.queue_poll(),
        ));
        self.process_worker = Some(spawn_process_worker(
            Arc::clone(&process_stage),
            process_rx,
            Arc::clone(&self.process_depth),
            self.config.queue_poll(),
        ));

        self.event_tx = Some(event_tx.clone());
        self.process_tx = Some(process_tx);

        let sink = self.event_sink(event_tx);
        if let Err(details) = self.notifier.start(&self.save_directory, sink) {
            self.teardown_after_failed_start();
            return Err(MonitorError::NotifierUnavailable { details });
        }

        info!(
            directory = %self.save_directory.display(),
            startup_count,
            "Started monitoring save directory"
        );
        Ok(startup_count)
    }

    /// Stops monitoring, draining both stages in order: the notifier is
    /// unregistered first, then every queued notification is captured,
    /// then every captured snapshot is processed.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.stop();

        if let Some(event_tx) = self.event_tx.take() {
            let _ = event_tx.send(CaptureMessage::Stop);
        }
        if let Some(worker) = self.capture_worker.take() {
            if !join_with_timeout(worker, self.config.capture_join_timeout()) {
                warn!("Capture worker did not stop cleanly within timeout");
            }
        }

        if let Some(process_tx) = self.process_tx.take() {
            let _ = process_tx.send(ProcessMessage::Stop);
        }
        if let Some(worker) = self.process_worker.take() {
            if !join_with_timeout(worker, self.config.process_join_timeout()) {
                warn!("Process worker did not stop cleanly within timeout");
            }
        }
    }

    /// Admits a raw change notification into the pipeline. Called by the
    /// registered notifier; also usable directly by embedding callers.
    pub fn enqueue_event(&self, path: PathBuf) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        if !is_watch_target(&path, &self.save_directory) {
            return;
        }
        if let Some(event_tx) = &self.event_tx {
            self.event_depth.fetch_add(1, Ordering::SeqCst);
            if event_tx.send(CaptureMessage::Notify(path)).is_err() {
                self.event_depth.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Counter snapshot for the current monitoring run.
    pub fn run_stats(&self) -> RunStats {
        self.stats.snapshot()
    }

    /// Queued work counts for status reporting.
    pub fn backlog(&self) -> BacklogSnapshot {
        BacklogSnapshot {
            event_queue: self.event_depth.load(Ordering::SeqCst),
            process_queue: self.process_depth.load(Ordering::SeqCst),
        }
    }

    /// Clears all dedup state and counters. Already-produced data points
    /// and archives are untouched.
    pub fn reset(&self) -> Result<()> {
        self.store.reset()?;
        self.stats.reset();
        info!("Monitoring state reset");
        Ok(())
    }

    /// All save files currently in the watched directory, ascending by
    /// modification time.
    pub fn save_files(&self) -> Vec<PathBuf> {
        if !self.save_directory.exists() {
            warn!(
                directory = %self.save_directory.display(),
                "Save directory not found"
            );
            return Vec::new();
        }

        let mut files: Vec<(std::time::SystemTime, PathBuf)> = WalkDir::new(&self.save_directory)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(SAVE_EXTENSION))
                    .unwrap_or(false)
            })
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((modified, entry.into_path()))
            })
            .collect();
        files.sort();
        files.into_iter().map(|(_, path)| path).collect()
    }

    /// All playthroughs with recorded data points.
    pub fn playthroughs(&self) -> Vec<String> {
        points::list_playthroughs(&self.storage)
    }

    /// All data points recorded for one playthrough, in capture order.
    pub fn playthrough_points(&self, playthrough_id: &str) -> Vec<DataPoint> {
        points::load_playthrough_points(&self.storage, playthrough_id)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One-shot synchronous pass over the directory's current contents,
    /// without registering the notifier. Resets the run stats first.
    /// Returns the number of data points stored.
    pub fn process_existing_saves(&self, extractor: Arc<dyn SaveExtractor>) -> Result<usize> {
        if !self.save_directory.exists() {
            return Err(MonitorError::SaveDirNotFound(self.save_directory.clone()));
        }
        self.stats.reset();

        let capture_stage = Arc::new(CaptureStage::new(
            self.save_directory.clone(),
            self.storage.clone(),
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
        ));
        let process_stage = Arc::new(ProcessStage::new(
            self.storage.clone(),
            self.config.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.stats),
            extractor,
        ));
        Ok(self.process_backlog(&capture_stage, &process_stage))
    }

    /// Synchronous startup pass over the directory's current contents,
    /// using the exact same capture-then-process contract as live events.
    fn process_backlog(
        &self,
        capture_stage: &Arc<CaptureStage>,
        process_stage: &Arc<ProcessStage>,
    ) -> usize {
        let save_files = self.save_files();
        if !save_files.is_empty() {
            info!(count = save_files.len(), "Evaluating existing save files");
        }

        let mut processed = 0;
        for save_file in save_files {
            let Some(task) = capture_stage.capture(&save_file, "startup_scan") else {
                continue;
            };
            if process_stage.process(&task, "startup_scan") {
                processed += 1;
            }
        }
        processed
    }

    fn event_sink(&self, event_tx: Sender<CaptureMessage>) -> Box<dyn Fn(PathBuf) + Send> {
        let running = Arc::clone(&self.running);
        let event_depth = Arc::clone(&self.event_depth);
        let watch_dir = self.save_directory.clone();
        Box::new(move |path: PathBuf| {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            if !is_watch_target(&path, &watch_dir) {
                return;
            }
            event_depth.fetch_add(1, Ordering::SeqCst);
            if event_tx.send(CaptureMessage::Notify(path)).is_err() {
                event_depth.fetch_sub(1, Ordering::SeqCst);
            }
        })
    }

    /// Winds freshly spawned workers back down when notifier registration
    /// fails, so a failed `start` leaves no threads behind.
    fn teardown_after_failed_start(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(event_tx) = self.event_tx.take() {
            let _ = event_tx.send(CaptureMessage::Stop);
        }
        if let Some(worker) = self.capture_worker.take() {
            let _ = join_with_timeout(worker, TEARDOWN_JOIN_TIMEOUT);
        }
        if let Some(process_tx) = self.process_tx.take() {
            let _ = process_tx.send(ProcessMessage::Stop);
        }
        if let Some(worker) = self.process_worker.take() {
            let _ = join_with_timeout(worker, TEARDOWN_JOIN_TIMEOUT);
        }
    }
}

fn spawn_capture_worker(
    stage: Arc<CaptureStage>,
    event_rx: Receiver<CaptureMessage>,
    event_depth: Arc<AtomicUsize>,
    process_tx: Sender<ProcessMessage>,
    process_depth: Arc<AtomicUsize>,
    queue_poll: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match event_rx.recv_timeout(queue_poll) {
            Ok(CaptureMessage::Notify(path)) => {
                event_depth.fetch_sub(1, Ordering::SeqCst);
                if let Some(task) = stage.capture(&path, "file_event") {
                    process_depth.fetch_add(1, Ordering::SeqCst);
                    if process_tx.send(ProcessMessage::Task(task)).is_err() {
                        process_depth.fetch_sub(1, Ordering::SeqCst);
                        warn!("Process queue is gone; dropping captured snapshot");
                    }
                }
            }
            Ok(CaptureMessage::Stop) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    })
}

fn spawn_process_worker(
    stage: Arc<ProcessStage>,
    process_rx: Receiver<ProcessMessage>,
    process_depth: Arc<AtomicUsize>,
    queue_poll: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match process_rx.recv_timeout(queue_poll) {
            Ok(ProcessMessage::Task(task)) => {
                process_depth.fetch_sub(1, Ordering::SeqCst);
                stage.process(&task, "file_event");
            }
            Ok(ProcessMessage::Stop) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    })
}

/// Joins a worker, bounded by `timeout`. Returns false when the worker
/// was still alive at the deadline (it is left detached, never killed).
fn join_with_timeout(worker: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if worker.is_finished() {
            let _ = worker.join();
            return true;
        }
        thread::sleep(JOIN_POLL);
    }
    false
}
