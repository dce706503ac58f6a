//! notify-backed change notifier.
//!
//! Forwards raw create/modify/move paths into the pipeline; filtering and
//! deduplication happen downstream, so this stays a dumb pipe.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

use chronicler_core::ChangeNotifier;

pub struct NotifyWatcher {
    watcher: Option<RecommendedWatcher>,
}

impl NotifyWatcher {
    pub fn new() -> Self {
        Self { watcher: None }
    }
}

impl ChangeNotifier for NotifyWatcher {
    fn start(
        &mut self,
        watch_dir: &Path,
        sink: Box<dyn Fn(PathBuf) + Send>,
    ) -> Result<(), String> {
        let mut watcher =
            notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(error = %err, "Watcher delivered an error event");
                        return;
                    }
                };
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        sink(path);
                    }
                }
            })
            .map_err(|err| format!("Failed to create watcher: {}", err))?;

        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .map_err(|err| format!("Failed to watch {}: {}", watch_dir.display(), err))?;

        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the watcher unregisters it; no more sink calls after this.
        self.watcher = None;
    }
}
