//! Hot reload: watch the rule file and swap snapshots atomically.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::loader::load_rules_file;
use crate::store::RuleStore;

/// Polling and debounce settings for the reload watcher.
#[derive(Clone, Copy, Debug)]
pub struct WatcherConfig {
    poll_interval: Duration,
    debounce: Duration,
}

impl WatcherConfig {
    /// Creates a configuration with explicit intervals.
    #[must_use]
    pub const fn new(poll_interval: Duration, debounce: Duration) -> Self {
        Self {
            poll_interval,
            debounce,
        }
    }

    /// Returns the modification-time polling interval.
    #[must_use]
    pub const fn poll_interval(self) -> Duration {
        self.poll_interval
    }

    /// Returns the debounce window applied after a detected change.
    #[must_use]
    pub const fn debounce(self) -> Duration {
        self.debounce
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_millis(250))
    }
}

/// Background task that reloads the rule file when it changes.
///
/// Change detection is modification-time polling. Edits within the debounce
/// window coalesce into a single load. A failed load is recorded on the
/// store and the previous snapshot keeps serving; in-flight evaluations
/// always finish on the snapshot they started with.
#[derive(Debug)]
pub struct ReloadWatcher {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ReloadWatcher {
    /// Spawns the watcher over `path`, installing successful loads into
    /// `store`.
    #[must_use]
    pub fn spawn(store: Arc<RuleStore>, path: PathBuf, config: WatcherConfig) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut last_seen = modified_at(&path).await;
            let mut ticker = tokio::time::interval(config.poll_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => {
                        debug!(path = %path.display(), "reload watcher shutting down");
                        return;
                    }
                }

                let current = modified_at(&path).await;
                if current == last_seen {
                    continue;
                }

                // Let a burst of writes settle, then load once.
                tokio::time::sleep(config.debounce()).await;
                last_seen = modified_at(&path).await;

                match load_rules_file(&path).await {
                    Ok(rules) => {
                        info!(path = %path.display(), rules = rules.len(), "rule file reloaded");
                        store.install(rules);
                    }
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "rule reload failed; previous snapshot retained"
                        );
                        store.record_load_failure(err.to_string());
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Stops the watcher and waits for the task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

async fn modified_at(path: &PathBuf) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|meta| meta.modified())
        .ok()
}
