//! Hot-reload watcher for skill roots.
//!
//! Any filesystem change under a skill root invalidates the engine's cached
//! snapshot after a debounce window. In-flight turns keep the snapshot
//! reference they captured; only the next reader sees the rebuilt set.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::engine::SkillsEngine;

/// Callback invoked with the changed paths after each debounce window.
pub type ChangeCallback = Box<dyn Fn(Vec<PathBuf>) + Send + Sync>;

/// Watches skill roots and invalidates the engine snapshot on change.
pub struct SkillWatcher {
    stop: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl SkillWatcher {
    /// Start watching the engine's roots. `on_change` (optional) fires after
    /// the snapshot has been invalidated.
    pub fn spawn(
        engine: Arc<SkillsEngine>,
        on_change: Option<ChangeCallback>,
    ) -> notify::Result<Self> {
        let debounce = Duration::from_millis(engine.config().watch_debounce_ms);
        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
                Err(e) => error!(error = %e, "skill watcher error"),
            })?;

        for root in engine.watch_roots() {
            watcher.watch(&root, RecursiveMode::Recursive)?;
        }

        let stop = CancellationToken::new();
        let task = tokio::spawn(watch_loop(
            engine,
            watcher,
            rx,
            debounce,
            stop.clone(),
            on_change,
        ));

        Ok(Self { stop, task })
    }

    /// Stop watching and wait for the background task to exit.
    pub async fn shutdown(self) {
        self.stop.cancel();
        let _ = self.task.await;
    }
}

async fn watch_loop(
    engine: Arc<SkillsEngine>,
    _watcher: RecommendedWatcher,
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    debounce: Duration,
    stop: CancellationToken,
    on_change: Option<ChangeCallback>,
) {
    loop {
        let first = tokio::select! {
            _ = stop.cancelled() => break,
            path = rx.recv() => match path {
                Some(p) => p,
                None => break,
            },
        };

        // Collect further events until the window goes quiet.
        let mut changed = vec![first];
        loop {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(Some(path)) => changed.push(path),
                Ok(None) | Err(_) => break,
            }
        }

        engine.invalidate();
        debug!(paths = changed.len(), "skill root changed, snapshot invalidated");
        if let Some(callback) = &on_change {
            callback(changed);
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
