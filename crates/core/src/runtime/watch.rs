use super::Workspace;
use crate::error::Result;
use crate::scanner::is_relevant_path;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEBOUNCE: Duration = Duration::from_millis(500);

struct FsWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl FsWatcher {
    fn new(root: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    async fn next_event_async(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await? {
                Ok(event) => return Some(event),
                Err(e) => tracing::warn!("Watcher error: {}", e),
            }
        }
    }
}

/// Source files, or anything that disappeared (a deleted folder takes its
/// files with it).
fn should_update(path: &Path) -> bool {
    is_relevant_path(path) || !path.exists()
}

impl Workspace {
    /// Watch the root for changes and feed them to [`Workspace::update_files`].
    /// The watcher task exits when `cancel_token` is cancelled or the
    /// workspace is dropped.
    pub async fn start_watch_with_token(
        self: Arc<Self>,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        let root = self.root.clone();
        let mut watcher = FsWatcher::new(&root)?;

        let workspace_weak = Arc::downgrade(&self);
        drop(self);

        tokio::spawn(async move {
            tracing::info!("Started watching {}", root.display());
            let mut pending_events: Vec<Event> = Vec::new();

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        break;
                    }
                    event = watcher.next_event_async() => {
                        match event {
                            Some(e) => pending_events.push(e),
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(DEBOUNCE), if !pending_events.is_empty() => {
                        let paths: HashSet<PathBuf> = pending_events
                            .drain(..)
                            .flat_map(|e| e.paths)
                            .filter(|p| should_update(p))
                            .collect();
                        if paths.is_empty() {
                            continue;
                        }

                        let Some(workspace) = workspace_weak.upgrade() else {
                            break;
                        };
                        let path_vec: Vec<_> = paths.into_iter().collect();
                        tracing::info!("Detected changes in {} files. Updating...", path_vec.len());
                        if let Err(err) = workspace.update_files(path_vec).await {
                            tracing::error!("Failed to update files: {}", err);
                        }
                    }
                }
            }
            tracing::info!("File watcher task ended for {}", root.display());
        });

        Ok(())
    }

    /// Watch using the workspace-wide cancellation token.
    pub async fn watch(self: Arc<Self>) -> Result<()> {
        let cancel_token = self.cancel_token.clone();
        self.start_watch_with_token(cancel_token).await
    }

    /// Stop background tasks started by [`Workspace::watch`].
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
