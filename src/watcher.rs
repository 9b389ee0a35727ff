use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Error, Result};
use async_trait::async_trait;
use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Result as NotifyResult, Watcher};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::warn;

/// Something that can be hot-reloaded when its file changes on disk.
#[async_trait]
pub trait WatchedType: Send + Sync + 'static {
    fn is_relevant(&self, path: &Path) -> bool;
    async fn on_modify(&self, path: &Path) -> Result<()>;
}

/// Watch a single file and call back on create/modify events. The parent
/// directory is watched so editors that replace the file are seen too.
pub async fn watch_path(
    path: PathBuf,
    watched: Arc<dyn WatchedType>,
) -> Result<JoinHandle<()>, Error> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<NotifyResult<Event>>();

    if !path.exists() {
        let error = format!("file {} to watch does not exist", path.display());
        warn!(error);
        bail!(error);
    }
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let handle: JoinHandle<()> = tokio::spawn(async move {
        // create & watch inside the task so the watcher lives with it
        let mut watcher = PollWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .expect("failed to create watcher");
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .expect("failed to watch dir");

        while let Some(res) = rx.recv().await {
            match res {
                Ok(Event {
                    kind: EventKind::Create(_) | EventKind::Modify(_),
                    paths,
                    ..
                }) => {
                    for changed in paths {
                        if watched.is_relevant(&changed) {
                            if let Err(e) = watched.on_modify(&changed).await {
                                warn!(?changed, ?e, "failed to handle modification");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(?e, "watcher error");
                }
                _ => {}
            }
        }
    });

    Ok(handle)
}
