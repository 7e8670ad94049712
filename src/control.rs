//! Sentinel watcher: the only control input.
//!
//! Creating `.quiet` in the state directory silences an active alarm. Each
//! [`ControlChannel::watch_once`] call arms a fresh watch, waits for one
//! sentinel, consumes it, and returns. The caller re-arms it.

use std::ffi::OsStr;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::alert::AlertState;
use crate::config::StatePaths;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Watcher reported an error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Watcher stopped delivering events")]
    ChannelClosed,
}

/// Watches the state directory for the sentinel file.
#[derive(Clone)]
pub struct ControlChannel {
    paths: StatePaths,
    alert: Arc<AlertState>,
}

impl ControlChannel {
    pub fn new(paths: StatePaths, alert: Arc<AlertState>) -> Self {
        Self { paths, alert }
    }

    /// Block until the sentinel is created, then silence the alarm.
    ///
    /// The watch handle lives only for this call and is released on every
    /// return path. A sentinel that appeared while no watch was armed is
    /// consumed as soon as the watch is up.
    ///
    /// Watcher failures surface as [`ControlError`]. Any other error comes
    /// from silencing the alarm itself.
    pub async fn watch_once(&self) -> Result<()> {
        tracing::debug!("Started file checking.");
        let dir = self.paths.dir();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // Receiver gone means watch_once already returned
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(ControlError::from)?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| ControlError::Watch {
                path: dir.to_path_buf(),
                source,
            })?;

        if self.paths.sentinel().exists() {
            tracing::info!("Quiet file present when watch started");
            return self.consume();
        }

        while let Some(res) = rx.recv().await {
            let event = res.map_err(ControlError::from)?;
            if self.is_sentinel_creation(&event) {
                return self.consume();
            }
            tracing::trace!(?event, "Ignoring state directory event");
        }

        Err(ControlError::ChannelClosed.into())
    }

    fn is_sentinel_creation(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(OsStr::new(self.paths.sentinel_name())))
    }

    fn consume(&self) -> Result<()> {
        self.alert.disable()?;
        let sentinel = self.paths.sentinel();
        match std::fs::remove_file(&sentinel) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", sentinel.display())),
        }
    }
}
