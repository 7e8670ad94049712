use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::limiter::RateLimiter;

pub const APP_NAME: &str = "CheckMessage";
const APP_AUTHOR: &str = "AliceDTRH";

/// Default feed server.
pub const DEFAULT_ENDPOINT: &str = "https://ntfy.sh";
/// Default per-read timeout on the feed body.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(80);

const SENTINEL_FILE: &str = ".quiet";
const MESSAGES_FILE: &str = "messages";
const DATABASE_FILE: &str = "state.db";

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the feed server, without a trailing slash.
    pub endpoint: String,
    /// Feed (topic) identifier.
    pub feed_id: String,
    pub paths: StatePaths,
    pub read_timeout: Duration,
    /// Program and arguments that play the alarm sound once.
    pub alarm_command: Vec<String>,
    /// Program used to show a desktop notification.
    pub notify_command: PathBuf,
    pub limits: Limits,
}

impl AgentConfig {
    pub fn new(endpoint: impl Into<String>, feed_id: impl Into<String>, state_dir: PathBuf) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            feed_id: feed_id.into(),
            paths: StatePaths::new(state_dir),
            read_timeout: DEFAULT_READ_TIMEOUT,
            alarm_command: default_alarm_command(),
            notify_command: PathBuf::from("/usr/bin/notify-send"),
            limits: Limits::default(),
        }
    }

    /// `{endpoint}/{id}/json[?since={cursor}]`
    pub fn feed_url(&self, since: Option<i64>) -> String {
        match since {
            Some(since) => format!("{}/{}/json?since={}", self.endpoint, self.feed_id, since),
            None => format!("{}/{}/json", self.endpoint, self.feed_id),
        }
    }
}

pub fn default_alarm_command() -> Vec<String> {
    vec![
        "/usr/bin/mpv".to_string(),
        "/usr/share/sounds/freedesktop/stereo/dialog-warning.oga".to_string(),
        "--volume=200".to_string(),
    ]
}

/// Per-user state directory, e.g. `~/.local/state/CheckMessage` on Linux.
pub fn default_state_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", APP_AUTHOR, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("Could not determine state directory"))?;
    Ok(dirs
        .state_dir()
        .unwrap_or_else(|| dirs.data_local_dir())
        .to_path_buf())
}

/// Files kept in the state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    dir: PathBuf,
}

impl StatePaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the sentinel file within [`StatePaths::dir`].
    pub fn sentinel_name(&self) -> &'static str {
        SENTINEL_FILE
    }

    pub fn sentinel(&self) -> PathBuf {
        self.dir.join(SENTINEL_FILE)
    }

    pub fn messages(&self) -> PathBuf {
        self.dir.join(MESSAGES_FILE)
    }

    pub fn database(&self) -> PathBuf {
        self.dir.join(DATABASE_FILE)
    }

    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory {}", self.dir.display()))
    }
}

/// A cap of `max_calls` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub max_calls: u32,
    pub window: Duration,
}

impl Limit {
    pub const fn per_30s(max_calls: u32) -> Self {
        Self {
            max_calls,
            window: Duration::from_secs(30),
        }
    }

    pub fn limiter(&self, name: &'static str) -> RateLimiter {
        RateLimiter::new(name, self.max_calls, self.window)
    }
}

/// Relaunch caps for each externally triggered operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub feed_read: Limit,
    pub control: Limit,
    pub dispatch: Limit,
    /// Re-opening the feed after the server closed it.
    pub reconnect: Limit,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            feed_read: Limit::per_30s(2),
            control: Limit::per_30s(1),
            dispatch: Limit::per_30s(2),
            reconnect: Limit::per_30s(2),
        }
    }
}
