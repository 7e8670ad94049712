#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{stream, StreamExt};
use reqwest::StatusCode;
use tempfile::TempDir;

use feed_alarm::agent::{Agent, FeedSource};
use feed_alarm::alert::AlertState;
use feed_alarm::config::{Limit, Limits, StatePaths};
use feed_alarm::control::ControlChannel;
use feed_alarm::db::Store;
use feed_alarm::effects::AlarmEffects;
use feed_alarm::feed::{ByteStream, FeedError, FeedReader};
use feed_alarm::health::Health;
use feed_alarm::models::Urgency;

/// Records alarm plays and notifications. Optionally disables the alert
/// after a number of plays.
#[derive(Default)]
pub struct RecordingEffects {
    plays: AtomicUsize,
    notifications: Mutex<Vec<(String, Urgency, String)>>,
    silencer: Mutex<Option<(usize, Weak<AlertState>)>>,
}

impl RecordingEffects {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> Vec<(String, Urgency, String)> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn silence_after(&self, plays: usize, alert: &Arc<AlertState>) {
        *self.silencer.lock().unwrap() = Some((plays, Arc::downgrade(alert)));
    }
}

impl AlarmEffects for RecordingEffects {
    fn play_alarm(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let plays = self.plays.fetch_add(1, Ordering::SeqCst) + 1;
            let silencer = self.silencer.lock().unwrap().clone();
            if let Some((after, alert)) = silencer {
                if plays >= after {
                    if let Some(alert) = alert.upgrade() {
                        alert.disable().unwrap();
                    }
                }
            }
            tokio::task::yield_now().await;
        })
    }

    fn show_notification<'a>(
        &'a self,
        title: &'a str,
        urgency: Urgency,
        message: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.notifications
                .lock()
                .unwrap()
                .push((title.to_string(), urgency, message.to_string()));
        })
    }
}

#[derive(Default)]
pub struct RecordingHealth {
    pulses: AtomicUsize,
    readies: AtomicUsize,
    statuses: Mutex<Vec<String>>,
}

impl RecordingHealth {
    pub fn pulses(&self) -> usize {
        self.pulses.load(Ordering::SeqCst)
    }

    pub fn readies(&self) -> usize {
        self.readies.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }
}

impl Health for RecordingHealth {
    fn pulse(&self) {
        self.pulses.fetch_add(1, Ordering::SeqCst);
    }

    fn ready(&self) {
        self.readies.fetch_add(1, Ordering::SeqCst);
    }

    fn status(&self, msg: &str) {
        self.statuses.lock().unwrap().push(msg.to_string());
    }
}

/// One scripted response to `FeedSource::open`.
pub enum Script {
    /// Serve these chunks, then either end the body or stay open forever.
    Stream { chunks: Vec<String>, close: bool },
    Reject(StatusCode),
}

impl Script {
    /// Serve `lines`, then keep the body open.
    pub fn open_with(lines: Vec<String>) -> Self {
        Self::Stream {
            chunks: lines.into_iter().map(|l| l + "\n").collect(),
            close: false,
        }
    }

    /// Serve `lines`, then end the body.
    pub fn closing_with(lines: Vec<String>) -> Self {
        Self::Stream {
            chunks: lines.into_iter().map(|l| l + "\n").collect(),
            close: true,
        }
    }

    pub fn idle() -> Self {
        Self::open_with(Vec::new())
    }

    pub fn closed() -> Self {
        Self::closing_with(Vec::new())
    }
}

/// Feed source that replays scripts in order and records every resume
/// position it was opened with. Once the scripts run out it serves an idle
/// feed.
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
    opened: Mutex<Vec<Option<i64>>>,
    read_timeout: Duration,
}

impl ScriptedSource {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Self::with_read_timeout(scripts, Duration::from_secs(3600))
    }

    pub fn with_read_timeout(scripts: Vec<Script>, read_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            opened: Mutex::new(Vec::new()),
            read_timeout,
        })
    }

    pub fn opened(&self) -> Vec<Option<i64>> {
        self.opened.lock().unwrap().clone()
    }
}

impl FeedSource for ScriptedSource {
    fn open(&self, since: Option<i64>) -> BoxFuture<'_, Result<FeedReader, FeedError>> {
        self.opened.lock().unwrap().push(since);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(Script::idle);
        let read_timeout = self.read_timeout;
        Box::pin(async move {
            match script {
                Script::Reject(status) => Err(FeedError::Status {
                    status,
                    body: String::new(),
                }),
                Script::Stream { chunks, close } => {
                    let body = stream::iter(
                        chunks
                            .into_iter()
                            .map(|c| Ok::<_, FeedError>(Bytes::from(c))),
                    );
                    let stream: ByteStream = if close {
                        Box::pin(body)
                    } else {
                        Box::pin(body.chain(stream::pending()))
                    };
                    Ok(FeedReader::new(stream, read_timeout))
                }
            }
        })
    }
}

pub fn fast_limits() -> Limits {
    let limit = Limit {
        max_calls: 1000,
        window: Duration::from_secs(1),
    };
    Limits {
        feed_read: limit,
        control: limit,
        dispatch: limit,
        reconnect: limit,
    }
}

/// A state directory with a real store and recording collaborators.
pub struct Harness {
    pub dir: TempDir,
    pub paths: StatePaths,
    pub store: Arc<Store>,
    pub effects: Arc<RecordingEffects>,
    pub health: Arc<RecordingHealth>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let paths = StatePaths::new(dir.path());
        let store = Store::open(paths.database()).expect("Failed to open store");
        store.migrate().expect("Failed to migrate");
        Self {
            dir,
            paths,
            store: Arc::new(store),
            effects: Arc::new(RecordingEffects::default()),
            health: Arc::new(RecordingHealth::default()),
        }
    }

    pub fn alert(&self) -> Arc<AlertState> {
        Arc::new(
            AlertState::recover(
                self.store.clone(),
                self.effects.clone(),
                self.health.clone(),
                self.paths.clone(),
            )
            .expect("Failed to build alert state"),
        )
    }

    pub fn agent(&self, source: Arc<ScriptedSource>, alert: Arc<AlertState>) -> Agent {
        let control = ControlChannel::new(self.paths.clone(), alert.clone());
        Agent::new(
            source,
            self.store.clone(),
            alert,
            control,
            self.health.clone(),
            fast_limits(),
        )
    }

    pub fn message_log(&self) -> String {
        std::fs::read_to_string(self.paths.messages()).unwrap_or_default()
    }
}

pub fn message(time: i64, text: &str, priority: Option<i64>) -> String {
    let mut event = serde_json::json!({
        "id": format!("m{}", time),
        "time": time,
        "event": "message",
        "topic": "alerts",
        "message": text,
    });
    if let Some(priority) = priority {
        event["priority"] = serde_json::json!(priority);
    }
    event.to_string()
}

pub fn open_event(time: i64) -> String {
    serde_json::json!({ "id": "o", "time": time, "event": "open", "topic": "alerts" }).to_string()
}
