//! The control loop.
//!
//! Two kinds of worker task feed one coordinating loop over a channel:
//! - the feed task reads one batch of lines from the open feed (or re-opens
//!   it after the server closed it),
//! - the control task waits for one sentinel.
//!
//! The loop handles whichever completion arrives first and relaunches that
//! task. A still-running task is never cancelled. After every completion a
//! standing alarm is sounded again.
//!
//! Every launch passes through its own [`RateLimiter`], so a task that fails
//! instantly cannot spin.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::alert::AlertState;
use crate::config::Limits;
use crate::control::{ControlChannel, ControlError};
use crate::db::CursorRepository;
use crate::feed::{FeedClient, FeedError, FeedReader};
use crate::health::Health;
use crate::limiter::RateLimiter;
use crate::models::{sanitize, EventKind, NotificationEvent};

/// Opens the feed at a resume position.
pub trait FeedSource: Send + Sync {
    fn open(&self, since: Option<i64>) -> BoxFuture<'_, Result<FeedReader, FeedError>>;
}

impl FeedSource for FeedClient {
    fn open(&self, since: Option<i64>) -> BoxFuture<'_, Result<FeedReader, FeedError>> {
        Box::pin(FeedClient::open(self, since))
    }
}

/// A finished worker task.
enum Completion {
    Feed {
        reader: FeedReader,
        result: Result<Vec<String>, FeedError>,
    },
    Reconnect(Result<FeedReader>),
    Control(Result<()>),
}

/// What one loop iteration handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A feed batch was dispatched.
    Feed { lines: usize },
    /// The feed was closed or failed transiently; re-opening.
    FeedLost,
    /// The feed was re-opened.
    Reconnected,
    /// The control task finished and was re-armed. A watcher failure is
    /// logged and retried; a failure to silence the alarm is fatal.
    Control,
}

#[derive(Clone)]
struct Limiters {
    feed_read: RateLimiter,
    control: RateLimiter,
    dispatch: RateLimiter,
    reconnect: RateLimiter,
}

impl Limiters {
    fn new(limits: &Limits) -> Self {
        Self {
            feed_read: limits.feed_read.limiter("feed_read"),
            control: limits.control.limiter("control"),
            dispatch: limits.dispatch.limiter("dispatch"),
            reconnect: limits.reconnect.limiter("reconnect"),
        }
    }
}

pub struct Agent {
    source: Arc<dyn FeedSource>,
    cursor: Arc<dyn CursorRepository>,
    alert: Arc<AlertState>,
    control: ControlChannel,
    health: Arc<dyn Health>,
    limiters: Limiters,
}

impl Agent {
    pub fn new(
        source: Arc<dyn FeedSource>,
        cursor: Arc<dyn CursorRepository>,
        alert: Arc<AlertState>,
        control: ControlChannel,
        health: Arc<dyn Health>,
        limits: Limits,
    ) -> Self {
        Self {
            source,
            cursor,
            alert,
            control,
            health,
            limiters: Limiters::new(&limits),
        }
    }

    /// Run forever. Returns only on a fatal error.
    pub async fn run(self) -> Result<()> {
        let mut running = self.start().await?;
        loop {
            running.step().await?;
        }
    }

    /// Open the feed and launch both worker tasks.
    pub async fn start(self) -> Result<RunningAgent> {
        let since = self.cursor.load_cursor()?;
        let reader = self
            .source
            .open(since)
            .await
            .context("Failed to open notification feed")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let running = RunningAgent {
            agent: self,
            tx,
            rx,
        };
        running.spawn_feed(reader);
        running.spawn_control();
        Ok(running)
    }
}

/// An agent whose worker tasks are running.
pub struct RunningAgent {
    agent: Agent,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl RunningAgent {
    /// Wait for the first task to finish, handle it, relaunch it, and sound a
    /// standing alarm.
    pub async fn step(&mut self) -> Result<Step> {
        // The loop holds a sender, so the channel never closes
        let completion = self
            .rx
            .recv()
            .await
            .context("Worker channel closed")?;

        let step = match completion {
            Completion::Control(result) => {
                match result {
                    Ok(()) => tracing::info!("Quiet request handled"),
                    Err(e) if e.is::<ControlError>() => {
                        tracing::warn!("Filewatcher died: {:?}", e)
                    }
                    Err(e) => return Err(e.context("Failed to handle quiet request")),
                }
                self.spawn_control();
                Step::Control
            }
            Completion::Feed { reader, result } => match result {
                Ok(lines) => {
                    let count = lines.len();
                    tracing::debug!(lines = count, "Messages checked");
                    self.dispatch(lines).await?;
                    self.spawn_feed(reader);
                    Step::Feed { lines: count }
                }
                Err(FeedError::Timeout(after)) => {
                    tracing::warn!("No feed data for {:?}, reading again", after);
                    self.spawn_feed(reader);
                    Step::Feed { lines: 0 }
                }
                Err(e) if e.is_transient() => {
                    if reader.is_closed() {
                        tracing::warn!("Feed lost ({}), reconnecting", e);
                        self.spawn_reconnect();
                        Step::FeedLost
                    } else {
                        tracing::warn!("Feed read failed: {}", e);
                        self.spawn_feed(reader);
                        Step::Feed { lines: 0 }
                    }
                }
                Err(e) => return Err(e).context("Feed read failed"),
            },
            Completion::Reconnect(result) => match result {
                Ok(reader) => {
                    tracing::info!("Feed re-opened");
                    self.spawn_feed(reader);
                    Step::Reconnected
                }
                Err(e) if is_transient(&e) => {
                    tracing::warn!("Reconnect failed: {:#}", e);
                    self.spawn_reconnect();
                    Step::FeedLost
                }
                Err(e) => return Err(e.context("Failed to re-open notification feed")),
            },
        };

        if self.agent.alert.is_active() {
            self.agent.alert.run_alert(false).await?;
        }

        Ok(step)
    }

    /// Decode and handle one batch, advancing the cursor after each event.
    async fn dispatch(&self, lines: Vec<String>) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        self.agent.limiters.dispatch.acquire().await;

        for line in lines {
            let event = match NotificationEvent::from_line(&line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Skipping malformed feed line ({}): {:?}", e, line);
                    continue;
                }
            };
            self.handle_event(&event).await?;
            self.agent
                .cursor
                .save_cursor(event.time)
                .context("Failed to persist resume cursor")?;
        }
        Ok(())
    }

    async fn handle_event(&self, event: &NotificationEvent) -> Result<()> {
        match event.kind {
            EventKind::Open => {
                tracing::debug!(time = event.time, "Feed open");
                self.agent.health.ready();
            }
            EventKind::Message => {
                if event.raises_alarm() {
                    tracing::debug!(priority = ?event.priority, "Alarm priority message");
                    self.agent.alert.raise(event)?;
                    self.agent.alert.run_alert(true).await?;
                }
                tracing::info!("{}", sanitize(event.text.as_deref().unwrap_or_default()));
            }
            EventKind::Other => tracing::debug!(time = event.time, "{}", event.kind.as_str()),
        }
        Ok(())
    }

    fn spawn_feed(&self, mut reader: FeedReader) {
        let limiter = self.agent.limiters.feed_read.clone();
        let health = self.agent.health.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            limiter.acquire().await;
            let result = reader.read_batch().await;
            // Only a real drain counts as liveness; a read timeout does not
            if result.is_ok() {
                health.pulse();
            }
            let _ = tx.send(Completion::Feed { reader, result });
        });
    }

    fn spawn_reconnect(&self) {
        let limiter = self.agent.limiters.reconnect.clone();
        let source = self.agent.source.clone();
        let cursor = self.agent.cursor.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            limiter.acquire().await;
            let result = match cursor.load_cursor() {
                Ok(since) => source.open(since).await.map_err(anyhow::Error::from),
                Err(e) => Err(e.context("Failed to load resume cursor")),
            };
            let _ = tx.send(Completion::Reconnect(result));
        });
    }

    fn spawn_control(&self) {
        let limiter = self.agent.limiters.control.clone();
        let control = self.agent.control.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            limiter.acquire().await;
            let result = control.watch_once().await;
            let _ = tx.send(Completion::Control(result));
        });
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<FeedError>()
        .is_some_and(FeedError::is_transient)
}
