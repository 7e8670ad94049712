//! The alarm state machine.
//!
//! `Idle` and `Alarming` are tracked by an in-memory flag mirrored by the
//! durable alert marker. The marker is written before the flag flips, so a
//! failed write leaves both sides unchanged.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::config::{StatePaths, APP_NAME};
use crate::db::AlertRepository;
use crate::effects::AlarmEffects;
use crate::health::Health;
use crate::models::{sanitize, NotificationEvent, Urgency};

/// Times the alarm sound repeats per alert run.
pub const ALARM_REPEATS: usize = 5;

#[derive(Debug, Clone, Default)]
struct Alarm {
    active: bool,
    /// Raw text of the latest qualifying message.
    message: String,
    title: Option<String>,
    urgency: Urgency,
}

/// Snapshot of the alert state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertStatus {
    pub active: bool,
    pub message: String,
    pub urgency: Urgency,
}

pub struct AlertState {
    repo: Arc<dyn AlertRepository>,
    effects: Arc<dyn AlarmEffects>,
    health: Arc<dyn Health>,
    paths: StatePaths,
    alarm: Mutex<Alarm>,
}

impl AlertState {
    /// Build the state machine, recovering an alarm that was active when the
    /// process last stopped.
    ///
    /// A sentinel left over from a previous run is removed without silencing
    /// anything, since no watcher was running to act on it.
    pub fn recover(
        repo: Arc<dyn AlertRepository>,
        effects: Arc<dyn AlarmEffects>,
        health: Arc<dyn Health>,
        paths: StatePaths,
    ) -> Result<Self> {
        let state = Self {
            repo,
            effects,
            health,
            paths,
            alarm: Mutex::new(Alarm::default()),
        };

        let sentinel = state.paths.sentinel();
        if sentinel.exists() {
            std::fs::remove_file(&sentinel)
                .with_context(|| format!("Failed to remove {}", sentinel.display()))?;
            tracing::error!("Quiet file existed, removed. Not taking other action.");
        }

        if state.repo.load_alert()? {
            state.enable()?;
            state.health.status("Existing alert file found");
        }

        Ok(state)
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn status(&self) -> AlertStatus {
        let alarm = self.lock();
        AlertStatus {
            active: alarm.active,
            message: alarm.message.clone(),
            urgency: alarm.urgency,
        }
    }

    /// Idle -> Alarming. Idempotent.
    pub fn enable(&self) -> Result<()> {
        self.repo.save_alert(true)?;
        self.lock().active = true;
        Ok(())
    }

    /// Alarming -> Idle. Idempotent.
    pub fn disable(&self) -> Result<()> {
        tracing::info!("Alert disabled!");
        self.repo.save_alert(false)?;
        self.lock().active = false;
        Ok(())
    }

    /// Record `event` as the current alarm and enable it.
    ///
    /// A message arriving while already alarming replaces the previous one.
    pub fn raise(&self, event: &NotificationEvent) -> Result<()> {
        {
            let mut alarm = self.lock();
            alarm.message = event.text.clone().unwrap_or_default();
            alarm.title = event.title.clone();
            alarm.urgency = Urgency::from_priority(event.priority);
        }
        self.enable()
    }

    /// Sound the alarm if active.
    ///
    /// The flag is re-read before every repeat, so a `disable` that lands
    /// while the sound is playing stops further repeats. A new notification is
    /// also shown on the desktop and appended to the message log.
    ///
    /// Re-sounding a standing alarm (`is_new_notification == false`) does not
    /// append to the log again, so each message appears in it once.
    pub async fn run_alert(&self, is_new_notification: bool) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }

        for _ in 0..ALARM_REPEATS {
            if !self.is_active() {
                break;
            }
            self.effects.play_alarm().await;
        }

        if !is_new_notification {
            return Ok(());
        }

        let (title, urgency, message) = {
            let alarm = self.lock();
            (
                alarm.title.as_deref().map(sanitize).unwrap_or_else(|| APP_NAME.to_string()),
                alarm.urgency,
                sanitize(&alarm.message),
            )
        };
        self.effects
            .show_notification(&title, urgency, &message)
            .await;

        tracing::info!("New message: {}", message);
        self.append_message(&message)
    }

    fn append_message(&self, message: &str) -> Result<()> {
        let path = self.paths.messages();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open message log {}", path.display()))?;
        writeln!(file, "{}", message)?;
        file.sync_data()?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Alarm> {
        self.alarm.lock().expect("alert lock poisoned")
    }
}
