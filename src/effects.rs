//! Audible and visual alarm side effects.
//!
//! Both effects run external programs. A failure to spawn or a non-zero exit
//! is logged and otherwise treated like success.

use std::path::PathBuf;
use std::process::Stdio;

use futures::future::BoxFuture;
use tokio::process::Command;

use crate::models::Urgency;

pub trait AlarmEffects: Send + Sync {
    /// Play the alarm sound once, returning when playback ends.
    fn play_alarm(&self) -> BoxFuture<'_, ()>;

    fn show_notification<'a>(
        &'a self,
        title: &'a str,
        urgency: Urgency,
        message: &'a str,
    ) -> BoxFuture<'a, ()>;
}

/// Runs the configured sound player and `notify-send`.
#[derive(Debug, Clone)]
pub struct CommandEffects {
    alarm_command: Vec<String>,
    notify_command: PathBuf,
}

impl CommandEffects {
    pub fn new(alarm_command: Vec<String>, notify_command: PathBuf) -> Self {
        Self {
            alarm_command,
            notify_command,
        }
    }

    fn notify_args(title: &str, urgency: Urgency, message: &str) -> Vec<String> {
        vec![
            "-u".to_string(),
            urgency.as_str().to_string(),
            "-t".to_string(),
            "0".to_string(),
            title.to_string(),
            message.to_string(),
        ]
    }
}

async fn run(mut command: Command, label: &str) {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    match command.status().await {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!("{} exited with {}", label, status),
        Err(e) => tracing::warn!("Failed to run {}: {}", label, e),
    }
}

impl AlarmEffects for CommandEffects {
    fn play_alarm(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let Some((program, args)) = self.alarm_command.split_first() else {
                tracing::warn!("No alarm command configured");
                return;
            };
            let mut command = Command::new(program);
            command.args(args);
            run(command, "alarm command").await;
        })
    }

    fn show_notification<'a>(
        &'a self,
        title: &'a str,
        urgency: Urgency,
        message: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut command = Command::new(&self.notify_command);
            command.args(Self::notify_args(title, urgency, message));
            run(command, "notification command").await;
        })
    }
}
