use serde::{Deserialize, Serialize};

/// The kind of a feed line.
///
/// The feed also emits `keepalive` and `poll_request` lines; anything that is
/// neither `open` nor `message` is folded into `Other`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Open,
    Message,
    #[serde(other)]
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message => "message",
            Self::Other => "other",
        }
    }
}

/// One decoded line of the notification feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEvent {
    #[serde(rename = "event")]
    pub kind: EventKind,
    /// Server timestamp; becomes the resume cursor once the event is processed.
    pub time: i64,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Raw message text. Sanitize before display.
    #[serde(default, rename = "message")]
    pub text: Option<String>,
    /// 1 (min) to 5 (max). Absent means the server default.
    #[serde(default)]
    pub priority: Option<i64>,
}

/// Priority at or above which a message raises the alarm.
pub const ALARM_PRIORITY: i64 = 5;

impl NotificationEvent {
    pub fn from_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    pub fn raises_alarm(&self) -> bool {
        self.kind == EventKind::Message && self.priority.is_some_and(|p| p >= ALARM_PRIORITY)
    }
}
