use serde::{Deserialize, Serialize};

/// Desktop-notification urgency.
///
/// Priority 3 or 4 maps to `Normal`, 5 to `Critical`, everything else
/// (including an absent priority) to `Low`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Low,
    Normal,
    Critical,
}

impl Urgency {
    pub fn from_priority(priority: Option<i64>) -> Self {
        match priority {
            Some(3 | 4) => Self::Normal,
            Some(5) => Self::Critical,
            _ => Self::Low,
        }
    }

    /// Value understood by `notify-send -u`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::Critical => "critical",
        }
    }
}
