//! Domain models for the feed alarm.
//!
//! - [`NotificationEvent`]: one decoded line of the feed. Ephemeral; consumed
//!   by the batch that produced it.
//! - [`Urgency`]: desktop-notification urgency derived from a message priority.
//! - [`sanitize`]: the boundary filter applied before message text reaches a
//!   log, the message file, or an external command.

mod event;
mod urgency;

pub use event::*;
pub use urgency::*;

/// Strip every character outside `[A-Za-z0-9 .]`.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '.')
        .collect()
}
