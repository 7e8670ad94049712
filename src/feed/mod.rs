//! Streaming notification feed.
//!
//! [`FeedClient`] opens one long-lived GET against the feed endpoint and hands
//! back a [`FeedReader`], which splits the response body into newline
//! delimited JSON lines. The reader is reused across many
//! [`FeedReader::read_batch`] calls until the server closes the body.

mod client;
mod reader;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub use client::FeedClient;
pub use reader::{ByteStream, FeedReader};

/// Feed errors.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed rejected request ({status}): {body}")]
    Status { status: StatusCode, body: String },

    #[error("No data from feed within {0:?}")]
    Timeout(Duration),

    #[error("Feed connection closed by server")]
    Closed,

    #[error("Malformed feed line: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FeedError {
    /// Whether re-opening the feed may succeed.
    ///
    /// Client errors (4xx) and malformed payloads are not transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_body() || e.is_request(),
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Timeout(_) | Self::Closed => true,
            Self::Decode(_) => false,
        }
    }
}
