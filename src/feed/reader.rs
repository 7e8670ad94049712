use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::FeedError;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FeedError>> + Send>>;

/// Splits a streaming body into lines.
///
/// Bytes after the last newline stay buffered until the rest of the line
/// arrives. After the body ends, a trailing partial line is emitted once and
/// the next read reports [`FeedError::Closed`].
pub struct FeedReader {
    stream: ByteStream,
    buf: Vec<u8>,
    read_timeout: Duration,
    eof: bool,
}

impl FeedReader {
    pub fn new(stream: ByteStream, read_timeout: Duration) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            read_timeout,
            eof: false,
        }
    }

    pub fn from_response(response: reqwest::Response, read_timeout: Duration) -> Self {
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(FeedError::from));
        Self::new(Box::pin(stream), read_timeout)
    }

    /// Whether the server has ended the body and every line was handed out.
    pub fn is_closed(&self) -> bool {
        self.eof && self.buf.is_empty()
    }

    /// Collect the next batch of raw lines.
    ///
    /// Lines already buffered are returned without touching the network.
    /// Otherwise this waits for at least one complete line. A read that sees
    /// no bytes within the read timeout fails with [`FeedError::Timeout`] and
    /// leaves the reader open; partial bytes stay buffered.
    pub async fn read_batch(&mut self) -> Result<Vec<String>, FeedError> {
        let lines = self.drain_buffered();
        if !lines.is_empty() {
            return Ok(lines);
        }
        if self.eof {
            return Err(FeedError::Closed);
        }

        loop {
            match tokio::time::timeout(self.read_timeout, self.stream.next()).await {
                Err(_) => return Err(FeedError::Timeout(self.read_timeout)),
                Ok(Some(Ok(chunk))) => {
                    self.buf.extend_from_slice(&chunk);
                    let lines = self.drain_buffered();
                    if !lines.is_empty() {
                        return Ok(lines);
                    }
                }
                Ok(Some(Err(e))) => {
                    self.eof = true;
                    return Err(e);
                }
                Ok(None) => {
                    self.eof = true;
                    let lines = self.drain_buffered();
                    return if lines.is_empty() {
                        Err(FeedError::Closed)
                    } else {
                        Ok(lines)
                    };
                }
            }
        }
    }

    fn drain_buffered(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            push_line(&mut lines, &raw[..pos]);
        }
        if self.eof && !self.buf.is_empty() {
            let raw = std::mem::take(&mut self.buf);
            push_line(&mut lines, &raw);
        }
        lines
    }
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r');
    if !line.trim().is_empty() {
        lines.push(line.to_string());
    }
}
