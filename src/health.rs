//! Liveness reporting to the process supervisor.

use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Fire-and-forget liveness hooks.
pub trait Health: Send + Sync {
    /// Called after every successful feed drain.
    fn pulse(&self);
    /// Called when the feed reports it is open.
    fn ready(&self);
    /// Free-form status line.
    fn status(&self, msg: &str);
}

/// Speaks the systemd notify protocol over `$NOTIFY_SOCKET`.
#[derive(Debug)]
pub struct SystemdNotifier {
    socket: Option<PathBuf>,
    ready_sent: AtomicBool,
}

impl SystemdNotifier {
    pub fn from_env() -> Self {
        let socket = std::env::var_os("NOTIFY_SOCKET")
            .map(PathBuf::from)
            // Abstract sockets ("@...") are not reachable through a path
            .filter(|p| !p.as_os_str().to_string_lossy().starts_with('@'));
        if socket.is_none() {
            tracing::debug!("NOTIFY_SOCKET not set, health reports disabled");
        }
        Self {
            socket,
            ready_sent: AtomicBool::new(false),
        }
    }

    fn send(&self, state: &str) {
        let Some(ref path) = self.socket else {
            return;
        };
        let result = UnixDatagram::unbound().and_then(|sock| sock.send_to(state.as_bytes(), path));
        if let Err(e) = result {
            tracing::warn!("Failed to notify supervisor ({}): {}", state, e);
        }
    }
}

impl Health for SystemdNotifier {
    fn pulse(&self) {
        self.send("WATCHDOG=1");
    }

    fn ready(&self) {
        if !self.ready_sent.swap(true, Ordering::SeqCst) {
            self.send("READY=1");
        }
    }

    fn status(&self, msg: &str) {
        let line: String = msg.chars().filter(|c| *c != '\n').collect();
        self.send(&format!("STATUS={}", line));
        tracing::info!("<<< \"{}\"", msg);
    }
}
