//! Durable key-value store backing the resume cursor and the alert marker.
//!
//! The store is a single SQLite table. Every `set` and `rem` commits on its
//! own, and [`Store::dump`] checkpoints the write-ahead log so the main
//! database file reflects everything written so far.

mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

/// Key holding the last processed feed timestamp.
pub const SINCE_KEY: &str = "since";
/// Key whose presence marks an active alarm.
pub const ALERT_KEY: &str = "alert";
/// Value stored under [`ALERT_KEY`] while the alarm is active.
pub const ALERT_ACTIVE: &str = "True";

/// Persistence of the resume cursor.
pub trait CursorRepository: Send + Sync {
    fn load_cursor(&self) -> Result<Option<i64>>;
    /// Persist the cursor and flush it to disk before returning.
    fn save_cursor(&self, since: i64) -> Result<()>;
}

/// Persistence of the durable alert marker.
pub trait AlertRepository: Send + Sync {
    fn load_alert(&self) -> Result<bool>;
    fn save_alert(&self, active: bool) -> Result<()>;
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        tracing::debug!("Opened database: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Key-value operations
    // ============================================================

    pub fn exists(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv WHERE key = ?", [key], |row| {
            row.get(0)
        })?;
        Ok(count > 0)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )
        .with_context(|| format!("Failed to set key {}", key))?;
        Ok(())
    }

    /// Remove a key. Returns whether it was present.
    pub fn rem(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute("DELETE FROM kv WHERE key = ?", [key])?;
        Ok(rows > 0)
    }

    /// Flush everything written so far into the main database file.
    pub fn dump(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        // Without a WAL (in-memory databases) the pragma still returns one row.
        conn.query_row("PRAGMA wal_checkpoint(FULL)", [], |_| Ok(()))
            .context("Failed to checkpoint database")?;
        Ok(())
    }
}

impl CursorRepository for Store {
    fn load_cursor(&self) -> Result<Option<i64>> {
        let Some(raw) = self.get(SINCE_KEY)? else {
            return Ok(None);
        };
        let since = raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("Stored cursor is not an integer: {:?}", raw))?;
        Ok(Some(since))
    }

    fn save_cursor(&self, since: i64) -> Result<()> {
        self.set(SINCE_KEY, &since.to_string())?;
        self.dump()
    }
}

impl AlertRepository for Store {
    fn load_alert(&self) -> Result<bool> {
        Ok(self.get(ALERT_KEY)?.as_deref() == Some(ALERT_ACTIVE))
    }

    fn save_alert(&self, active: bool) -> Result<()> {
        if active {
            self.set(ALERT_KEY, ALERT_ACTIVE)?;
        } else {
            self.rem(ALERT_KEY)?;
        }
        self.dump()
    }
}
