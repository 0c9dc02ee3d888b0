//! Embedded SQLite store for watch verdicts.
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use tokio::task;

use crate::{matcher::WatchedAddress, monitor::Verdict, store::VerdictStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS state (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

/// Simple key/value table:
///   state(key TEXT PRIMARY KEY, value TEXT NOT NULL)
///
/// Keys used:
///  - verdict:<script hex> : JSON-encoded [`Verdict`]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Creates/initializes the SQLite file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let conn = Connection::open(&path)
            .with_context(|| format!("open sqlite at {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { path })
    }

    fn open(path: PathBuf) -> anyhow::Result<Connection> {
        let conn = Connection::open(&path)
            .with_context(|| format!("open sqlite at {}", path.display()))?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    fn key(address: &WatchedAddress) -> String {
        format!("verdict:{}", address.key())
    }

    fn kv_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
        let mut stmt = conn.prepare("SELECT value FROM state WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            let v: String = row.get(0)?;
            Ok(Some(v))
        } else {
            Ok(None)
        }
    }

    fn kv_set(conn: &Connection, key: &str, val: &str) -> anyhow::Result<()> {
        conn.execute(
            "INSERT INTO state(key,value) VALUES(?1,?2)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, val],
        )?;
        Ok(())
    }
}

#[async_trait]
impl VerdictStore for SqliteStore {
    async fn load_verdict(&self, address: &WatchedAddress) -> anyhow::Result<Option<Verdict>> {
        let path = self.path.clone();
        let key = Self::key(address);
        task::spawn_blocking(move || {
            let conn = Self::open(path)?;
            Self::kv_get(&conn, &key)?
                .map(|json| {
                    serde_json::from_str(&json).with_context(|| format!("parse {key}"))
                })
                .transpose()
        })
        .await?
    }

    async fn save_verdict(
        &self,
        address: &WatchedAddress,
        verdict: &Verdict,
    ) -> anyhow::Result<()> {
        let path = self.path.clone();
        let key = Self::key(address);
        let json = serde_json::to_string(verdict).context("encode verdict")?;
        task::spawn_blocking(move || {
            let conn = Self::open(path)?;
            Self::kv_set(&conn, &key, &json)
        })
        .await?
    }

    async fn clear_verdict(&self, address: &WatchedAddress) -> anyhow::Result<()> {
        let path = self.path.clone();
        let key = Self::key(address);
        task::spawn_blocking(move || {
            let conn = Self::open(path)?;
            conn.execute("DELETE FROM state WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await?
    }
}
