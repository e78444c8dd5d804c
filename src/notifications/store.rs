//! SQLite storage for notification subscriptions, keyed by Farcaster fid.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::NotificationDetails;

pub struct NotificationStore {
    db_path: String,
}

impl NotificationStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        info!(path = %db_path, "notification store ready");
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("failed to open notification db at {}", self.db_path))
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS notification_subscriptions (
                fid INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                token TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn upsert(&self, fid: u64, details: &NotificationDetails) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO notification_subscriptions (fid, url, token, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(fid) DO UPDATE SET
                url = excluded.url,
                token = excluded.token,
                updated_at = excluded.updated_at",
            params![fid as i64, details.url, details.token, Utc::now().to_rfc3339()],
        )
        .context("failed to upsert notification subscription")?;
        Ok(())
    }

    /// Returns whether a subscription existed.
    pub fn remove(&self, fid: u64) -> Result<bool> {
        let conn = self.open()?;
        let deleted = conn
            .execute(
                "DELETE FROM notification_subscriptions WHERE fid = ?1",
                params![fid as i64],
            )
            .context("failed to delete notification subscription")?;
        Ok(deleted > 0)
    }

    pub fn get(&self, fid: u64) -> Result<Option<NotificationDetails>> {
        let conn = self.open()?;
        let details = conn
            .query_row(
                "SELECT url, token FROM notification_subscriptions WHERE fid = ?1",
                params![fid as i64],
                |row| {
                    Ok(NotificationDetails {
                        url: row.get(0)?,
                        token: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(details)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.open()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification_subscriptions",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
