use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_datetime, parse_optional_datetime},
    models::VideoLock,
    Database,
};

fn row_to_lock(row: &Row) -> Result<VideoLock> {
    let acquired_at: String = row.get("acquired_at")?;
    let released_at: Option<String> = row.get("released_at")?;

    Ok(VideoLock {
        video_id: row.get("video_id")?,
        acquired_at: parse_datetime(&acquired_at, "acquired_at")?,
        released_at: parse_optional_datetime(released_at, "released_at")?,
    })
}

impl Database {
    /// Re-acquiring a video resets its release marker.
    pub async fn record_lock_acquired(
        &self,
        video_id: &str,
        acquired_at: DateTime<Utc>,
    ) -> Result<()> {
        let video_id = video_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO video_locks (video_id, acquired_at, released_at)
                 VALUES (?1, ?2, NULL)
                 ON CONFLICT(video_id) DO UPDATE SET
                     acquired_at = excluded.acquired_at,
                     released_at = NULL",
                params![video_id, acquired_at.to_rfc3339()],
            )
            .with_context(|| "failed to record lock acquisition")?;
            Ok(())
        })
        .await
    }

    pub async fn record_lock_released(
        &self,
        video_id: &str,
        released_at: DateTime<Utc>,
    ) -> Result<()> {
        let video_id = video_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE video_locks
                 SET released_at = ?1
                 WHERE video_id = ?2 AND released_at IS NULL",
                params![released_at.to_rfc3339(), video_id],
            )
            .with_context(|| "failed to record lock release")?;
            Ok(())
        })
        .await
    }

    /// Locks this client took and never gave back, oldest first.
    pub async fn get_held_locks(&self) -> Result<Vec<VideoLock>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT video_id, acquired_at, released_at
                 FROM video_locks
                 WHERE released_at IS NULL
                 ORDER BY acquired_at ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut locks = Vec::new();
            while let Some(row) = rows.next()? {
                locks.push(row_to_lock(row)?);
            }
            Ok(locks)
        })
        .await
    }
}
