use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{parse_datetime, parse_submission_status, to_i64, to_u64},
    models::Submission,
    Database,
};

fn row_to_submission(row: &Row) -> Result<Submission> {
    let status: String = row.get("status")?;
    let submitted_at: String = row.get("submitted_at")?;
    let clip_count: i64 = row.get("clip_count")?;

    Ok(Submission {
        id: row.get("id")?,
        video_id: row.get("video_id")?,
        video_reference: row.get("video_reference")?,
        clip_count: to_u64(clip_count, "clip_count")?,
        skipped: row.get("skipped")?,
        status: parse_submission_status(&status)?,
        error: row.get("error")?,
        payload: row.get("payload")?,
        submitted_at: parse_datetime(&submitted_at, "submitted_at")?,
    })
}

impl Database {
    pub async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        let record = submission.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO submissions (
                    id, video_id, video_reference, clip_count, skipped,
                    status, error, payload, submitted_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.video_id,
                    record.video_reference,
                    to_i64(record.clip_count)?,
                    record.skipped,
                    record.status.as_str(),
                    record.error,
                    record.payload,
                    record.submitted_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert submission")?;
            Ok(())
        })
        .await
    }

    /// Most recent first, optionally narrowed to one video.
    pub async fn list_submissions(
        &self,
        video_id: Option<String>,
        limit: u32,
    ) -> Result<Vec<Submission>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, video_id, video_reference, clip_count, skipped,
                        status, error, payload, submitted_at
                 FROM submissions
                 WHERE ?1 IS NULL OR video_id = ?1
                 ORDER BY submitted_at DESC
                 LIMIT ?2",
            )?;

            let mut rows = stmt.query(params![video_id, limit])?;
            let mut submissions = Vec::new();
            while let Some(row) = rows.next()? {
                submissions.push(row_to_submission(row)?);
            }
            Ok(submissions)
        })
        .await
    }
}
