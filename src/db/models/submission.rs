//! Save attempts, successful or not, as reported back to the history view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionStatus {
    Saved,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Saved => "saved",
            SubmissionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub video_id: String,
    pub video_reference: String,
    pub clip_count: u64,
    pub skipped: bool,
    pub status: SubmissionStatus,
    pub error: Option<String>,
    /// JSON body exactly as it was posted.
    pub payload: String,
    pub submitted_at: DateTime<Utc>,
}
