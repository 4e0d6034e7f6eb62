use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local record of a backend checkout, kept so a crashed run can give it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoLock {
    pub video_id: String,
    pub acquired_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}
