use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Backend ids show up as numbers or strings depending on the endpoint.
fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSummary {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    /// `not_annotated`, `in_progress`, `annotated`, `processing`,
    /// `processing_failed`, or whatever newer states the backend reports.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub azure_link: Option<String>,
    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub has_annotation: bool,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl VideoSummary {
    /// Identifier written into `video_reference` when saving.
    pub fn reference(&self) -> String {
        self.azure_link
            .clone()
            .or_else(|| self.filename.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum VideoListing {
    Bare(Vec<VideoSummary>),
    Wrapped { videos: Vec<VideoSummary> },
}

impl VideoListing {
    pub(crate) fn into_videos(self) -> Vec<VideoSummary> {
        match self {
            VideoListing::Bare(videos) | VideoListing::Wrapped { videos } => videos,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "task_id")]
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterVideoRequest<'a> {
    pub url: &'a str,
}
