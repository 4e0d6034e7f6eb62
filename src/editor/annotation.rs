use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{
    state::{Fragment, FragmentBook, Project},
    timeline::{format_clip_time, parse_timestamp},
};
use crate::log_warn;

const ENABLE_LOGS: bool = true;

/// Older annotations store unset flags as `null`.
fn false_if_null<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

/// Per-video descriptors sent alongside the clips.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VideoMetadata {
    #[serde(default, deserialize_with = "false_if_null")]
    pub skip: bool,
    #[serde(default)]
    pub uav_type: Option<String>,
    #[serde(default)]
    pub video_content: Option<String>,
    #[serde(default, deserialize_with = "false_if_null")]
    pub is_urban: bool,
    #[serde(default, deserialize_with = "false_if_null")]
    pub has_osd: bool,
    #[serde(default, deserialize_with = "false_if_null")]
    pub is_analog: bool,
    #[serde(default, deserialize_with = "false_if_null")]
    pub night_video: bool,
    #[serde(default, deserialize_with = "false_if_null")]
    pub multiple_streams: bool,
    #[serde(default, deserialize_with = "false_if_null")]
    pub has_infantry: bool,
    #[serde(default, deserialize_with = "false_if_null")]
    pub has_explosions: bool,
    /// Keys this client does not know about, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VideoMetadata {
    pub fn missing_required(&self) -> Vec<String> {
        let blank = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());

        let mut missing = Vec::new();
        if blank(&self.uav_type) {
            missing.push("uav_type".to_string());
        }
        if blank(&self.video_content) {
            missing.push("video_content".to_string());
        }
        missing
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipRecord {
    pub id: usize,
    pub start_time: String,
    pub end_time: String,
}

/// Request body for the save endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub video_reference: String,
    pub metadata: VideoMetadata,
    pub clips: BTreeMap<Project, Vec<ClipRecord>>,
}

impl Annotation {
    pub fn clip_count(&self) -> usize {
        self.clips.values().map(Vec::len).sum()
    }
}

/// Clip times arrive either as `HH:MM:SS` strings or as raw seconds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StoredTime {
    Seconds(f64),
    Text(String),
}

impl StoredTime {
    fn seconds(&self) -> anyhow::Result<f64> {
        match self {
            StoredTime::Seconds(value) => Ok(*value),
            StoredTime::Text(text) => parse_timestamp(text),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StoredClip {
    pub start_time: StoredTime,
    pub end_time: StoredTime,
}

/// Annotation as returned by the backend for a previously saved video.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StoredAnnotation {
    #[serde(default)]
    pub video_reference: Option<String>,
    #[serde(default)]
    pub metadata: VideoMetadata,
    #[serde(default)]
    pub clips: BTreeMap<String, Vec<StoredClip>>,
}

#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum SaveBlocked {
    #[error("no video is loaded")]
    NoVideo,
    #[error("unfinished fragments in {} will be discarded", join_projects(.projects))]
    UnfinishedPresent { projects: Vec<Project> },
    #[error("required metadata missing: {}", .fields.join(", "))]
    MissingMetadata { fields: Vec<String> },
    #[error("mark at least one fragment or choose skip")]
    NoFragments,
}

fn join_projects(projects: &[Project]) -> String {
    projects
        .iter()
        .map(Project::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Gate applied before any save request goes out. `skip` waives the
/// metadata and fragment requirements but never the unfinished check.
pub fn check_save(
    book: &FragmentBook,
    metadata: &VideoMetadata,
    discard_unfinished: bool,
) -> Result<(), SaveBlocked> {
    let unfinished = book.unfinished_projects();
    if !unfinished.is_empty() && !discard_unfinished {
        return Err(SaveBlocked::UnfinishedPresent {
            projects: unfinished,
        });
    }

    if metadata.skip {
        return Ok(());
    }

    let missing = metadata.missing_required();
    if !missing.is_empty() {
        return Err(SaveBlocked::MissingMetadata { fields: missing });
    }

    if book.total_fragments() == 0 {
        return Err(SaveBlocked::NoFragments);
    }

    Ok(())
}

/// Serializes completed fragments only; empty projects are left out.
pub fn prepare_annotation(
    video_reference: &str,
    metadata: &VideoMetadata,
    book: &FragmentBook,
) -> Annotation {
    let clips = book
        .projects_with_fragments()
        .map(|(project, fragments)| {
            let records = fragments
                .iter()
                .enumerate()
                .map(|(index, fragment)| ClipRecord {
                    id: index,
                    start_time: format_clip_time(fragment.start),
                    end_time: format_clip_time(fragment.end),
                })
                .collect();
            (project, records)
        })
        .collect();

    Annotation {
        video_reference: video_reference.to_string(),
        metadata: metadata.clone(),
        clips,
    }
}

/// Rebuilds fragments from a stored annotation. Clips that cannot be
/// parsed, belong to unknown projects or do not end after they start are
/// dropped with a warning.
pub fn fragments_from_annotation(stored: &StoredAnnotation) -> Vec<Fragment> {
    let mut fragments = Vec::new();

    for (key, clips) in &stored.clips {
        let Some(project) = Project::from_wire(key) else {
            log_warn!("Ignoring clips for unknown project '{}'", key);
            continue;
        };

        for clip in clips {
            let times = clip
                .start_time
                .seconds()
                .and_then(|start| clip.end_time.seconds().map(|end| (start, end)));
            match times {
                Ok((start, end)) if end > start => {
                    fragments.push(Fragment::new(project, start, end));
                }
                Ok((start, end)) => {
                    log_warn!(
                        "Dropping {} clip with end {} not after start {}",
                        project,
                        end,
                        start
                    );
                }
                Err(err) => {
                    log_warn!("Dropping unreadable {} clip: {}", project, err);
                }
            }
        }
    }

    fragments
}
