use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::timeline::format_timestamp;

/// Shortest fragment accepted without asking to extend it.
pub const DEFAULT_MIN_FRAGMENT_SECS: f64 = 1.0;

/// Labeling pipelines a fragment can be tagged for. Ordering follows the
/// declaration order and drives every per-project listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Project {
    #[serde(rename = "motion-det")]
    MotionDet,
    #[serde(rename = "tracking")]
    Tracking,
    #[serde(rename = "mil-hardware")]
    MilHardware,
    #[serde(rename = "re-id")]
    ReId,
}

impl Project {
    pub const ALL: [Project; 4] = [
        Project::MotionDet,
        Project::Tracking,
        Project::MilHardware,
        Project::ReId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Project::MotionDet => "motion-det",
            Project::Tracking => "tracking",
            Project::MilHardware => "mil-hardware",
            Project::ReId => "re-id",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        Project::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

impl std::fmt::Display for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub id: String,
    pub project: Project,
    pub start: f64,
    pub end: f64,
    pub start_formatted: String,
    pub end_formatted: String,
}

impl Fragment {
    pub fn new(project: Project, start: f64, end: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project,
            start,
            end,
            start_formatted: format_timestamp(start),
            end_formatted: format_timestamp(end),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnfinishedFragment {
    pub start: f64,
    pub start_formatted: String,
}

impl UnfinishedFragment {
    fn at(start: f64) -> Self {
        Self {
            start,
            start_formatted: format_timestamp(start),
        }
    }
}

/// What to do when an end mark lands closer than the minimum duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ShortFragmentPolicy {
    /// Report the proposed end and leave the state alone.
    #[default]
    Ask,
    Extend,
    Abort,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FragmentError {
    #[error("select at least one project first")]
    NoProjectSelected,
    #[error("no unfinished fragment for project {0}")]
    NoUnfinishedFragment(Project),
    #[error("no unfinished fragments to finish")]
    NoUnfinishedFragments,
    #[error("end time {end:.2}s must be after start time {start:.2}s")]
    EndNotAfterStart { start: f64, end: f64 },
    #[error("fragment is shorter than the {min_secs:.1}s minimum")]
    TooShort { min_secs: f64 },
    #[error("fragment {id} not found in project {project}")]
    FragmentNotFound { project: Project, id: String },
    #[error("invalid playback time {0}")]
    InvalidTime(f64),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub started: Vec<Project>,
    /// Projects that already had an unfinished fragment and were left as-is.
    pub needs_overwrite: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EndOutcome {
    Completed {
        fragment: Fragment,
    },
    #[serde(rename_all = "camelCase")]
    ChooseProject {
        eligible: Vec<Project>,
    },
    /// `proposed_end` is absent while the video duration is still unknown.
    #[serde(rename_all = "camelCase")]
    TooShort {
        project: Project,
        start: f64,
        proposed_end: Option<f64>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CancelOutcome {
    Cancelled { project: Project },
    ChooseProject { eligible: Vec<Project> },
}

enum Target {
    Single(Project),
    Ambiguous(Vec<Project>),
}

/// Per-project fragment state for the loaded video.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentBook {
    fragments: BTreeMap<Project, Vec<Fragment>>,
    unfinished: BTreeMap<Project, UnfinishedFragment>,
    min_duration: f64,
}

impl Default for FragmentBook {
    fn default() -> Self {
        Self {
            fragments: BTreeMap::new(),
            unfinished: BTreeMap::new(),
            min_duration: DEFAULT_MIN_FRAGMENT_SECS,
        }
    }
}

fn check_time(value: f64) -> Result<(), FragmentError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FragmentError::InvalidTime(value))
    }
}

impl FragmentBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_duration(min_duration: f64) -> Self {
        let mut book = Self::default();
        book.set_min_duration(min_duration);
        book
    }

    pub fn set_min_duration(&mut self, min_duration: f64) {
        if min_duration.is_finite() && min_duration > 0.0 {
            self.min_duration = min_duration;
        }
    }

    pub fn fragments(&self, project: Project) -> &[Fragment] {
        self.fragments
            .get(&project)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Non-empty project buckets in project order.
    pub fn projects_with_fragments(&self) -> impl Iterator<Item = (Project, &[Fragment])> {
        self.fragments
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(project, list)| (*project, list.as_slice()))
    }

    pub fn unfinished(&self, project: Project) -> Option<&UnfinishedFragment> {
        self.unfinished.get(&project)
    }

    pub fn unfinished_entries(&self) -> impl Iterator<Item = (Project, &UnfinishedFragment)> {
        self.unfinished.iter().map(|(project, u)| (*project, u))
    }

    pub fn unfinished_projects(&self) -> Vec<Project> {
        self.unfinished.keys().copied().collect()
    }

    pub fn total_fragments(&self) -> usize {
        self.fragments.values().map(Vec::len).sum()
    }

    pub fn start_fragment(
        &mut self,
        active_projects: &[Project],
        current_time: f64,
        overwrite: bool,
    ) -> Result<StartOutcome, FragmentError> {
        check_time(current_time)?;
        if active_projects.is_empty() {
            return Err(FragmentError::NoProjectSelected);
        }

        let mut outcome = StartOutcome {
            started: Vec::new(),
            needs_overwrite: Vec::new(),
        };

        for &project in active_projects {
            if outcome.started.contains(&project) || outcome.needs_overwrite.contains(&project) {
                continue;
            }
            if self.unfinished.contains_key(&project) && !overwrite {
                outcome.needs_overwrite.push(project);
                continue;
            }
            self.unfinished
                .insert(project, UnfinishedFragment::at(current_time));
            outcome.started.push(project);
        }

        Ok(outcome)
    }

    pub fn end_fragment(
        &mut self,
        project: Option<Project>,
        current_time: f64,
        duration: f64,
        policy: ShortFragmentPolicy,
    ) -> Result<EndOutcome, FragmentError> {
        check_time(current_time)?;
        let project = match self.resolve_target(project)? {
            Target::Single(project) => project,
            Target::Ambiguous(eligible) => return Ok(EndOutcome::ChooseProject { eligible }),
        };

        let start = self
            .unfinished(project)
            .map(|u| u.start)
            .ok_or(FragmentError::NoUnfinishedFragment(project))?;

        if current_time <= start {
            return Err(FragmentError::EndNotAfterStart {
                start,
                end: current_time,
            });
        }

        let mut end = current_time;
        if end - start < self.min_duration {
            let proposed_end = self.extended_end(start, duration);
            match policy {
                ShortFragmentPolicy::Ask => {
                    return Ok(EndOutcome::TooShort {
                        project,
                        start,
                        proposed_end,
                    })
                }
                ShortFragmentPolicy::Abort => {
                    return Err(FragmentError::TooShort {
                        min_secs: self.min_duration,
                    })
                }
                ShortFragmentPolicy::Extend => {
                    let Some(proposed_end) = proposed_end else {
                        return Err(FragmentError::TooShort {
                            min_secs: self.min_duration,
                        });
                    };
                    if proposed_end <= start {
                        return Err(FragmentError::EndNotAfterStart {
                            start,
                            end: proposed_end,
                        });
                    }
                    end = proposed_end;
                }
            }
        }

        let fragment = Fragment::new(project, start, end);
        self.unfinished.remove(&project);
        self.fragments
            .entry(project)
            .or_default()
            .push(fragment.clone());

        Ok(EndOutcome::Completed { fragment })
    }

    pub fn cancel_fragment(
        &mut self,
        project: Option<Project>,
    ) -> Result<CancelOutcome, FragmentError> {
        match self.resolve_target(project)? {
            Target::Single(project) => {
                self.unfinished.remove(&project);
                Ok(CancelOutcome::Cancelled { project })
            }
            Target::Ambiguous(eligible) => Ok(CancelOutcome::ChooseProject { eligible }),
        }
    }

    pub fn delete_fragment(&mut self, project: Project, id: &str) -> Result<Fragment, FragmentError> {
        let not_found = || FragmentError::FragmentNotFound {
            project,
            id: id.to_string(),
        };
        let list = self.fragments.get_mut(&project).ok_or_else(not_found)?;
        let index = list
            .iter()
            .position(|fragment| fragment.id == id)
            .ok_or_else(not_found)?;
        let removed = list.remove(index);
        if list.is_empty() {
            self.fragments.remove(&project);
        }
        Ok(removed)
    }

    pub fn discard_unfinished(&mut self) -> Vec<Project> {
        let discarded = self.unfinished_projects();
        self.unfinished.clear();
        discarded
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
        self.unfinished.clear();
    }

    /// Replaces all state with previously saved fragments.
    pub fn load(&mut self, fragments: Vec<Fragment>) {
        self.clear();
        for fragment in fragments {
            self.fragments
                .entry(fragment.project)
                .or_default()
                .push(fragment);
        }
    }

    /// Capped at the video duration; `None` until the duration is known.
    fn extended_end(&self, start: f64, duration: f64) -> Option<f64> {
        if duration.is_finite() && duration > 0.0 {
            Some((start + self.min_duration).min(duration))
        } else {
            None
        }
    }

    fn resolve_target(&self, project: Option<Project>) -> Result<Target, FragmentError> {
        if let Some(project) = project {
            return if self.unfinished.contains_key(&project) {
                Ok(Target::Single(project))
            } else {
                Err(FragmentError::NoUnfinishedFragment(project))
            };
        }

        let eligible = self.unfinished_projects();
        match eligible.len() {
            0 => Err(FragmentError::NoUnfinishedFragments),
            1 => Ok(Target::Single(eligible[0])),
            _ => Ok(Target::Ambiguous(eligible)),
        }
    }
}
