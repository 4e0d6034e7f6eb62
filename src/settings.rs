use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::editor::state::DEFAULT_MIN_FRAGMENT_SECS;

pub const BACKEND_URL_ENV: &str = "ANNOTATOR_BACKEND_URL";
pub const API_TOKEN_ENV: &str = "ANNOTATOR_API_TOKEN";
const MIN_FRAGMENT_FLOOR_SECS: f64 = 0.001;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotatorSettings {
    pub backend_url: String,
    pub api_token: Option<String>,
    pub min_fragment_secs: f64,
    pub request_timeout_secs: u64,
}

impl Default for AnnotatorSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".into(),
            api_token: None,
            min_fragment_secs: DEFAULT_MIN_FRAGMENT_SECS,
            request_timeout_secs: 30,
        }
    }
}

impl AnnotatorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.backend_url.trim().is_empty() {
            bail!("backend url must not be empty");
        }
        // clip times go out with millisecond precision
        if !(self.min_fragment_secs.is_finite() && self.min_fragment_secs >= MIN_FRAGMENT_FLOOR_SECS)
        {
            bail!("minimum fragment length must be at least {MIN_FRAGMENT_FLOOR_SECS} seconds");
        }
        if self.request_timeout_secs == 0 {
            bail!("request timeout must be at least one second");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Environment values win over whatever the settings file says.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend_url = url;
        }
        if let Some(token) = lookup(API_TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_token = Some(token);
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AnnotatorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {}", path.display(), err);
                AnnotatorSettings::default()
            })
        } else {
            AnnotatorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Stored values, without environment overrides.
    pub fn stored(&self) -> AnnotatorSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn effective(&self) -> AnnotatorSettings {
        self.stored().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn update(&self, settings: AnnotatorSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &AnnotatorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
