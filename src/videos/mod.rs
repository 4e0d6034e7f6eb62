pub mod commands;

use anyhow::{bail, Context, Result};
use reqwest::Url;

/// Normalizes a user-pasted blob URL before it is registered.
pub fn validate_blob_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("video url must not be empty");
    }

    let url = Url::parse(trimmed).with_context(|| format!("'{trimmed}' is not a valid url"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("video url must use http or https");
    }
    if url.host_str().map_or(true, str::is_empty) {
        bail!("video url has no host");
    }
    if url.path().trim_matches('/').is_empty() {
        bail!("video url does not point at a file");
    }

    Ok(url.to_string())
}
