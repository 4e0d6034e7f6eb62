use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("session expired, sign in again")]
    Unauthorized,

    #[error("not found on backend")]
    NotFound,

    #[error("video is locked by {}", .holder.as_deref().unwrap_or("another user"))]
    Locked { holder: Option<String> },

    #[error("backend returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("invalid backend url '{0}'")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Json(#[from] serde_json::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;
