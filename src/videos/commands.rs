use tauri::{AppHandle, State};
use tauri_plugin_opener::OpenerExt;

use crate::{backend::VideoSummary, db::Submission, videos::validate_blob_url, AppState};

const DEFAULT_SUBMISSION_LIMIT: u32 = 50;

#[tauri::command]
pub async fn list_videos(state: State<'_, AppState>) -> Result<Vec<VideoSummary>, String> {
    let backend = state.backend.current();
    backend.list_videos().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn register_video(
    state: State<'_, AppState>,
    url: String,
) -> Result<VideoSummary, String> {
    let url = validate_blob_url(&url).map_err(|e| e.to_string())?;
    let backend = state.backend.current();
    backend
        .register_video(&url)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn video_stream_url(state: State<'_, AppState>, video_id: String) -> Result<String, String> {
    state
        .backend
        .current()
        .video_stream_url(&video_id)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn open_video_in_browser(
    app_handle: AppHandle,
    state: State<'_, AppState>,
    video_id: String,
) -> Result<(), String> {
    let url = state
        .backend
        .current()
        .video_stream_url(&video_id)
        .map_err(|e| e.to_string())?;
    app_handle
        .opener()
        .open_url(url, None::<&str>)
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn list_submissions(
    state: State<'_, AppState>,
    video_id: Option<String>,
    limit: Option<u32>,
) -> Result<Vec<Submission>, String> {
    let db = &state.db;
    db.list_submissions(video_id, limit.unwrap_or(DEFAULT_SUBMISSION_LIMIT))
        .await
        .map_err(|e| e.to_string())
}
