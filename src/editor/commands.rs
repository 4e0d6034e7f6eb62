use tauri::State;

use crate::{
    backend::VideoSummary,
    editor::{
        annotation::VideoMetadata,
        controller::{SaveOutcome, SaveRequest},
        state::{CancelOutcome, EndOutcome, Fragment, Project, ShortFragmentPolicy, StartOutcome},
        EditorController, EditorSnapshot,
    },
    AppState,
};

fn controller_from_state(state: &State<'_, AppState>) -> EditorController {
    state.editor.clone()
}

#[tauri::command]
pub async fn get_editor_state(state: State<'_, AppState>) -> Result<EditorSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.snapshot().await)
}

#[tauri::command]
pub async fn load_video(
    state: State<'_, AppState>,
    video: VideoSummary,
) -> Result<EditorSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.load_video(video).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn close_video(state: State<'_, AppState>) -> Result<EditorSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.close_video().await)
}

#[tauri::command]
pub async fn set_video_duration(
    state: State<'_, AppState>,
    duration: f64,
) -> Result<EditorSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .set_duration(duration)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn update_metadata(
    state: State<'_, AppState>,
    metadata: VideoMetadata,
) -> Result<EditorSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .update_metadata(metadata)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn start_fragment(
    state: State<'_, AppState>,
    projects: Vec<Project>,
    current_time: f64,
    overwrite: Option<bool>,
) -> Result<StartOutcome, String> {
    let controller = controller_from_state(&state);
    controller
        .start_fragment(projects, current_time, overwrite.unwrap_or(false))
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn end_fragment(
    state: State<'_, AppState>,
    project: Option<Project>,
    current_time: f64,
    policy: Option<ShortFragmentPolicy>,
) -> Result<EndOutcome, String> {
    let controller = controller_from_state(&state);
    controller
        .end_fragment(project, current_time, policy.unwrap_or_default())
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn cancel_fragment(
    state: State<'_, AppState>,
    project: Option<Project>,
) -> Result<CancelOutcome, String> {
    let controller = controller_from_state(&state);
    controller
        .cancel_fragment(project)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn delete_fragment(
    state: State<'_, AppState>,
    project: Project,
    fragment_id: String,
) -> Result<Fragment, String> {
    let controller = controller_from_state(&state);
    controller
        .delete_fragment(project, &fragment_id)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn seek_position(state: State<'_, AppState>, fraction: f64) -> Result<f64, String> {
    let controller = controller_from_state(&state);
    controller.seek(fraction).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn save_annotation(
    state: State<'_, AppState>,
    request: Option<SaveRequest>,
) -> Result<SaveOutcome, String> {
    let controller = controller_from_state(&state);
    controller
        .save(request.unwrap_or_default())
        .await
        .map_err(|e| e.to_string())
}
