mod backend;
mod db;
mod editor;
mod settings;
mod utils;
mod videos;

use backend::{BackendClient, SharedBackend};
use db::Database;
use editor::{
    commands::{
        cancel_fragment, close_video, delete_fragment, end_fragment, get_editor_state,
        load_video, save_annotation, seek_position, set_video_duration, start_fragment,
        update_metadata,
    },
    release_stale_locks, EditorController,
};
use log::{info, warn};
use settings::{AnnotatorSettings, SettingsStore};
use tauri::{Manager, State, WindowEvent};
use videos::commands::{
    list_submissions, list_videos, open_video_in_browser, register_video, video_stream_url,
};

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) backend: SharedBackend,
    pub(crate) editor: EditorController,
    pub(crate) settings: SettingsStore,
}

fn build_backend(settings: &AnnotatorSettings) -> anyhow::Result<BackendClient> {
    BackendClient::new(
        &settings.backend_url,
        settings.api_token.clone(),
        settings.request_timeout(),
    )
    .map_err(anyhow::Error::from)
}

#[tauri::command]
fn get_settings(state: State<AppState>) -> Result<AnnotatorSettings, String> {
    Ok(state.settings.stored())
}

#[tauri::command]
async fn update_settings(
    settings: AnnotatorSettings,
    state: State<'_, AppState>,
) -> Result<AnnotatorSettings, String> {
    settings.validate().map_err(|e| e.to_string())?;

    // build the client first so a bad url never reaches disk
    let effective = settings
        .clone()
        .with_overrides(|key| std::env::var(key).ok());
    let client = build_backend(&effective).map_err(|e| e.to_string())?;

    state
        .settings
        .update(settings.clone())
        .map_err(|e| e.to_string())?;
    info!("Settings updated, backend at {}", client.base_url());
    state.backend.replace(client);
    state.editor.set_min_duration(effective.min_fragment_secs).await;

    Ok(settings)
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Fragment annotator starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let database = Database::new(app_data_dir.join("annotator.sqlite3"))?;
                let settings_store = SettingsStore::new(app_data_dir.join("settings.json"))?;
                let settings = settings_store.effective();

                let client = build_backend(&settings).or_else(|err| {
                    warn!("Falling back to default backend settings: {err}");
                    build_backend(&AnnotatorSettings::default())
                })?;

                // Give back checkouts left open when the app last exited uncleanly.
                {
                    let db_for_recovery = database.clone();
                    let client_for_recovery = client.clone();
                    let recovery = tauri::async_runtime::block_on(async move {
                        release_stale_locks(&db_for_recovery, &client_for_recovery).await
                    });
                    match recovery {
                        Ok(0) => {}
                        Ok(count) => info!("Released {count} stale video locks"),
                        Err(err) => warn!("Stale lock recovery failed: {err}"),
                    }
                }

                let backend = SharedBackend::new(client);
                let editor = EditorController::new(
                    app.handle().clone(),
                    database.clone(),
                    backend.clone(),
                    settings.min_fragment_secs,
                );

                app.manage(AppState {
                    db: database,
                    backend,
                    editor,
                    settings: settings_store,
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Destroyed = event {
                if let Some(state) = window.try_state::<AppState>() {
                    let editor = state.editor.clone();
                    tauri::async_runtime::block_on(async move {
                        editor.release_current_lock().await;
                    });
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            get_settings,
            update_settings,
            list_videos,
            register_video,
            video_stream_url,
            open_video_in_browser,
            list_submissions,
            get_editor_state,
            load_video,
            close_video,
            set_video_duration,
            update_metadata,
            start_fragment,
            end_fragment,
            cancel_fragment,
            delete_fragment,
            seek_position,
            save_annotation,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
