use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter, Runtime};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    backend::{BackendClient, SharedBackend, VideoSummary},
    db::{Database, Submission, SubmissionStatus},
    log_error, log_info, log_warn,
};

use super::{
    annotation::{
        check_save, fragments_from_annotation, prepare_annotation, SaveBlocked, VideoMetadata,
    },
    state::{
        CancelOutcome, EndOutcome, Fragment, FragmentBook, Project, ShortFragmentPolicy,
        StartOutcome,
    },
    timeline::{layout, seek_time, TimelineLayout},
};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedVideo {
    pub id: String,
    pub reference: String,
    pub stream_url: String,
    pub duration: f64,
    pub metadata: VideoMetadata,
    pub has_saved_annotation: bool,
}

#[derive(Debug, Default)]
struct EditorSession {
    video: Option<LoadedVideo>,
    book: FragmentBook,
    playhead: f64,
}

impl EditorSession {
    fn duration(&self) -> f64 {
        self.video.as_ref().map_or(0.0, |video| video.duration)
    }

    fn require_video(&self) -> Result<&LoadedVideo> {
        self.video
            .as_ref()
            .ok_or_else(|| anyhow!("load a video first"))
    }

    fn snapshot(&self) -> EditorSnapshot {
        EditorSnapshot {
            video: self.video.clone(),
            timeline: layout(&self.book, self.duration(), self.playhead),
            total_fragments: self.book.total_fragments(),
            book: self.book.clone(),
            playhead: self.playhead,
        }
    }
}

/// Everything the webview needs to redraw the editor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSnapshot {
    pub video: Option<LoadedVideo>,
    pub book: FragmentBook,
    pub timeline: TimelineLayout,
    pub total_fragments: usize,
    pub playhead: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    #[serde(default)]
    pub metadata: Option<VideoMetadata>,
    /// The user agreed to drop fragments that have a start but no end.
    #[serde(default)]
    pub discard_unfinished: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub submission_id: String,
    pub video_id: String,
    pub clip_count: usize,
    pub skipped: bool,
    pub message: Option<String>,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SaveOutcome {
    Saved { report: SaveReport },
    Blocked { reason: SaveBlocked, message: String },
}

impl SaveOutcome {
    fn blocked(reason: SaveBlocked) -> Self {
        SaveOutcome::Blocked {
            message: reason.to_string(),
            reason,
        }
    }
}

/// Where editor notifications go. The app handle forwards them to the webview.
pub trait EditorEvents: Send + Sync {
    fn state_changed(&self, snapshot: EditorSnapshot);
    fn annotation_saved(&self, report: &SaveReport);
}

impl<R: Runtime> EditorEvents for AppHandle<R> {
    fn state_changed(&self, snapshot: EditorSnapshot) {
        if let Err(err) = self.emit("editor-state-changed", snapshot) {
            log_error!("Failed to emit editor-state-changed: {}", err);
        }
    }

    fn annotation_saved(&self, report: &SaveReport) {
        if let Err(err) = self.emit("annotation-saved", report) {
            log_error!("Failed to emit annotation-saved: {}", err);
        }
    }
}

#[derive(Clone)]
pub struct EditorController {
    session: Arc<Mutex<EditorSession>>,
    // one load or close at a time, so a superseded checkout is always released
    load_gate: Arc<Mutex<()>>,
    db: Database,
    backend: SharedBackend,
    events: Arc<dyn EditorEvents>,
}

impl EditorController {
    pub fn new(
        events: impl EditorEvents + 'static,
        db: Database,
        backend: SharedBackend,
        min_fragment_secs: f64,
    ) -> Self {
        let session = EditorSession {
            book: FragmentBook::with_min_duration(min_fragment_secs),
            ..EditorSession::default()
        };

        Self {
            session: Arc::new(Mutex::new(session)),
            load_gate: Arc::new(Mutex::new(())),
            db,
            backend,
            events: Arc::new(events),
        }
    }

    pub async fn snapshot(&self) -> EditorSnapshot {
        self.session.lock().await.snapshot()
    }

    pub async fn set_min_duration(&self, min_fragment_secs: f64) {
        self.session
            .lock()
            .await
            .book
            .set_min_duration(min_fragment_secs);
    }

    /// Checks the video out on the backend and loads its saved annotation.
    /// Any previously loaded video is released first.
    pub async fn load_video(&self, summary: VideoSummary) -> Result<EditorSnapshot> {
        let _loading = self.load_gate.lock().await;
        self.release_current_lock().await;

        let backend = self.backend.current();
        let stream_url = backend.video_stream_url(&summary.id)?;
        backend.lock_video(&summary.id).await?;
        if let Err(err) = self.db.record_lock_acquired(&summary.id, Utc::now()).await {
            log_error!("Failed to record lock for video {}: {}", summary.id, err);
        }

        let stored = match backend.get_annotation(&summary.id).await {
            Ok(stored) => stored,
            Err(err) => {
                self.release_lock(&backend, &summary.id).await;
                return Err(err.into());
            }
        };

        let (fragments, metadata, reference) = match &stored {
            Some(stored) => (
                fragments_from_annotation(stored),
                stored.metadata.clone(),
                stored
                    .video_reference
                    .clone()
                    .unwrap_or_else(|| summary.reference()),
            ),
            None => (Vec::new(), VideoMetadata::default(), summary.reference()),
        };

        log_info!(
            "Loaded video {} with {} saved fragments",
            summary.id,
            fragments.len()
        );

        {
            let mut session = self.session.lock().await;
            session.book.load(fragments);
            session.playhead = 0.0;
            session.video = Some(LoadedVideo {
                id: summary.id.clone(),
                reference,
                stream_url,
                duration: summary.duration.filter(|d| d.is_finite() && *d > 0.0).unwrap_or(0.0),
                metadata,
                has_saved_annotation: stored.is_some(),
            });
        }

        self.emit_state_changed().await;
        Ok(self.snapshot().await)
    }

    pub async fn close_video(&self) -> EditorSnapshot {
        let _loading = self.load_gate.lock().await;
        self.release_current_lock().await;
        self.emit_state_changed().await;
        self.snapshot().await
    }

    /// Called once the player knows the real media duration.
    pub async fn set_duration(&self, duration: f64) -> Result<EditorSnapshot> {
        if !(duration.is_finite() && duration > 0.0) {
            bail!("invalid video duration {duration}");
        }
        {
            let mut session = self.session.lock().await;
            session.require_video()?;
            if let Some(video) = session.video.as_mut() {
                video.duration = duration;
            }
        }
        self.emit_state_changed().await;
        Ok(self.snapshot().await)
    }

    pub async fn update_metadata(&self, metadata: VideoMetadata) -> Result<EditorSnapshot> {
        {
            let mut session = self.session.lock().await;
            let video = session
                .video
                .as_mut()
                .ok_or_else(|| anyhow!("load a video first"))?;
            video.metadata = metadata;
        }
        self.emit_state_changed().await;
        Ok(self.snapshot().await)
    }

    pub async fn start_fragment(
        &self,
        projects: Vec<Project>,
        current_time: f64,
        overwrite: bool,
    ) -> Result<StartOutcome> {
        let outcome = {
            let mut session = self.session.lock().await;
            session.require_video()?;
            let outcome = session
                .book
                .start_fragment(&projects, current_time, overwrite)?;
            session.playhead = current_time;
            outcome
        };
        self.emit_state_changed().await;
        Ok(outcome)
    }

    pub async fn end_fragment(
        &self,
        project: Option<Project>,
        current_time: f64,
        policy: ShortFragmentPolicy,
    ) -> Result<EndOutcome> {
        let outcome = {
            let mut session = self.session.lock().await;
            session.require_video()?;
            let duration = session.duration();
            let outcome = session
                .book
                .end_fragment(project, current_time, duration, policy)?;
            session.playhead = current_time;
            outcome
        };
        if matches!(outcome, EndOutcome::Completed { .. }) {
            self.emit_state_changed().await;
        }
        Ok(outcome)
    }

    pub async fn cancel_fragment(&self, project: Option<Project>) -> Result<CancelOutcome> {
        let outcome = {
            let mut session = self.session.lock().await;
            session.book.cancel_fragment(project)?
        };
        if matches!(outcome, CancelOutcome::Cancelled { .. }) {
            self.emit_state_changed().await;
        }
        Ok(outcome)
    }

    pub async fn delete_fragment(&self, project: Project, fragment_id: &str) -> Result<Fragment> {
        let removed = {
            let mut session = self.session.lock().await;
            session.book.delete_fragment(project, fragment_id)?
        };
        self.emit_state_changed().await;
        Ok(removed)
    }

    /// Moves the playhead to a click at `fraction` of the timeline width.
    pub async fn seek(&self, fraction: f64) -> Result<f64> {
        let time = {
            let mut session = self.session.lock().await;
            session.require_video()?;
            let time = seek_time(fraction, session.duration());
            session.playhead = time;
            time
        };
        self.emit_state_changed().await;
        Ok(time)
    }

    pub async fn save(&self, request: SaveRequest) -> Result<SaveOutcome> {
        let (video, annotation) = {
            let mut session = self.session.lock().await;
            let Some(video) = session.video.clone() else {
                return Ok(SaveOutcome::blocked(SaveBlocked::NoVideo));
            };
            let metadata = request
                .metadata
                .unwrap_or_else(|| video.metadata.clone());

            if let Err(reason) = check_save(&session.book, &metadata, request.discard_unfinished) {
                return Ok(SaveOutcome::blocked(reason));
            }

            let discarded = session.book.discard_unfinished();
            if !discarded.is_empty() {
                log_info!("Discarded unfinished fragments for {:?} before save", discarded);
            }
            if let Some(loaded) = session.video.as_mut() {
                loaded.metadata = metadata.clone();
            }

            let annotation = prepare_annotation(&video.reference, &metadata, &session.book);
            (video, annotation)
        };
        self.emit_state_changed().await;

        let payload = serde_json::to_string(&annotation)?;
        let result = self.backend.current().save_fragments(&annotation).await;

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            video_id: video.id.clone(),
            video_reference: annotation.video_reference.clone(),
            clip_count: annotation.clip_count() as u64,
            skipped: annotation.metadata.skip,
            status: if result.is_ok() {
                SubmissionStatus::Saved
            } else {
                SubmissionStatus::Failed
            },
            error: result.as_ref().err().map(|err| err.to_string()),
            payload,
            submitted_at: Utc::now(),
        };
        if let Err(err) = self.db.insert_submission(&submission).await {
            log_error!("Failed to record submission for video {}: {}", video.id, err);
        }

        let response = result?;
        {
            let mut session = self.session.lock().await;
            if let Some(loaded) = session.video.as_mut().filter(|v| v.id == video.id) {
                loaded.has_saved_annotation = true;
            }
        }

        let report = SaveReport {
            submission_id: submission.id,
            video_id: video.id,
            clip_count: annotation.clip_count(),
            skipped: annotation.metadata.skip,
            message: response.message,
            task_id: response.task_id,
        };

        log_info!(
            "Saved {} clips for video {}",
            report.clip_count,
            report.video_id
        );

        self.events.annotation_saved(&report);
        self.emit_state_changed().await;

        Ok(SaveOutcome::Saved { report })
    }

    /// Best-effort unlock of whatever video is loaded; clears the session.
    pub async fn release_current_lock(&self) {
        let video_id = {
            let mut session = self.session.lock().await;
            session.book.clear();
            session.playhead = 0.0;
            session.video.take().map(|video| video.id)
        };

        if let Some(video_id) = video_id {
            self.release_lock(&self.backend.current(), &video_id).await;
        }
    }

    async fn release_lock(&self, backend: &BackendClient, video_id: &str) {
        // the local record stays open on failure so the next launch retries
        if let Err(err) = backend.unlock_video(video_id).await {
            log_warn!("Failed to unlock video {}: {}", video_id, err);
            return;
        }
        if let Err(err) = self.db.record_lock_released(video_id, Utc::now()).await {
            log_error!("Failed to record unlock for video {}: {}", video_id, err);
        }
    }

    async fn emit_state_changed(&self) {
        let snapshot = self.snapshot().await;
        self.events.state_changed(snapshot);
    }
}

/// Gives back locks left behind by a run that never reached its unload path.
pub async fn release_stale_locks(db: &Database, backend: &BackendClient) -> Result<usize> {
    let held = db.get_held_locks().await?;
    let mut released = 0;

    for lock in held {
        match backend.unlock_video(&lock.video_id).await {
            Ok(()) => {
                db.record_lock_released(&lock.video_id, Utc::now()).await?;
                released += 1;
            }
            Err(err) => {
                log_warn!(
                    "Could not release stale lock on video {} (held since {}): {}",
                    lock.video_id,
                    lock.acquired_at,
                    err
                );
            }
        }
    }

    Ok(released)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use mockito::{Mock, Server, ServerGuard};
    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct RecordedEvents {
        state_changes: StdMutex<usize>,
        saved: StdMutex<Vec<SaveReport>>,
    }

    impl EditorEvents for Arc<RecordedEvents> {
        fn state_changed(&self, _snapshot: EditorSnapshot) {
            *self.state_changes.lock().expect("state lock") += 1;
        }

        fn annotation_saved(&self, report: &SaveReport) {
            self.saved.lock().expect("saved lock").push(report.clone());
        }
    }

    struct Harness {
        _dir: TempDir,
        db: Database,
        server: ServerGuard,
        events: Arc<RecordedEvents>,
        controller: EditorController,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::new(dir.path().join("annotator.sqlite3")).expect("database");
        let server = Server::new_async().await;
        let client =
            BackendClient::new(&server.url(), None, Duration::from_secs(5)).expect("client");
        let events = Arc::new(RecordedEvents::default());
        let controller =
            EditorController::new(events.clone(), db.clone(), SharedBackend::new(client), 1.0);

        Harness {
            _dir: dir,
            db,
            server,
            events,
            controller,
        }
    }

    fn summary(id: &str) -> VideoSummary {
        VideoSummary {
            id: id.to_string(),
            filename: Some(format!("{id}.mp4")),
            status: Some("not_annotated".into()),
            azure_link: None,
            locked_by: None,
            has_annotation: false,
            duration: Some(60.0),
        }
    }

    async fn lockable(server: &mut ServerGuard, id: &str) -> Mock {
        server
            .mock("POST", format!("/video/{id}/lock").as_str())
            .with_status(200)
            .create_async()
            .await
    }

    async fn not_annotated(server: &mut ServerGuard, id: &str) -> Mock {
        server
            .mock("GET", format!("/get_annotation/{id}").as_str())
            .with_status(404)
            .create_async()
            .await
    }

    fn filled_request() -> SaveRequest {
        SaveRequest {
            metadata: Some(VideoMetadata {
                uav_type: Some("fpv".into()),
                video_content: Some("combat".into()),
                ..VideoMetadata::default()
            }),
            discard_unfinished: false,
        }
    }

    #[tokio::test]
    async fn blocked_save_never_reaches_backend() {
        let mut h = harness().await;
        lockable(&mut h.server, "1").await;
        not_annotated(&mut h.server, "1").await;
        let save = h
            .server
            .mock("POST", "/save_fragments")
            .expect(0)
            .create_async()
            .await;

        h.controller.load_video(summary("1")).await.expect("load");
        let outcome = h
            .controller
            .save(SaveRequest::default())
            .await
            .expect("save");

        assert!(matches!(
            outcome,
            SaveOutcome::Blocked {
                reason: SaveBlocked::MissingMetadata { .. },
                ..
            }
        ));
        save.assert_async().await;
        let recorded = h.db.list_submissions(None, 10).await.expect("submissions");
        assert!(recorded.is_empty());
    }

    #[tokio::test]
    async fn failed_save_is_recorded_with_error() {
        let mut h = harness().await;
        lockable(&mut h.server, "1").await;
        not_annotated(&mut h.server, "1").await;
        h.server
            .mock("POST", "/save_fragments")
            .with_status(500)
            .with_body(r#"{"error": "disk full"}"#)
            .create_async()
            .await;

        h.controller.load_video(summary("1")).await.expect("load");
        h.controller
            .start_fragment(vec![Project::Tracking], 2.0, false)
            .await
            .expect("start");
        h.controller
            .end_fragment(None, 6.0, ShortFragmentPolicy::Ask)
            .await
            .expect("end");

        let err = h
            .controller
            .save(filled_request())
            .await
            .expect_err("backend failure");
        assert!(err.to_string().contains("disk full"));

        let recorded = h.db.list_submissions(Some("1".into()), 10).await.expect("submissions");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, SubmissionStatus::Failed);
        assert_eq!(recorded[0].clip_count, 1);
        assert!(recorded[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("disk full")));
        assert!(h.events.saved.lock().expect("saved lock").is_empty());
    }

    #[tokio::test]
    async fn successful_save_reports_and_notifies() {
        let mut h = harness().await;
        lockable(&mut h.server, "1").await;
        not_annotated(&mut h.server, "1").await;
        h.server
            .mock("POST", "/save_fragments")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "video_reference": "1.mp4",
                "clips": {"re-id": [{"id": 0, "start_time": "00:00:01", "end_time": "00:00:04"}]}
            })))
            .with_status(200)
            .with_body(r#"{"message": "queued", "task_id": "t-9"}"#)
            .create_async()
            .await;

        h.controller.load_video(summary("1")).await.expect("load");
        h.controller
            .start_fragment(vec![Project::ReId], 1.0, false)
            .await
            .expect("start");
        h.controller
            .end_fragment(None, 4.0, ShortFragmentPolicy::Ask)
            .await
            .expect("end");

        let outcome = h.controller.save(filled_request()).await.expect("save");
        let report = match outcome {
            SaveOutcome::Saved { report } => report,
            other => panic!("expected saved outcome, got {other:?}"),
        };
        assert_eq!(report.clip_count, 1);
        assert_eq!(report.task_id.as_deref(), Some("t-9"));

        let saved = h.events.saved.lock().expect("saved lock").clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].submission_id, report.submission_id);
        let recorded = h.db.list_submissions(None, 10).await.expect("submissions");
        assert_eq!(recorded[0].status, SubmissionStatus::Saved);
    }

    #[tokio::test]
    async fn failed_annotation_fetch_releases_lock() {
        let mut h = harness().await;
        lockable(&mut h.server, "1").await;
        h.server
            .mock("GET", "/get_annotation/1")
            .with_status(500)
            .create_async()
            .await;
        let unlock = h
            .server
            .mock("POST", "/video/1/unlock")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        assert!(h.controller.load_video(summary("1")).await.is_err());

        unlock.assert_async().await;
        assert!(h.controller.snapshot().await.video.is_none());
        assert!(h.db.get_held_locks().await.expect("held").is_empty());
    }

    #[tokio::test]
    async fn overlapping_loads_keep_a_single_checkout() {
        let mut h = harness().await;
        for id in ["1", "2"] {
            lockable(&mut h.server, id).await;
            not_annotated(&mut h.server, id).await;
            h.server
                .mock("POST", format!("/video/{id}/unlock").as_str())
                .with_status(200)
                .create_async()
                .await;
        }

        let (first, second) = tokio::join!(
            h.controller.load_video(summary("1")),
            h.controller.load_video(summary("2"))
        );
        first.expect("first load");
        second.expect("second load");

        let held = h.db.get_held_locks().await.expect("held");
        assert_eq!(held.len(), 1);
        let loaded = h.controller.snapshot().await.video.expect("video");
        assert_eq!(loaded.id, held[0].video_id);
        assert!(*h.events.state_changes.lock().expect("state lock") >= 2);
    }

    #[tokio::test]
    async fn stale_locks_are_released_only_when_backend_agrees() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::new(dir.path().join("annotator.sqlite3")).expect("database");
        db.record_lock_acquired("5", Utc::now()).await.expect("lock 5");
        db.record_lock_acquired("6", Utc::now()).await.expect("lock 6");

        let mut server = Server::new_async().await;
        let ok = server
            .mock("POST", "/video/5/unlock")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/video/6/unlock")
            .with_status(503)
            .create_async()
            .await;

        let backend =
            BackendClient::new(&server.url(), None, Duration::from_secs(5)).expect("client");
        let released = release_stale_locks(&db, &backend).await.expect("release");

        ok.assert_async().await;
        assert_eq!(released, 1);
        let still_held = db.get_held_locks().await.expect("held");
        assert_eq!(still_held.len(), 1);
        assert_eq!(still_held[0].video_id, "6");
    }

    #[test]
    fn blocked_outcome_carries_readable_message() {
        let outcome = SaveOutcome::blocked(SaveBlocked::NoFragments);
        let value = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(value["kind"], "blocked");
        assert_eq!(value["reason"]["reason"], "noFragments");
        assert_eq!(value["message"], "mark at least one fragment or choose skip");
    }
}
