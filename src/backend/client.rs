use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{
    error::{BackendError, BackendResult},
    models::{RegisterVideoRequest, SaveResponse, VideoListing, VideoSummary},
};
use crate::editor::annotation::{Annotation, StoredAnnotation};

/// Thin typed wrapper over the annotation backend's REST endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> BackendResult<Self> {
        let base_url = Url::parse(base_url.trim())
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base())
            .ok_or_else(|| BackendError::InvalidUrl(base_url.to_string()))?;

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn endpoint(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| BackendError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn list_videos(&self) -> BackendResult<Vec<VideoSummary>> {
        let url = self.endpoint(&["get_videos"])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let listing: VideoListing = Self::read_json(response).await?;
        Ok(listing.into_videos())
    }

    /// Registers a video that already lives in blob storage.
    pub async fn register_video(&self, blob_url: &str) -> BackendResult<VideoSummary> {
        let url = self.endpoint(&["add_video"])?;
        let request = self
            .request(Method::POST, url)
            .json(&RegisterVideoRequest { url: blob_url });
        let response = self.send(request).await?;
        Self::read_json(response).await
    }

    pub fn video_stream_url(&self, video_id: &str) -> BackendResult<String> {
        Ok(self.endpoint(&["video", video_id])?.to_string())
    }

    /// `None` when the video has never been annotated.
    pub async fn get_annotation(&self, video_id: &str) -> BackendResult<Option<StoredAnnotation>> {
        let url = self.endpoint(&["get_annotation", video_id])?;
        let response = match self.send(self.request(Method::GET, url)).await {
            Ok(response) => response,
            Err(BackendError::NotFound) => return Ok(None),
            Err(err) => return Err(err),
        };

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(serde_json::from_slice::<Option<StoredAnnotation>>(&bytes)?)
    }

    pub async fn save_fragments(&self, annotation: &Annotation) -> BackendResult<SaveResponse> {
        let url = self.endpoint(&["save_fragments"])?;
        let response = self
            .send(self.request(Method::POST, url).json(annotation))
            .await?;

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(SaveResponse::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn lock_video(&self, video_id: &str) -> BackendResult<()> {
        let url = self.endpoint(&["video", video_id, "lock"])?;
        self.send(self.request(Method::POST, url)).await?;
        Ok(())
    }

    pub async fn unlock_video(&self, video_id: &str) -> BackendResult<()> {
        let url = self.endpoint(&["video", video_id, "unlock"])?;
        self.send(self.request(Method::POST, url)).await?;
        Ok(())
    }
}

fn error_for_status(status: StatusCode, body: &str) -> BackendError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |key: &str| {
        parsed
            .as_ref()
            .and_then(|value| value.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    match status {
        StatusCode::UNAUTHORIZED => BackendError::Unauthorized,
        StatusCode::NOT_FOUND => BackendError::NotFound,
        StatusCode::CONFLICT | StatusCode::LOCKED => BackendError::Locked {
            holder: field("locked_by"),
        },
        _ => {
            let message = field("error")
                .or_else(|| field("message"))
                .or_else(|| field("detail"))
                .unwrap_or_else(|| {
                    let trimmed = body.trim();
                    if trimmed.is_empty() {
                        status
                            .canonical_reason()
                            .unwrap_or("request failed")
                            .to_string()
                    } else {
                        trimmed.to_string()
                    }
                });
            BackendError::Status {
                code: status.as_u16(),
                message,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::annotation::{prepare_annotation, VideoMetadata};
    use crate::editor::state::{FragmentBook, Project, ShortFragmentPolicy};
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::Server, token: Option<&str>) -> BackendClient {
        BackendClient::new(
            &server.url(),
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .expect("client")
    }

    #[test]
    fn rejects_non_http_base_urls() {
        assert!(matches!(
            BackendClient::new("ftp://example.com", None, Duration::from_secs(1)),
            Err(BackendError::InvalidUrl(_))
        ));
        assert!(matches!(
            BackendClient::new("not a url", None, Duration::from_secs(1)),
            Err(BackendError::InvalidUrl(_))
        ));
    }

    #[test]
    fn endpoints_keep_base_path_and_escape_ids() {
        let client = BackendClient::new("http://annotator.local/api", None, Duration::from_secs(1))
            .expect("client");
        assert_eq!(
            client.video_stream_url("42").expect("url"),
            "http://annotator.local/api/video/42"
        );
        assert_eq!(
            client.video_stream_url("a b/c").expect("url"),
            "http://annotator.local/api/video/a%20b%2Fc"
        );
    }

    #[tokio::test]
    async fn lists_wrapped_videos_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/get_videos")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"videos":[{"id":7,"filename":"a.mp4","status":"annotated","has_annotation":true},
                              {"id":"b-8","azure_link":"https://acct.blob.core.windows.net/v/b.mp4"}]}"#,
            )
            .create_async()
            .await;

        let videos = client_for(&server, Some("secret"))
            .list_videos()
            .await
            .expect("videos");

        mock.assert_async().await;
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].id, "7");
        assert!(videos[0].has_annotation);
        assert_eq!(videos[0].reference(), "a.mp4");
        assert_eq!(
            videos[1].reference(),
            "https://acct.blob.core.windows.net/v/b.mp4"
        );
    }

    #[tokio::test]
    async fn lock_conflict_reports_holder() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/video/7/lock")
            .with_status(409)
            .with_body(r#"{"locked_by":"operator-2"}"#)
            .create_async()
            .await;

        let err = client_for(&server, None)
            .lock_video("7")
            .await
            .expect_err("locked");
        assert_eq!(err.to_string(), "video is locked by operator-2");
    }

    #[tokio::test]
    async fn unauthorized_and_server_errors_are_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/video/3/unlock")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("GET", "/get_videos")
            .with_status(500)
            .with_body(r#"{"error":"storage offline"}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(matches!(
            client.unlock_video("3").await,
            Err(BackendError::Unauthorized)
        ));
        match client.list_videos().await {
            Err(BackendError::Status { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "storage offline");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_annotation_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/get_annotation/11")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/get_annotation/12")
            .with_status(200)
            .with_body(r#"{"clips":{"tracking":[{"id":0,"start_time":"00:00:01","end_time":"00:00:04"}]}}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert_eq!(client.get_annotation("11").await.expect("404"), None);

        let stored = client
            .get_annotation("12")
            .await
            .expect("annotation")
            .expect("present");
        assert_eq!(stored.clips["tracking"].len(), 1);
    }

    #[tokio::test]
    async fn save_posts_prepared_annotation() {
        let mut book = FragmentBook::new();
        book.start_fragment(&[Project::ReId], 2.0, false)
            .expect("start");
        book.end_fragment(None, 6.0, 30.0, ShortFragmentPolicy::Ask)
            .expect("end");
        let metadata = VideoMetadata {
            uav_type: Some("fpv".into()),
            video_content: Some("combat".into()),
            ..VideoMetadata::default()
        };
        let annotation = prepare_annotation("clip.mp4", &metadata, &book);

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/save_fragments")
            .match_body(Matcher::PartialJson(json!({
                "video_reference": "clip.mp4",
                "clips": {"re-id": [{"id": 0, "start_time": "00:00:02", "end_time": "00:00:06"}]}
            })))
            .with_status(200)
            .with_body(r#"{"message":"queued","task_id":"t-1"}"#)
            .create_async()
            .await;

        let response = client_for(&server, None)
            .save_fragments(&annotation)
            .await
            .expect("save");

        mock.assert_async().await;
        assert_eq!(response.message.as_deref(), Some("queued"));
        assert_eq!(response.task_id.as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn register_video_sends_blob_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/add_video")
            .match_body(Matcher::Json(json!({
                "url": "https://acct.blob.core.windows.net/v/new.mp4"
            })))
            .with_status(201)
            .with_body(r#"{"id":99,"filename":"new.mp4","status":"processing"}"#)
            .create_async()
            .await;

        let video = client_for(&server, None)
            .register_video("https://acct.blob.core.windows.net/v/new.mp4")
            .await
            .expect("register");

        mock.assert_async().await;
        assert_eq!(video.id, "99");
        assert_eq!(video.status.as_deref(), Some("processing"));
    }
}
