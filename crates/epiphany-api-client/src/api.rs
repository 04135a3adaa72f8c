//! Domain methods for the Epiphany API client.
//!
//! Models come from `epiphany_core::models`. Response envelopes the server
//! builds on the fly (submit, cancel, delete, pages, stream events) are
//! defined here.

use crate::sse::SseDecoder;
use crate::ApiClient;
use anyhow::Result;
use epiphany_core::models::{
    Asset, CropRequest, EditOperation, Event, EventType, Explain, GenerateImageRequest,
    GenerateVideoRequest, GenerationResponse, ImageUrlRequest, JobRef, JobState, JobView,
    ResizeRequest, UpscaleRequest,
};
use epiphany_core::prompt::EnhancedPrompt;
use futures::{Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use uuid::Uuid;

/// 202 body of every submission route
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub generation_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted: bool,
    #[serde(default)]
    pub objects_deleted: usize,
}

/// One page of a newest-first listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page: Option<i64>,
}

/// Progress snapshot read from `/jobs/{id}/stream`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StreamEvent {
    Done {
        id: String,
        done: bool,
        state: JobState,
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    NotFound {
        id: String,
        status: String,
    },
    Progress {
        id: String,
        state: JobState,
        progress: u8,
    },
}

impl StreamEvent {
    /// The server closes the stream after a final event
    pub fn is_final(&self) -> bool {
        !matches!(self, StreamEvent::Progress { .. })
    }
}

#[derive(Serialize)]
struct EnhanceBody<'a> {
    prompt: &'a str,
}

fn sign_query(signed: bool, ttl_secs: Option<u64>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if signed {
        query.push(("signed", "1".to_string()));
        if let Some(ttl) = ttl_secs {
            query.push(("ttl", ttl.to_string()));
        }
    }
    query
}

fn page_query(page: Option<i64>, limit: Option<i64>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(p) = page {
        query.push(("page", p.to_string()));
    }
    if let Some(l) = limit {
        query.push(("limit", l.to_string()));
    }
    query
}

impl ApiClient {
    /// Rewrite a prompt with the house style suffix.
    pub async fn enhance(&self, prompt: &str) -> Result<EnhancedPrompt> {
        self.post_json("/enhance", &EnhanceBody { prompt }).await
    }

    pub async fn generate_image(&self, request: &GenerateImageRequest) -> Result<SubmitResponse> {
        self.post_json("/generate/image", request).await
    }

    pub async fn generate_video(&self, request: &GenerateVideoRequest) -> Result<SubmitResponse> {
        self.post_json("/generate/video", request).await
    }

    /// Submit an edit with a raw body; the server validates it per operation.
    pub async fn edit<B: Serialize + ?Sized>(
        &self,
        operation: EditOperation,
        body: &B,
    ) -> Result<SubmitResponse> {
        self.post_json(&format!("/edit/{}", operation.as_str()), body)
            .await
    }

    pub async fn upscale(&self, request: &UpscaleRequest) -> Result<SubmitResponse> {
        self.edit(EditOperation::Upscale, request).await
    }

    pub async fn restore_face(&self, request: &ImageUrlRequest) -> Result<SubmitResponse> {
        self.edit(EditOperation::RestoreFace, request).await
    }

    pub async fn remove_background(&self, request: &ImageUrlRequest) -> Result<SubmitResponse> {
        self.edit(EditOperation::RemoveBg, request).await
    }

    pub async fn caption(&self, request: &ImageUrlRequest) -> Result<SubmitResponse> {
        self.edit(EditOperation::Caption, request).await
    }

    pub async fn crop(&self, request: &CropRequest) -> Result<SubmitResponse> {
        self.edit(EditOperation::Crop, request).await
    }

    pub async fn resize(&self, request: &ResizeRequest) -> Result<SubmitResponse> {
        self.edit(EditOperation::Resize, request).await
    }

    /// Job status. With `signed`, output URLs come back presigned for
    /// `ttl_secs` (server default when `None`).
    pub async fn get_job(&self, job_id: &str, signed: bool, ttl_secs: Option<u64>) -> Result<JobView> {
        self.get(&format!("/jobs/{}", job_id), &sign_query(signed, ttl_secs))
            .await
    }

    pub async fn get_job_by_generation(&self, generation_id: Uuid) -> Result<JobRef> {
        self.get(&format!("/generations/{}/job", generation_id), &[])
            .await
    }

    pub async fn cancel(&self, generation_id: Uuid) -> Result<CancelResponse> {
        self.post_empty(&format!("/generations/{}/cancel", generation_id))
            .await
    }

    pub async fn retry(&self, generation_id: Uuid) -> Result<SubmitResponse> {
        self.post_empty(&format!("/generations/{}/retry", generation_id))
            .await
    }

    pub async fn list_generations(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
        signed: bool,
    ) -> Result<Page<GenerationResponse>> {
        let mut query = page_query(page, limit);
        query.extend(sign_query(signed, None));
        self.get("/generations", &query).await
    }

    pub async fn get_generation(&self, generation_id: Uuid, signed: bool) -> Result<GenerationResponse> {
        self.get(
            &format!("/generations/{}", generation_id),
            &sign_query(signed, None),
        )
        .await
    }

    /// Delete a generation, its stored objects, and its rows.
    pub async fn delete_generation(&self, generation_id: Uuid) -> Result<DeleteResponse> {
        self.delete(&format!("/generations/{}", generation_id))
            .await
    }

    pub async fn list_events(
        &self,
        generation_id: Option<Uuid>,
        event_type: Option<EventType>,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Page<Event>> {
        let mut query = page_query(page, limit);
        if let Some(id) = generation_id {
            query.push(("generationId", id.to_string()));
        }
        if let Some(t) = event_type {
            query.push(("type", t.as_str().to_string()));
        }
        self.get("/events", &query).await
    }

    pub async fn list_assets(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
        signed: bool,
    ) -> Result<Page<Asset>> {
        let mut query = page_query(page, limit);
        query.extend(sign_query(signed, None));
        self.get("/assets", &query).await
    }

    pub async fn delete_asset(&self, asset_id: Uuid) -> Result<DeleteResponse> {
        self.delete(&format!("/assets/{}", asset_id)).await
    }

    /// Latest explain row for a generation
    pub async fn get_explain(&self, generation_id: Uuid, signed: bool) -> Result<Explain> {
        self.get(
            &format!("/explain/{}", generation_id),
            &sign_query(signed, None),
        )
        .await
    }

    pub async fn explain_history(&self, generation_id: Uuid) -> Result<Vec<Explain>> {
        self.get(&format!("/explain/{}/history", generation_id), &[])
            .await
    }

    pub async fn refresh_explain(&self, generation_id: Uuid) -> Result<SubmitResponse> {
        self.post_empty(&format!("/explain/{}/refresh", generation_id))
            .await
    }

    /// Follow a job's progress events until the server closes the stream.
    ///
    /// Frames whose data is not a progress snapshot are skipped.
    pub async fn stream_job(&self, job_id: &str) -> Result<impl Stream<Item = Result<StreamEvent>>> {
        let request = self
            .client()
            .get(self.build_url(&format!("/jobs/{}/stream", job_id)))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let response = self.send(request).await?;

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let frames = FramedRead::new(StreamReader::new(body), SseDecoder::default());

        Ok(frames.filter_map(|frame| async move {
            match frame {
                Ok(frame) => serde_json::from_str::<StreamEvent>(&frame.data).ok().map(Ok),
                Err(e) => Some(Err(anyhow::Error::new(e).context("Progress stream failed"))),
            }
        }))
    }

    /// Block until the job reaches a final event and return it.
    pub async fn wait_for_job(&self, job_id: &str) -> Result<StreamEvent> {
        let stream = self.stream_job(job_id).await?;
        futures::pin_mut!(stream);

        while let Some(event) = stream.next().await {
            let event = event?;
            if event.is_final() {
                return Ok(event);
            }
        }
        Err(anyhow::anyhow!(
            "Progress stream for job {} closed before a final event",
            job_id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_event_shapes() {
        let progress: StreamEvent =
            serde_json::from_str(r#"{"id":"1","state":"active","progress":40}"#).unwrap();
        assert_eq!(
            progress,
            StreamEvent::Progress {
                id: "1".to_string(),
                state: JobState::Active,
                progress: 40,
            }
        );
        assert!(!progress.is_final());

        let done: StreamEvent = serde_json::from_str(
            r#"{"id":"1","done":true,"state":"completed","result":{"output_url":"s3://b/o.png"}}"#,
        )
        .unwrap();
        match &done {
            StreamEvent::Done { state, result, error, .. } => {
                assert_eq!(*state, JobState::Completed);
                assert_eq!(result.as_ref().unwrap()["output_url"], "s3://b/o.png");
                assert!(error.is_none());
            }
            other => panic!("Expected done, got {:?}", other),
        }
        assert!(done.is_final());

        let missing: StreamEvent =
            serde_json::from_str(r#"{"id":"9","status":"not_found"}"#).unwrap();
        assert!(matches!(missing, StreamEvent::NotFound { .. }));
        assert!(missing.is_final());
    }

    #[test]
    fn test_sign_query_only_when_signed() {
        assert!(sign_query(false, Some(60)).is_empty());
        assert_eq!(
            sign_query(true, Some(60)),
            vec![("signed", "1".to_string()), ("ttl", "60".to_string())]
        );
        assert_eq!(sign_query(true, None), vec![("signed", "1".to_string())]);
    }

    #[test]
    fn test_delete_response_tolerates_missing_count() {
        let body: DeleteResponse = serde_json::from_str(r#"{"deleted":true}"#).unwrap();
        assert_eq!(body.objects_deleted, 0);
    }
}
