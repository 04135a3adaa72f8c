//! Polling progress stream
//!
//! Each subscriber gets its own poll loop over the same cross-queue lookup
//! `get_status` uses. Nothing is shared between streams for the same job.

use epiphany_core::models::JobState;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Coordinator;

/// One snapshot pushed to a progress subscriber.
///
/// Untagged on the wire: `{id, state, progress}` while the job runs, then
/// either `{id, done: true, state, result}` or `{id, status: "not_found"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StreamEvent {
    Done {
        id: String,
        done: bool,
        state: JobState,
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
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
    pub fn not_found(id: &str) -> Self {
        StreamEvent::NotFound {
            id: id.to_string(),
            status: "not_found".to_string(),
        }
    }

    /// Whether this is the last event of its stream
    pub fn is_final(&self) -> bool {
        !matches!(self, StreamEvent::Progress { .. })
    }
}

enum PollState {
    First,
    Polling,
    Finished,
}

impl Coordinator {
    /// Progress snapshots for `job_id` until the job finishes or disappears.
    ///
    /// The first snapshot is taken immediately, later ones every poll
    /// interval. Lookup errors are logged and polling continues; dropping
    /// the stream stops the loop.
    pub fn stream_progress(&self, job_id: String) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let coordinator = self.clone();
        let interval = self.stream_poll_interval;

        stream::unfold(PollState::First, move |state| {
            let coordinator = coordinator.clone();
            let job_id = job_id.clone();
            async move {
                if let PollState::Finished = state {
                    return None;
                }
                if let PollState::Polling = state {
                    tokio::time::sleep(interval).await;
                }

                loop {
                    match coordinator.find_job(&job_id).await {
                        Ok(Some(job)) if job.state.is_terminal() => {
                            let event = StreamEvent::Done {
                                id: job.id,
                                done: true,
                                state: job.state,
                                result: job.result,
                                error: job.failed_reason,
                            };
                            return Some((event, PollState::Finished));
                        }
                        Ok(Some(job)) => {
                            let event = StreamEvent::Progress {
                                id: job.id,
                                state: job.state,
                                progress: job.progress,
                            };
                            return Some((event, PollState::Polling));
                        }
                        Ok(None) => {
                            return Some((StreamEvent::not_found(&job_id), PollState::Finished));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, job.id = %job_id, "Progress poll failed");
                            tokio::time::sleep(interval).await;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        let progress = StreamEvent::Progress {
            id: "3".to_string(),
            state: JobState::Active,
            progress: 10,
        };
        assert_eq!(
            serde_json::to_value(&progress).unwrap(),
            json!({"id": "3", "state": "active", "progress": 10})
        );

        let done = StreamEvent::Done {
            id: "3".to_string(),
            done: true,
            state: JobState::Completed,
            result: Some(json!({"output_url": "https://x/out.png"})),
            error: None,
        };
        assert_eq!(
            serde_json::to_value(&done).unwrap(),
            json!({"id": "3", "done": true, "state": "completed", "result": {"output_url": "https://x/out.png"}})
        );

        assert_eq!(
            serde_json::to_value(StreamEvent::not_found("3")).unwrap(),
            json!({"id": "3", "status": "not_found"})
        );
    }

    #[test]
    fn test_untagged_parse_picks_right_variant() {
        let parsed: StreamEvent =
            serde_json::from_value(json!({"id": "9", "status": "not_found"})).unwrap();
        assert_eq!(parsed, StreamEvent::not_found("9"));
        assert!(parsed.is_final());

        let parsed: StreamEvent =
            serde_json::from_value(json!({"id": "9", "state": "waiting", "progress": 0})).unwrap();
        assert!(!parsed.is_final());

        let parsed: StreamEvent = serde_json::from_value(
            json!({"id": "9", "done": true, "state": "failed", "result": null, "error": "HTTP 500"}),
        )
        .unwrap();
        assert!(matches!(parsed, StreamEvent::Done { error: Some(_), .. }));
    }
}
