//! Progress stream polling, on a paused clock.
//!
//! Run with: `cargo test -p epiphany-api --test stream_test`

mod helpers;

use epiphany_api::StreamEvent;
use epiphany_core::models::{JobState, QueueName};
use futures::StreamExt;
use helpers::inference::image_result;
use helpers::storage::object_url;
use helpers::{image_submission, TestHarness};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_stream_emits_progress_then_done() {
    let harness = TestHarness::new();
    harness.inference.push_ok(image_result("out"));
    let submitted = harness
        .coordinator()
        .submit(image_submission(&harness, "a cat"))
        .await
        .unwrap();

    let stream = harness.coordinator().stream_progress(submitted.job_id.clone());
    futures::pin_mut!(stream);

    let first = stream.next().await.unwrap();
    assert_eq!(
        first,
        StreamEvent::Progress {
            id: submitted.job_id.clone(),
            state: JobState::Waiting,
            progress: 0,
        }
    );

    harness.run_next(QueueName::GenerateImage).await;

    let before = Instant::now();
    let last = stream.next().await.unwrap();
    assert_eq!(before.elapsed(), Duration::from_millis(700));
    match &last {
        StreamEvent::Done {
            id,
            done,
            state,
            result,
            ..
        } => {
            assert_eq!(id, &submitted.job_id);
            assert!(*done);
            assert_eq!(*state, JobState::Completed);
            assert_eq!(
                result.as_ref().unwrap()["output_url"],
                object_url("out.png")
            );
        }
        other => panic!("Expected done event, got {:?}", other),
    }
    assert!(last.is_final());
    assert!(stream.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stream_unknown_job_emits_not_found_once() {
    let harness = TestHarness::new();
    let stream = harness.coordinator().stream_progress("404".to_string());
    futures::pin_mut!(stream);

    let event = stream.next().await.unwrap();
    assert_eq!(event, StreamEvent::not_found("404"));
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        serde_json::json!({"id": "404", "status": "not_found"})
    );
    assert!(stream.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stream_reports_not_found_after_cancel() {
    let harness = TestHarness::new();
    let submitted = harness
        .coordinator()
        .submit(image_submission(&harness, "a cat"))
        .await
        .unwrap();

    let stream = harness.coordinator().stream_progress(submitted.job_id.clone());
    futures::pin_mut!(stream);
    assert!(!stream.next().await.unwrap().is_final());

    harness
        .coordinator()
        .cancel(submitted.generation_id)
        .await
        .unwrap();

    assert_eq!(
        stream.next().await.unwrap(),
        StreamEvent::not_found(&submitted.job_id)
    );
    assert!(stream.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_streams_are_independent() {
    let harness = TestHarness::new();
    let submitted = harness
        .coordinator()
        .submit(image_submission(&harness, "a cat"))
        .await
        .unwrap();

    let b = harness.coordinator().stream_progress(submitted.job_id.clone());
    futures::pin_mut!(b);

    {
        let a = harness.coordinator().stream_progress(submitted.job_id.clone());
        futures::pin_mut!(a);
        assert!(!a.next().await.unwrap().is_final());
    }

    assert!(!b.next().await.unwrap().is_final());
    harness.run_next(QueueName::GenerateImage).await;
    assert!(b.next().await.unwrap().is_final());
}
