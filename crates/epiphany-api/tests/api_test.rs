//! HTTP router tests.
//!
//! Run with: `cargo test -p epiphany-api --test api_test`

mod helpers;

use axum::http::StatusCode;
use epiphany_core::models::QueueName;
use helpers::inference::{image_result, ScriptedInference};
use helpers::storage::{object_url, RecordingStorage};
use helpers::{test_config, TestHarness, TEST_API_KEY};
use serde_json::{json, Value};

#[tokio::test]
async fn test_generate_image_returns_ids() {
    let harness = TestHarness::new();
    let server = harness.server();

    let response = server
        .post("/v1/generate/image")
        .json(&json!({ "prompt": "a cat", "mode": 0, "aspect": "16:9" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["jobId"], "1");
    assert!(body["generationId"].is_string());

    let job = server.get("/v1/jobs/1").await;
    assert_eq!(job.status_code(), StatusCode::OK);
    let job: Value = job.json();
    assert_eq!(job["state"], "waiting");
    assert_eq!(job["status"], "queued");
    assert_eq!(job["queue"], "generate_image");
}

#[tokio::test]
async fn test_invalid_submission_is_rejected_without_side_effects() {
    let harness = TestHarness::new();
    let server = harness.server();

    let response = server
        .post("/v1/generate/image")
        .json(&json!({ "prompt": "", "mode": 0 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_INPUT");

    let response = server
        .post("/v1/generate/image")
        .json(&json!({ "prompt": "a cat", "mode": 7 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let listing: Value = server.get("/v1/generations").await.json();
    assert_eq!(listing["items"], json!([]));
}

#[tokio::test]
async fn test_disallowed_input_url_is_rejected() {
    let mut config = test_config();
    config.allowed_url_prefixes = vec!["https://cdn.example.com/".to_string()];
    let harness = TestHarness::with(config, RecordingStorage::new(), ScriptedInference::new());
    let server = harness.server();

    let response = server
        .post("/v1/edit/caption")
        .json(&json!({ "imageUrl": "https://evil.example.org/x.png" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "url_not_allowed");

    let response = server
        .post("/v1/edit/caption")
        .json(&json!({ "imageUrl": "https://cdn.example.com/x.png" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_unknown_edit_operation_is_not_found() {
    let harness = TestHarness::new();
    let response = harness
        .server()
        .post("/v1/edit/colorize")
        .json(&json!({ "imageUrl": "https://example.com/x.png" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_enhance_prompt() {
    let harness = TestHarness::new();
    let server = harness.server();

    let body: Value = server
        .post("/v1/enhance")
        .json(&json!({ "prompt": "a cat, sitting" }))
        .await
        .json();
    assert_eq!(body["promptEnhanced"], "a cat, sitting, cinematic, high detail");
    assert_eq!(body["seedPhrases"], json!(["a cat"]));

    let body: Value = server.post("/v1/enhance").json(&json!({})).await.json();
    assert_eq!(
        body["promptEnhanced"],
        "a detailed high-quality image, cinematic, high detail"
    );
}

#[tokio::test]
async fn test_generation_lifecycle_over_http() {
    let harness = TestHarness::new();
    let server = harness.server();
    harness.inference.push_ok(image_result("out"));

    let submitted: Value = server
        .post("/v1/generate/image")
        .json(&json!({ "prompt": "a cat", "mode": 0 }))
        .await
        .json();
    let generation_id = submitted["generationId"].as_str().unwrap().to_string();

    let job_ref: Value = server
        .get(&format!("/v1/generations/{}/job", generation_id))
        .await
        .json();
    assert_eq!(job_ref["queueName"], "generate_image");
    assert_eq!(job_ref["jobId"], submitted["jobId"]);

    harness.run_next(QueueName::GenerateImage).await;

    let job: Value = server
        .get("/v1/jobs/1")
        .add_query_param("signed", "1")
        .add_query_param("ttl", "120")
        .await
        .json();
    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["outputUrl"], format!("{}?sig=120", object_url("out.png")));

    let generation: Value = server
        .get(&format!("/v1/generations/{}", generation_id))
        .await
        .json();
    assert_eq!(generation["status"], "succeeded");
    assert_eq!(generation["outputUrl"], object_url("out.png"));

    let events: Value = server
        .get("/v1/events")
        .add_query_param("generationId", &generation_id)
        .add_query_param("type", "succeeded")
        .await
        .json();
    assert_eq!(events["items"].as_array().unwrap().len(), 1);

    let assets: Value = server
        .get("/v1/assets")
        .add_query_param("signed", "true")
        .await
        .json();
    let urls: Vec<&str> = assets["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls.len(), 2);
    assert!(urls.iter().all(|u| u.ends_with("?sig=3600")));

    let deleted: Value = server
        .delete(&format!("/v1/generations/{}", generation_id))
        .await
        .json();
    assert_eq!(deleted["deleted"], true);
    assert_eq!(deleted["objectsDeleted"], 2);

    let missing = server
        .get(&format!("/v1/generations/{}", generation_id))
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_inference_failure_is_reported_as_job_status() {
    let mut config = test_config();
    config.queue.max_attempts = 1;
    let harness = TestHarness::with(config, RecordingStorage::new(), ScriptedInference::new());
    let server = harness.server();
    harness.inference.push_err("HTTP 500 boom");

    let submitted = server
        .post("/v1/generate/image")
        .json(&json!({ "prompt": "a cat", "mode": 0 }))
        .await;
    assert_eq!(submitted.status_code(), StatusCode::ACCEPTED);
    harness.run_next(QueueName::GenerateImage).await;

    let response = server.get("/v1/jobs/1").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let job: Value = response.json();
    assert_eq!(job["state"], "failed");
    assert_eq!(job["status"], "failed");
    assert!(job["error"].as_str().unwrap().contains("HTTP 500 boom"));
}

#[tokio::test]
async fn test_cancel_and_retry_over_http() {
    let harness = TestHarness::new();
    let server = harness.server();

    let submitted: Value = server
        .post("/v1/generate/video")
        .json(&json!({ "prompt": "waves", "mode": 1, "durationSec": 4 }))
        .await
        .json();
    let generation_id = submitted["generationId"].as_str().unwrap().to_string();

    let cancel: Value = server
        .post(&format!("/v1/generations/{}/cancel", generation_id))
        .await
        .json();
    assert_eq!(cancel, json!({ "cancelled": true }));
    let cancel: Value = server
        .post(&format!("/v1/generations/{}/cancel", generation_id))
        .await
        .json();
    assert_eq!(cancel, json!({ "cancelled": false }));

    let response = server
        .post(&format!("/v1/generations/{}/retry", generation_id))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);
    let retried: Value = response.json();
    assert_ne!(retried["generationId"], submitted["generationId"]);

    let missing = server
        .post("/v1/generations/00000000-0000-0000-0000-000000000000/retry")
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_event_type_is_bad_request() {
    let harness = TestHarness::new();
    let response = harness
        .server()
        .get("/v1/events")
        .add_query_param("type", "exploded")
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let mut config = test_config();
    config.api_key = Some(TEST_API_KEY.to_string());
    let harness = TestHarness::with(config, RecordingStorage::new(), ScriptedInference::new());
    let server = harness.server();

    let denied = server.get("/v1/generations").await;
    assert_eq!(denied.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = denied.json();
    assert_eq!(body["error"], "unauthorized");

    let allowed = server
        .get("/v1/generations")
        .add_header("x-api-key", TEST_API_KEY)
        .await;
    assert_eq!(allowed.status_code(), StatusCode::OK);

    let by_query = server
        .get("/v1/generations")
        .add_query_param("key", TEST_API_KEY)
        .await;
    assert_eq!(by_query.status_code(), StatusCode::OK);

    // Liveness stays public
    let ping = server.get("/v1/ping").await;
    assert_eq!(ping.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_headers_and_denial() {
    let mut config = test_config();
    config.rate_limit_max = 2;
    let harness = TestHarness::with(config, RecordingStorage::new(), ScriptedInference::new());
    let server = harness.server();

    let first = server.get("/v1/ping").await;
    assert_eq!(first.status_code(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");
    assert_eq!(first.headers()["x-ratelimit-window"], "60000");

    server.get("/v1/ping").await;
    let denied = server.get("/v1/ping").await;
    assert_eq!(denied.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert!(denied.headers().contains_key("retry-after"));
    let body: Value = denied.json();
    assert_eq!(body["error"], "rate_limited");
}

#[tokio::test]
async fn test_request_id_is_echoed_into_errors() {
    let harness = TestHarness::new();
    let response = harness
        .server()
        .get("/v1/jobs/42")
        .add_header("x-request-id", "req-abc")
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "req-abc");
    let body: Value = response.json();
    assert_eq!(body["requestId"], "req-abc");
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_health_reports_each_service() {
    let harness = TestHarness::new();
    let response = harness.server().get("/v1/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    for service in ["db", "queue", "storage", "infer_image", "infer_video", "edit", "explain"] {
        assert_eq!(body["services"][service], "healthy", "{}", service);
        assert!(body["services"][format!("{}_ms", service)].is_u64());
    }
}

#[tokio::test]
async fn test_health_degraded_workers_keep_ok() {
    let harness = TestHarness::with(
        test_config(),
        RecordingStorage::new(),
        ScriptedInference::unhealthy(),
    );
    let body: Value = harness.server().get("/v1/health").await.json();
    assert_eq!(body["ok"], true);
    assert!(body["services"]["infer_image"]
        .as_str()
        .unwrap()
        .starts_with("degraded"));
}

#[tokio::test]
async fn test_system_endpoints() {
    let harness = TestHarness::new();
    let server = harness.server();

    let version: Value = server.get("/v1/version").await.json();
    assert_eq!(version["name"], "epiphany");
    assert!(version["version"].is_string());

    let config: Value = server.get("/v1/config").await.json();
    assert_eq!(config["allowNsfw"], false);
    assert_eq!(config["rateLimit"], json!({ "max": 120, "windowMs": 60000 }));

    let rate_limit: Value = server.get("/v1/rate-limit").await.json();
    assert_eq!(rate_limit, json!({ "max": 120, "windowMs": 60000 }));

    let ping: Value = server.get("/v1/ping").await.json();
    assert_eq!(ping, json!({ "pong": true }));

    let time: Value = server.get("/v1/time").await.json();
    assert!(time["now"].is_string());

    let uptime: Value = server.get("/v1/uptime").await.json();
    assert!(uptime["uptimeMs"].as_i64().unwrap() >= 0);

    let queues: Value = server.get("/v1/queues").await.json();
    let names: Vec<&str> = queues
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["generate_image", "generate_video", "edit_image", "explain"]);
}
