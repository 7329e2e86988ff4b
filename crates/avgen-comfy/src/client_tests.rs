//! Tests for the ComfyUI client against a mock server.

use std::time::Duration;

use avgen_models::{ArtifactKind, ArtifactRef, OutputManifest, PollOutcome, RemoteJobId, RemoteJobStatus};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::client::ComfyClient;
use crate::config::ComfyConfig;
use crate::error::ClientError;
use crate::retry::RetryConfig;

// =============================================================================
// Test Helpers
// =============================================================================

fn test_client(server: &MockServer) -> ComfyClient {
    let config = ComfyConfig {
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        timeout: Duration::from_secs(5),
        ..ComfyConfig::with_base_url(server.uri())
    };
    ComfyClient::new(config).unwrap()
}

fn id(s: &str) -> RemoteJobId {
    RemoteJobId::from_string(s)
}

async fn mount_empty_queue(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "queue_running": [],
            "queue_pending": []
        })))
        .mount(server)
        .await;
}

// =============================================================================
// Submit
// =============================================================================

#[tokio::test]
async fn test_submit_returns_prompt_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .and(body_partial_json(json!({"prompt": {"58": {"class_type": "LoadImage"}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prompt_id": "9b7c1d2e-0000-4000-8000-000000000001",
            "number": 12,
            "node_errors": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server);
    let prompt = json!({"58": {"class_type": "LoadImage", "inputs": {"image": "a.jpg"}}});
    let job = client.submit(&prompt).await.unwrap();
    assert_eq!(job.as_str(), "9b7c1d2e-0000-4000-8000-000000000001");
}

#[tokio::test]
async fn test_submit_rejected_prompt_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"type": "prompt_outputs_failed_validation"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_client(&server).submit(&json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(400, _)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_submit_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = test_client(&server).submit(&json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::Server(503, _)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_submit_without_prompt_id_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"number": 3})))
        .mount(&server)
        .await;

    let err = test_client(&server).submit(&json!({})).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let config = ComfyConfig {
        retry: RetryConfig::none(),
        connect_timeout: Duration::from_millis(200),
        ..ComfyConfig::with_base_url("http://127.0.0.1:9")
    };
    let err = ComfyClient::new(config)
        .unwrap()
        .submit(&json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(err.is_retryable());
}

// =============================================================================
// Status
// =============================================================================

#[tokio::test]
async fn test_status_completed_from_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "p1": {
                "status": {"status_str": "success", "completed": true, "messages": []},
                "outputs": {"81": {"gifs": [{"filename": "FantasyTalking_00003.mp4", "subfolder": "", "type": "output"}]}}
            }
        })))
        .mount(&server)
        .await;

    let status = test_client(&server).status(&id("p1")).await.unwrap();
    let RemoteJobStatus::Completed(manifest) = status else {
        panic!("expected completed, got {:?}", status);
    };
    assert_eq!(manifest.artifacts.iter().filter(|a| a.is_video()).count(), 1);
}

#[tokio::test]
async fn test_status_falls_back_to_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "queue_running": [[1, "other", {}, {}, []]],
            "queue_pending": [[2, "p0", {}, {}, []], [3, "p2", {}, {}, []]]
        })))
        .mount(&server)
        .await;

    let status = test_client(&server).status(&id("p2")).await.unwrap();
    assert_eq!(status, RemoteJobStatus::Queued { position: Some(2) });
}

#[tokio::test]
async fn test_status_unknown_job_is_queued_without_position() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/p3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    mount_empty_queue(&server).await;

    let status = test_client(&server).status(&id("p3")).await.unwrap();
    assert_eq!(status, RemoteJobStatus::Queued { position: None });
}

#[tokio::test]
async fn test_status_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/p4"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .mount(&server)
        .await;

    let err = test_client(&server).status(&id("p4")).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidResponse(_)));
}

// =============================================================================
// Polling
// =============================================================================

#[tokio::test]
async fn test_poll_stops_on_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bad": {
                "status": {
                    "status_str": "error",
                    "messages": [["execution_error", {"exception_message": "Allocation on device"}]]
                },
                "outputs": {}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = test_client(&server)
        .poll_until_done(&id("bad"), Duration::from_secs(5), Duration::from_millis(10))
        .await
        .unwrap();
    assert!(matches!(outcome, PollOutcome::Failed { ref reason, .. } if reason.contains("Allocation")));
}

#[tokio::test]
async fn test_poll_times_out_distinct_from_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    mount_empty_queue(&server).await;

    let outcome = test_client(&server)
        .poll_until_done(&id("slow"), Duration::from_millis(60), Duration::from_millis(10))
        .await
        .unwrap();
    assert!(matches!(outcome, PollOutcome::TimedOut { .. }));
    assert!(outcome.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn test_poll_survives_transient_errors() {
    let server = MockServer::start().await;
    // First two checks hit a restarting server, then the job is done.
    Mock::given(method("GET"))
        .and(path("/history/flaky"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "flaky": {
                "status": {"completed": true},
                "outputs": {"9": {"videos": [{"filename": "clip.mp4"}]}}
            }
        })))
        .mount(&server)
        .await;

    let outcome = test_client(&server)
        .poll_until_done(&id("flaky"), Duration::from_secs(5), Duration::from_millis(5))
        .await
        .unwrap();
    assert!(matches!(outcome, PollOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_poll_survives_garbled_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>bad gateway</html>"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/p1"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "p1": {
                "status": {"status_str": "success", "completed": true},
                "outputs": {"30": {"gifs": [{"filename": "FantasyTalking_00001.mp4", "type": "output"}]}}
            }
        })))
        .mount(&server)
        .await;

    let outcome = test_client(&server)
        .poll_until_done(&id("p1"), Duration::from_secs(5), Duration::from_millis(5))
        .await
        .unwrap();
    match outcome {
        PollOutcome::Completed { manifest, .. } => {
            assert_eq!(manifest.artifacts[0].filename, "FantasyTalking_00001.mp4")
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_poll_aborts_on_rejected_status_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/p2"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let err = test_client(&server)
        .poll_until_done(&id("p2"), Duration::from_secs(5), Duration::from_millis(5))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Rejected(403, _)));
}

// =============================================================================
// Upload / Download
// =============================================================================

#[tokio::test]
async fn test_upload_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "avatar_photo.jpg",
            "subfolder": "",
            "type": "input"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let photo = dir.path().join("avatar_photo.jpg");
    tokio::fs::write(&photo, b"\xff\xd8\xff\xe0fake-jpeg").await.unwrap();

    let uploaded = test_client(&server).upload(&photo, None).await.unwrap();
    assert_eq!(uploaded.input_reference(), "avatar_photo.jpg");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"image\"; filename=\"avatar_photo.jpg\""));
    assert!(body.contains("name=\"overwrite\""));
}

#[tokio::test]
async fn test_download_reports_each_artifact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("filename", "FantasyTalking_00001.mp4"))
        .and(query_param("type", "output"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 2048]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("filename", "gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let manifest = OutputManifest {
        artifacts: vec![
            ArtifactRef {
                filename: "FantasyTalking_00001.mp4".to_string(),
                subfolder: String::new(),
                storage: "output".to_string(),
                kind: ArtifactKind::Video,
            },
            ArtifactRef {
                filename: "gone.png".to_string(),
                subfolder: "previews".to_string(),
                storage: "temp".to_string(),
                kind: ArtifactKind::Image,
            },
        ],
        execution_time: None,
    };

    let dir = tempfile::tempdir().unwrap();
    let results = test_client(&server).download(&manifest, dir.path()).await;

    assert_eq!(results.len(), 2);
    let video = results[0].path().unwrap();
    assert_eq!(tokio::fs::metadata(video).await.unwrap().len(), 2048);
    assert!(matches!(results[1].result, Err(ClientError::NotFound(_))));
    assert!(!dir.path().join("gone.part").exists());
}

// =============================================================================
// Service info
// =============================================================================

#[tokio::test]
async fn test_system_stats_and_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "system": {"os": "nt"},
            "devices": [{"name": "cuda:0 NVIDIA GeForce RTX 4090", "type": "cuda",
                         "vram_total": 25757220864u64, "vram_free": 20000000000u64}]
        })))
        .mount(&server)
        .await;
    mount_empty_queue(&server).await;

    let client = test_client(&server);
    let stats = client.system_stats().await.unwrap();
    assert_eq!(stats.devices.len(), 1);
    assert_eq!(stats.devices[0].vram_used(), 5757220864);
    assert!(client.is_reachable().await);

    let queue = client.queue().await.unwrap();
    assert_eq!((queue.running, queue.pending), (0, 0));
}

#[test]
fn test_error_from_http_status() {
    assert!(matches!(ClientError::from_http_status(404, "x"), ClientError::NotFound(_)));
    assert!(ClientError::from_http_status(429, "x").is_retryable());
    assert!(ClientError::from_http_status(500, "x").is_retryable());
    assert!(!ClientError::from_http_status(400, "x").is_retryable());

    assert!(ClientError::invalid_response("truncated body").is_transient_for_poll());
    assert!(ClientError::from_http_status(404, "x").is_transient_for_poll());
    assert!(ClientError::from_http_status(502, "x").is_transient_for_poll());
    assert!(!ClientError::from_http_status(403, "x").is_transient_for_poll());
    assert!(!ClientError::workflow("node 72 not found").is_transient_for_poll());
}
