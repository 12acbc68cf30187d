mod common;

use common::{content_frame, TestHarness};
use completion_client::settings::ApiSettings;
use completion_client::{
    CompletionError, CompletionExecutor, CompletionRequest, Message, RequestParams, RetryPolicy,
    Role,
};
use std::time::Duration;

fn request() -> CompletionRequest {
    CompletionRequest::new(
        vec![
            Message::new(Role::System, "Describe the mood in a few words."),
            Message::new(Role::User, "Text: a lantern drifting on a dark river"),
        ],
        RequestParams {
            top_p: 0.8,
            top_k: 0,
            max_tokens: 100,
            temperature: 0.3,
            repeat_penalty: None,
            stop_before: vec![],
            include_ai_filters: true,
            seed: 42,
        },
    )
}

fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(10),
        Duration::from_millis(40),
    )
}

#[tokio::test]
async fn returns_last_content_frame() {
    let harness = TestHarness::new().await;
    harness
        .mount_stream_response(&[
            "id:aabdfe-dfgwr-edf-hpqwd-f2asd-g".to_string(),
            "event:token".to_string(),
            content_frame("A"),
            String::new(),
            "event:token".to_string(),
            content_frame("B"),
            String::new(),
            "event:result".to_string(),
            content_frame("C"),
            String::new(),
        ])
        .await;

    let content = harness.executor().execute(&request()).await.unwrap();
    assert_eq!(content, "C");
}

#[tokio::test]
async fn malformed_frames_after_content_are_ignored() {
    let harness = TestHarness::new().await;
    harness
        .mount_stream_response(&[
            content_frame("X"),
            "data:{\"message\":".to_string(),
            "data:[DONE]".to_string(),
        ])
        .await;

    let content = harness.executor().execute(&request()).await.unwrap();
    assert_eq!(content, "X");
}

#[tokio::test]
async fn stream_without_content_is_empty() {
    let harness = TestHarness::new().await;
    harness
        .mount_stream_response(&["event:ping", "data:{}", "data:not json"])
        .await;

    let result = harness.executor().execute(&request()).await;
    assert!(matches!(result, Err(CompletionError::EmptyContent)));
}

#[tokio::test]
async fn empty_final_content_is_empty() {
    let harness = TestHarness::new().await;
    harness
        .mount_stream_response(&[content_frame("draft"), content_frame("")])
        .await;

    let result = harness.executor().execute(&request()).await;
    assert!(matches!(result, Err(CompletionError::EmptyContent)));
}

#[tokio::test]
async fn non_success_status_is_propagated() {
    let harness = TestHarness::new().await;
    harness.mount_failures(429, 1).await;

    let result = harness.executor().execute(&request()).await;
    match result {
        Err(CompletionError::Status(status)) => assert_eq!(status.as_u16(), 429),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn connection_failure_is_transport_error() {
    let api = ApiSettings::new("http://127.0.0.1:1", "key");
    let executor = CompletionExecutor::new(&api).unwrap();

    let result = executor.execute(&request()).await;
    assert!(matches!(result, Err(CompletionError::Transport { .. })));
}

#[tokio::test]
async fn server_sees_the_request_as_built() {
    let harness = TestHarness::new().await;
    harness.mount_stream_response(&[content_frame("ok")]).await;

    let sent = request();
    harness.executor().execute(&sent).await.unwrap();

    let received = harness.mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let parsed: CompletionRequest = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(parsed, sent);

    let raw: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(raw["messages"][1]["role"], "user");
    assert_eq!(raw["maxTokens"], 100);
    assert_eq!(raw["includeAiFilters"], true);
    assert_eq!(raw["seed"], 42);
}

#[tokio::test]
async fn retries_through_transient_failures() {
    let harness = TestHarness::new().await;
    harness.mount_failures(503, 2).await;
    harness.mount_stream_response(&[content_frame("finally")]).await;

    let response = harness
        .executor()
        .execute_with_retries(&request(), &quick_policy(5))
        .await;

    assert_eq!(response.content.as_deref(), Some("finally"));
    assert_eq!(response.attempts, 3);
    assert_eq!(harness.request_count().await, 3);
}

#[tokio::test]
async fn exhaustion_returns_no_content_after_budget() {
    let harness = TestHarness::new().await;
    harness.mount_stream_response(&["event:ping"]).await;

    let response = harness
        .executor()
        .execute_with_retries(&request(), &quick_policy(3))
        .await;

    assert!(response.content.is_none());
    assert_eq!(response.attempts, 3);
    assert_eq!(harness.request_count().await, 3);
}

#[tokio::test]
async fn blank_completion_is_retried_until_exhausted() {
    let harness = TestHarness::new().await;
    harness.mount_stream_response(&[content_frame("   \n ")]).await;

    let response = harness
        .executor()
        .execute_with_retries(&request(), &quick_policy(3))
        .await;

    assert!(response.content.is_none());
    assert_eq!(response.attempts, 3);
    assert_eq!(harness.request_count().await, 3);
}
