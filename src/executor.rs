use crate::error::CompletionError;
use crate::retry::{self, RetryPolicy};
use crate::schemas::completion_request::CompletionRequest;
use crate::schemas::completion_response::CompletionResponse;
use crate::settings::ApiSettings;
use crate::sse::ContentScanner;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Calls a chat-completion endpoint that answers with an SSE stream.
#[derive(Clone)]
pub struct CompletionExecutor {
    inner: Arc<Client>,
    endpoint: String,
    api_key: String,
    request_id_header: String,
    request_id: String,
}

impl CompletionExecutor {
    pub fn new(api: &ApiSettings) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;

        Ok(Self {
            inner: Arc::new(client),
            endpoint: api.endpoint(),
            api_key: api.api_key.clone(),
            request_id_header: api.request_id_header.clone(),
            request_id: api.request_id.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Performs one streaming call and returns the last `message.content`
    /// seen in the stream.
    ///
    /// Malformed frames are skipped. A stream that never carries non-empty
    /// content is reported as [`CompletionError::EmptyContent`].
    pub async fn execute(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let response = self
            .inner
            .post(&self.endpoint)
            .header(AUTHORIZATION, &self.api_key)
            .header(self.request_id_header.as_str(), &self.request_id)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response body".to_string());
            tracing::debug!("completion endpoint returned {}: {}", status, error_body);
            return Err(CompletionError::Status(status));
        }

        let mut scanner = ContentScanner::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            scanner.feed(&chunk?);
        }

        match scanner.finish() {
            Some(content) if !content.is_empty() => Ok(content),
            _ => Err(CompletionError::EmptyContent),
        }
    }

    /// Repeats [`execute`](Self::execute) with the same request under `policy`.
    pub async fn execute_with_retries(
        &self,
        request: &CompletionRequest,
        policy: &RetryPolicy,
    ) -> CompletionResponse {
        retry::execute_with_retries(policy, || self.execute(request)).await
    }
}
