#![allow(dead_code)]

use completion_client::settings::{ApiSettings, DEFAULT_COMPLETION_PATH};
use completion_client::CompletionExecutor;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "Bearer test-key";
pub const REQUEST_ID: &str = "req-0001";

pub struct TestHarness {
    pub mock_server: MockServer,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self {
            mock_server: MockServer::start().await,
        }
    }

    pub fn api_settings(&self) -> ApiSettings {
        let mut api = ApiSettings::new(self.mock_server.uri(), API_KEY);
        api.request_id = REQUEST_ID.to_string();
        api.timeout_secs = 5;
        api
    }

    pub fn executor(&self) -> CompletionExecutor {
        CompletionExecutor::new(&self.api_settings()).unwrap()
    }

    fn completion_mock() -> wiremock::MockBuilder {
        Mock::given(method("POST"))
            .and(path(DEFAULT_COMPLETION_PATH))
            .and(header("Authorization", API_KEY))
            .and(header("X-NCP-CLOVASTUDIO-REQUEST-ID", REQUEST_ID))
            .and(header("Accept", "text/event-stream"))
    }

    pub async fn mount_stream_response<S: AsRef<str>>(&self, lines: &[S]) {
        Self::completion_mock()
            .respond_with(stream_template(lines))
            .mount(&self.mock_server)
            .await;
    }

    /// Answers the first `n` calls with `status`; later calls fall through to
    /// whatever is mounted next.
    pub async fn mount_failures(&self, status: u16, n: u64) {
        Self::completion_mock()
            .respond_with(ResponseTemplate::new(status).set_body_string("busy"))
            .up_to_n_times(n)
            .mount(&self.mock_server)
            .await;
    }

    /// Streams `lines` to requests whose body contains `needle`, at most
    /// `times` times when given.
    pub async fn mount_stream_for<S: AsRef<str>>(&self, needle: &str, lines: &[S], times: Option<u64>) {
        let mock = Self::completion_mock()
            .and(body_string_contains(needle))
            .respond_with(stream_template(lines));
        let mock = match times {
            Some(n) => mock.up_to_n_times(n),
            None => mock,
        };
        mock.mount(&self.mock_server).await;
    }

    pub async fn request_count(&self) -> usize {
        self.mock_server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

pub fn stream_template<S: AsRef<str>>(lines: &[S]) -> ResponseTemplate {
    let body = lines
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("Content-Type", "text/event-stream")
}

pub fn content_frame(content: &str) -> String {
    format!(
        "data:{}",
        serde_json::json!({"message": {"role": "assistant", "content": content}})
    )
}
