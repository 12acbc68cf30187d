pub mod batch;
pub mod cli;
pub mod error;
pub mod executor;
pub mod preset;
pub mod refine;
pub mod retry;
pub mod schemas;
pub mod score;
pub mod settings;
pub mod sse;

pub use error::CompletionError;
pub use executor::CompletionExecutor;
pub use retry::{execute_with_retries, RetryPolicy};
pub use schemas::completion_request::{CompletionRequest, Message, RequestParams, Role};
pub use schemas::completion_response::{CompletionResponse, NOT_AVAILABLE};
pub use settings::Settings;
