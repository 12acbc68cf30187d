/// Placeholder callers substitute when a generation was exhausted.
pub const NOT_AVAILABLE: &str = "N/A";

/// Outcome of a retried generation.
///
/// `content` is only ever `Some` with a non-empty string; exhaustion is
/// reported as `None` rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub content: Option<String>,
    pub attempts: u32,
    pub cached: bool,
}

impl CompletionResponse {
    pub fn completed(content: String, attempts: u32) -> Self {
        debug_assert!(!content.is_empty());
        Self {
            content: Some(content),
            attempts,
            cached: false,
        }
    }

    pub fn exhausted(attempts: u32) -> Self {
        Self {
            content: None,
            attempts,
            cached: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.content.is_some()
    }

    pub fn content_or<'a>(&'a self, sentinel: &'a str) -> &'a str {
        self.content.as_deref().unwrap_or(sentinel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_falls_back_to_sentinel() {
        let response = CompletionResponse::exhausted(3);
        assert!(!response.is_completed());
        assert_eq!(response.content_or(NOT_AVAILABLE), "N/A");
    }

    #[test]
    fn completed_keeps_content() {
        let response = CompletionResponse::completed("calm, nostalgic".to_string(), 2);
        assert!(response.is_completed());
        assert_eq!(response.content_or(NOT_AVAILABLE), "calm, nostalgic");
        assert_eq!(response.attempts, 2);
    }
}
