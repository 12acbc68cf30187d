//! Extraction of `message.content` from a server-sent-event stream.

use serde_json::Value;

const DATA_PREFIX: &str = "data:";

/// Returns the `message.content` carried by one SSE line, if any.
///
/// Lines that are not `data:` frames, frames whose payload is not valid JSON,
/// and frames without a string `message.content` all yield `None`.
pub fn extract_content(line: &str) -> Option<String> {
    let payload = line.strip_prefix(DATA_PREFIX)?;
    let frame: Value = serde_json::from_str(payload).ok()?;
    frame
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_owned)
}

/// Incremental scanner over the raw bytes of an SSE response.
///
/// Chunks may split lines anywhere; only complete lines are inspected. The
/// last `message.content` observed wins.
#[derive(Debug, Default)]
pub struct ContentScanner {
    pending: Vec<u8>,
    content: Option<String>,
    frames: usize,
}

impl ContentScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.scan_line(&line[..pos]);
        }
    }

    /// Flushes an unterminated trailing line and returns the captured content.
    pub fn finish(mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.scan_line(&line);
        }
        tracing::trace!("scanned {} content frames", self.frames);
        self.content
    }

    fn scan_line(&mut self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(raw);
        if let Some(content) = extract_content(&line) {
            self.frames += 1;
            self.content = Some(content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(chunks: &[&str]) -> Option<String> {
        let mut scanner = ContentScanner::new();
        for chunk in chunks {
            scanner.feed(chunk.as_bytes());
        }
        scanner.finish()
    }

    #[test]
    fn extracts_message_content() {
        let line = r#"data:{"message":{"role":"assistant","content":"hello"}}"#;
        assert_eq!(extract_content(line).as_deref(), Some("hello"));
    }

    #[test]
    fn ignores_non_data_and_malformed_lines() {
        assert_eq!(extract_content("event:token"), None);
        assert_eq!(extract_content("id:aabdfe"), None);
        assert_eq!(extract_content("data:[DONE]"), None);
        assert_eq!(extract_content(r#"data:{"message":{"role":"assistant"}}"#), None);
        assert_eq!(extract_content(r#"data:{"message":"flat"}"#), None);
    }

    #[test]
    fn accepts_space_after_prefix() {
        let line = r#"data: {"message":{"content":"spaced"}}"#;
        assert_eq!(extract_content(line).as_deref(), Some("spaced"));
    }

    #[test]
    fn last_content_wins() {
        let content = scan(&[
            "event:token\n",
            "data:{\"message\":{\"content\":\"A\"}}\n\n",
            "data:{\"message\":{\"content\":\"B\"}}\n\n",
            "event:result\n",
            "data:{\"message\":{\"content\":\"C\"}}\n\n",
        ]);
        assert_eq!(content.as_deref(), Some("C"));
    }

    #[test]
    fn malformed_trailing_frames_keep_earlier_content() {
        let content = scan(&[
            "data:{\"message\":{\"content\":\"X\"}}\n",
            "data:{not json\n",
            "data:\n",
        ]);
        assert_eq!(content.as_deref(), Some("X"));
    }

    #[test]
    fn lines_split_across_chunks() {
        let content = scan(&[
            "data:{\"mess",
            "age\":{\"content\":\"joined\"}}\r",
            "\n",
        ]);
        assert_eq!(content.as_deref(), Some("joined"));
    }

    #[test]
    fn flushes_unterminated_last_line() {
        let content = scan(&["data:{\"message\":{\"content\":\"tail\"}}"]);
        assert_eq!(content.as_deref(), Some("tail"));
    }

    #[test]
    fn no_valid_frames_yields_none() {
        assert_eq!(scan(&["event:ping\n", "data:{}\n", "data:oops\n"]), None);
        assert_eq!(scan(&[]), None);
    }

    #[test]
    fn multibyte_content_split_mid_character() {
        let line = "data:{\"message\":{\"content\":\"비 오는 밤\"}}\n".as_bytes();
        let mut scanner = ContentScanner::new();
        scanner.feed(&line[..30]);
        scanner.feed(&line[30..]);
        assert_eq!(scanner.finish().as_deref(), Some("비 오는 밤"));
    }
}
