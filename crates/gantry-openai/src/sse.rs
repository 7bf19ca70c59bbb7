/// Incremental decoder for the `data:`-framed SSE lines used by the
/// chat-completions stream. Partial lines are carried across chunk
/// boundaries; comment lines and non-data fields are skipped.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_bytes(&mut self, chunk: &[u8]) -> Vec<String> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub(crate) fn push_str(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);

            if line.ends_with('\r') {
                line.pop();
            }
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            payloads.push(payload.trim_start().to_string());
        }

        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_lines_are_extracted() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push_str("data: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn partial_lines_carry_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push_str("data: {\"a\"").is_empty());
        let payloads = decoder.push_str(":1}\n");
        assert_eq!(payloads, vec!["{\"a\":1}"]);
    }

    #[test]
    fn comments_and_other_fields_are_skipped() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push_str(": keep-alive\nevent: ping\ndata: x\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push_str("data: one\r\ndata: two\r\n");
        assert_eq!(payloads, vec!["one", "two"]);
    }
}
