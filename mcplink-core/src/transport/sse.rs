//! Incremental Server-Sent Events decoder.
//!
//! Only `data:` fields matter to the bridge. Every complete event yields the
//! concatenation of its trimmed `data:` values; `event:`, `id:`, `retry:` and
//! comment lines are ignored. Bytes after the last blank line stay buffered
//! until more input arrives, so chunk boundaries (including ones that split a
//! multi-byte character) never change the output.

/// MIME type prefix of an event-stream response.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Whether a `Content-Type` value denotes an SSE body.
pub fn is_event_stream(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..EVENT_STREAM.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(EVENT_STREAM))
}

/// Buffers raw body bytes and yields one payload per complete event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect the payloads of every event it completes.
    ///
    /// Events whose `data:` values are all empty produce nothing.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        let mut consumed = 0;
        while let Some((end, delimiter)) = find_boundary(&self.buffer[consumed..]) {
            let event = &self.buffer[consumed..consumed + end];
            if let Some(payload) = event_payload(event) {
                payloads.push(payload);
            }
            consumed += end + delimiter;
        }
        self.buffer.drain(..consumed);

        payloads
    }

    /// Bytes of an event still waiting for its terminating blank line.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Locate the first blank line: `\n\n` or `\n\r\n` (which covers `\r\n\r\n`).
/// Returns the event length and the delimiter length.
fn find_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = buf[from..].iter().position(|&b| b == b'\n') {
        let i = from + offset;
        match buf.get(i + 1..) {
            Some([b'\n', ..]) => return Some((i, 2)),
            Some([b'\r', b'\n', ..]) => return Some((i, 3)),
            _ => from = i + 1,
        }
    }
    None
}

fn event_payload(event: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(event);
    let payload: String = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();

    (!payload.is_empty()).then_some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{}}\n\n");
        assert_eq!(out, vec![r#"{"jsonrpc":"2.0","id":2,"result":{}}"#]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_multiple_data_lines_concatenate() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: {\"a\":\ndata:  1}\n\n");
        assert_eq!(out, vec![r#"{"a":1}"#]);
    }

    #[test]
    fn test_separate_events() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: one\n\ndata: two\n\n");
        assert_eq!(out, vec!["one", "two"]);
    }

    #[test]
    fn test_crlf_framing() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"event: message\r\ndata: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(out, vec!["one", "two"]);
    }

    #[test]
    fn test_non_data_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b": keepalive\n\nevent: message\nid: 7\nretry: 10\ndata: x\n\n");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn test_done_sentinel_passed_through() {
        let mut decoder = SseDecoder::new();
        let out = decoder.push(b"data: {}\n\ndata: [DONE]\n\n");
        assert_eq!(out, vec!["{}", "[DONE]"]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: hel").is_empty());
        assert!(decoder.push(b"lo\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec!["hello"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "data: héllo\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["héllo"]);
    }

    #[test]
    fn test_unterminated_event_stays_buffered() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: partial\n").is_empty());
        assert_eq!(decoder.buffered_len(), 14);
    }

    #[test]
    fn test_empty_data_event_skipped() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data:\n\ndata:   \n\n").is_empty());
    }

    #[test]
    fn test_is_event_stream() {
        assert!(is_event_stream("text/event-stream"));
        assert!(is_event_stream("text/event-stream; charset=utf-8"));
        assert!(is_event_stream("Text/Event-Stream"));
        assert!(!is_event_stream("application/json"));
        assert!(!is_event_stream("text/event"));
        assert!(!is_event_stream(""));
    }

    proptest! {
        /// Output depends only on the byte sequence, not on how it was chunked.
        #[test]
        fn chunking_does_not_change_output(
            payloads in prop::collection::vec("[a-zA-Z0-9{}\":, é]{1,20}", 1..5),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let body: Vec<u8> = payloads
                .iter()
                .flat_map(|p| format!("data: {p}\n\n").into_bytes())
                .collect();

            let mut whole = SseDecoder::new();
            let expected = whole.push(&body);

            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(body.len())).collect();
            points.sort_unstable();
            points.dedup();

            let mut chunked = SseDecoder::new();
            let mut actual = Vec::new();
            let mut start = 0;
            for point in points {
                actual.extend(chunked.push(&body[start..point]));
                start = point;
            }
            actual.extend(chunked.push(&body[start..]));

            prop_assert_eq!(actual, expected);
        }
    }
}
