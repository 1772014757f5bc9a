//! Incremental decoder for `text/event-stream` bodies.
//!
//! Chunks arrive at arbitrary byte boundaries; the decoder keeps the
//! incomplete tail in a buffer and yields each frame once its blank-line
//! terminator has been seen.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// `event:` field, `message` when absent.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

#[derive(Debug, Default)]
pub struct Decoder {
    /// Raw bytes of the incomplete last line. Kept undecoded so a UTF-8
    /// sequence split across chunks survives.
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let mut complete: Vec<u8> = self.buffer.drain(..=last_newline).collect();
        complete.pop();

        let mut frames = Vec::new();
        for raw in complete.split(|&b| b == b'\n') {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Dropping invalid UTF-8 line in event stream: {}", e);
                    continue;
                }
            };
            if let Some(frame) = self.line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return self.dispatch();
        }
        // Comment, used for keep-alives
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Frame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(Frame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut decoder = Decoder::new();
        let frames = decoder.push(b"event: ready\ndata: {\"msg\":\"ready\"}\n\n");
        assert_eq!(
            frames,
            vec![Frame {
                event: "ready".to_string(),
                data: "{\"msg\":\"ready\"}".to_string(),
            }]
        );
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = Decoder::new();
        assert!(decoder.push(b"event: rem").is_empty());
        assert!(decoder.push(b"oved\ndata: {\"id\"").is_empty());
        let frames = decoder.push(b":1}\r\n\r\nevent: ready\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "removed");
        assert_eq!(frames[0].data, "{\"id\":1}");

        let frames = decoder.push(b"data: {}\n\n");
        assert_eq!(frames[0].event, "ready");
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let body = "event: added\ndata: {\"name\":\"Crème brûlée\"}\n\n".as_bytes();
        // Split inside the two-byte encoding of 'è'
        let split = body.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = Decoder::new();
        assert!(decoder.push(&body[..split]).is_empty());
        let frames = decoder.push(&body[split..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"name\":\"Crème brûlée\"}");
    }

    #[test]
    fn test_keep_alive_comments_ignored() {
        let mut decoder = Decoder::new();
        assert!(decoder.push(b":\n\n: keep-alive\n\n").is_empty());
    }

    #[test]
    fn test_multiline_data_and_default_event() {
        let mut decoder = Decoder::new();
        let frames = decoder.push(b"data: a\ndata: b\n\n");
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "a\nb");
    }
}
