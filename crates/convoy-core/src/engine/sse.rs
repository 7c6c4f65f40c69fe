//! Incremental server-sent-events framing.
//!
//! Byte chunks arrive in arbitrary splits; frames are complete once a blank
//! line is seen. Only `event:` and `data:` fields matter for the providers
//! this crate speaks to; comments and other fields are skipped.

/// One complete SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Stateful frame reader fed from a byte stream.
#[derive(Default)]
pub struct SseFrameReader {
    buffer: String,
    pending_event: Option<String>,
    pending_data: Vec<String>,
}

impl SseFrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut frames = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.pending_data.is_empty() || self.pending_event.is_some() {
                    frames.push(SseFrame {
                        event: self.pending_event.take(),
                        data: self.pending_data.join("\n"),
                    });
                    self.pending_data.clear();
                }
                continue;
            }
            if let Some(value) = line.strip_prefix("event:") {
                self.pending_event = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.pending_data.push(value.trim_start().to_string());
            }
            // Comments (":keepalive") and unknown fields are ignored.
        }

        frames
    }

    /// Flush a trailing frame at end of stream, if any.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if self.pending_data.is_empty() && self.pending_event.is_none() {
            return None;
        }
        Some(SseFrame {
            event: self.pending_event.take(),
            data: std::mem::take(&mut self.pending_data).join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_frames() {
        let mut reader = SseFrameReader::new();
        let frames = reader.push(b"event: message_start\ndata: {\"a\":1}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("message_start"));
        assert_eq!(frames[0].data, "{\"a\":1}");
    }

    #[test]
    fn handles_arbitrary_chunk_splits() {
        let mut reader = SseFrameReader::new();
        let wire = b"event: content_block_delta\ndata: {\"text\":\"hi\"}\n\nevent: ping\ndata: {}\n\n";
        let mut frames = Vec::new();
        for chunk in wire.chunks(7) {
            frames.extend(reader.push(chunk));
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.as_deref(), Some("content_block_delta"));
        assert_eq!(frames[1].event.as_deref(), Some("ping"));
    }

    #[test]
    fn joins_multi_line_data() {
        let mut reader = SseFrameReader::new();
        let frames = reader.push(b"data: line one\ndata: line two\n\n");
        assert_eq!(frames[0].data, "line one\nline two");
        assert_eq!(frames[0].event, None);
    }

    #[test]
    fn skips_comments_and_flushes_tail() {
        let mut reader = SseFrameReader::new();
        let frames = reader.push(b": keepalive\ndata: tail");
        assert!(frames.is_empty());
        // No trailing newline: data is still buffered as an incomplete line.
        assert!(reader.finish().is_none());

        let mut reader = SseFrameReader::new();
        assert!(reader.push(b"data: tail\n").is_empty());
        let tail = reader.finish().unwrap();
        assert_eq!(tail.data, "tail");
    }
}
