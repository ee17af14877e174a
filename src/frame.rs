//! Reassembly of blank-line delimited frames from arbitrarily chunked bytes.

const DELIMITER: &str = "\n\n";

/// Incremental frame splitter for a `text/event-stream` body.
///
/// Chunk boundaries carry no meaning: a frame, a `\r\n` pair or a multi-byte
/// UTF-8 character may be split anywhere and is reassembled before it is
/// emitted.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: String,
    // Bytes of a UTF-8 sequence cut off at the end of the previous chunk.
    pending: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode(chunk);
        if text.contains('\r') || self.buffer.ends_with('\r') {
            self.buffer.push_str(&text);
            self.buffer = self.buffer.replace("\r\n", "\n");
        } else {
            self.buffer.push_str(&text);
        }

        let mut frames = Vec::new();
        while let Some(idx) = self.buffer.find(DELIMITER) {
            frames.push(self.buffer[..idx].to_string());
            self.buffer.drain(..idx + DELIMITER.len());
        }
        frames
    }

    /// Ends the stream. Returns the size of the discarded trailing fragment.
    pub fn finish(self) -> usize {
        let discarded = self.buffer.len() + self.pending.len();
        if discarded > 0 {
            tracing::debug!(bytes = discarded, "discarding incomplete trailing frame");
        }
        discarded
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = concat!(
        "data: {\"type\":\"tool_start\",\"name\":\"query_database\",\"args\":{}}\n\n",
        "data: {\"type\":\"text_delta\",\"content\":\"Résumé — 日本語 🎉\"}\n\n",
        ": keep-alive\n\n",
        "data: {\"type\":\"done\"}\n\n",
    );

    fn frames_of(chunks: &[&[u8]]) -> Vec<String> {
        let mut reader = FrameReader::new();
        chunks.iter().flat_map(|chunk| reader.push(chunk)).collect()
    }

    #[test]
    fn whole_body_yields_each_frame() {
        let frames = frames_of(&[BODY.as_bytes()]);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[2], ": keep-alive");
        assert_eq!(frames[3], "data: {\"type\":\"done\"}");
    }

    #[test]
    fn every_split_point_yields_the_same_frames() {
        let whole = frames_of(&[BODY.as_bytes()]);
        let bytes = BODY.as_bytes();
        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(frames_of(&[a, b]), whole, "split at byte {}", split);
        }
    }

    #[test]
    fn byte_at_a_time_yields_the_same_frames() {
        let whole = frames_of(&[BODY.as_bytes()]);
        let chunks: Vec<&[u8]> = BODY.as_bytes().chunks(1).collect();
        assert_eq!(frames_of(&chunks), whole);
    }

    #[test]
    fn crlf_split_across_chunks_is_normalized() {
        let frames = frames_of(&[
            b"data: a\r".as_slice(),
            b"\n\r".as_slice(),
            b"\ndata: b\r\n\r\n".as_slice(),
        ]);
        assert_eq!(frames, vec!["data: a".to_string(), "data: b".to_string()]);
    }

    #[test]
    fn partial_frame_waits_for_its_delimiter() {
        let mut reader = FrameReader::new();
        assert!(reader.push(b"data: {\"type\":").is_empty());
        assert!(reader.push(b"\"done\"}\n").is_empty());
        assert_eq!(reader.push(b"\n"), vec!["data: {\"type\":\"done\"}".to_string()]);
        assert_eq!(reader.finish(), 0);
    }

    #[test]
    fn trailing_fragment_is_discarded_on_finish() {
        let mut reader = FrameReader::new();
        assert_eq!(reader.push(b"data: one\n\ndata: tw").len(), 1);
        assert_eq!(reader.finish(), "data: tw".len());
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let frames = frames_of(&[b"data: \xff\xfeok\n\n".as_slice()]);
        assert_eq!(frames, vec!["data: \u{FFFD}\u{FFFD}ok".to_string()]);
    }
}
