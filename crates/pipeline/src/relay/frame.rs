//! Incremental decoder for newline-delimited JSON generation records.
//!
//! Chunk boundaries are arbitrary. Bytes are buffered until a complete
//! record is available; an incomplete record is never an error unless it
//! outgrows [`MAX_PENDING_BYTES`].

use hnrag_core::backend::StreamRecord;
use hnrag_core::error::BackendError;
use tracing::trace;

/// Undecoded bytes a single record may occupy.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    limit: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
        }
    }

    /// Append a chunk and return every record it completes, in order.
    ///
    /// Fails once the bytes still waiting for a record end exceed the limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamRecord>, BackendError> {
        self.pending.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut consumed = 0;

        loop {
            while self
                .pending
                .get(consumed)
                .is_some_and(|b| b.is_ascii_whitespace())
            {
                consumed += 1;
            }
            let rest = &self.pending[consumed..];
            if rest.is_empty() {
                break;
            }

            let mut stream = serde_json::Deserializer::from_slice(rest).into_iter::<StreamRecord>();
            match stream.next() {
                Some(Ok(record)) => {
                    consumed += stream.byte_offset();
                    records.push(record);
                }
                // Incomplete: wait for the next chunk.
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => match rest.iter().position(|b| *b == b'\n') {
                    Some(newline) => {
                        trace!(error = %e, skipped = newline + 1, "Skipping undecodable stream line");
                        consumed += newline + 1;
                    }
                    None => break,
                },
                None => break,
            }
        }

        self.pending.drain(..consumed);
        if self.pending.len() > self.limit {
            return Err(BackendError::StreamInterrupted(format!(
                "{} bytes without a complete record",
                self.pending.len()
            )));
        }
        Ok(records)
    }

    /// Bytes received but not yet decoded.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(r: &StreamRecord) -> &str {
        r.response.as_deref().unwrap_or("")
    }

    #[test]
    fn one_chunk_many_records() {
        let mut d = FrameDecoder::new();
        let records = d.push(b"{\"response\":\"Hel\",\"done\":false}\n{\"response\":\"lo\",\"done\":false}\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(text(&records[0]), "Hel");
        assert_eq!(text(&records[1]), "lo");
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn record_split_across_chunks() {
        let mut d = FrameDecoder::new();
        assert!(d.push(b"{\"respon").unwrap().is_empty());
        assert!(d.push(b"se\":\"Hi\",\"do").unwrap().is_empty());
        let records = d.push(b"ne\":true}\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(text(&records[0]), "Hi");
        assert!(records[0].done);
    }

    #[test]
    fn record_without_trailing_newline() {
        let mut d = FrameDecoder::new();
        let records = d.push(br#"{"response":"x","done":true}"#).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn split_inside_multibyte_character() {
        let data = "{\"response\":\"caf\u{e9} \u{1f980}\",\"done\":false}\n".as_bytes();
        for cut in 1..data.len() {
            let mut d = FrameDecoder::new();
            let mut records = d.push(&data[..cut]).unwrap();
            records.extend(d.push(&data[cut..]).unwrap());
            assert_eq!(records.len(), 1, "cut at {cut}");
            assert_eq!(text(&records[0]), "caf\u{e9} \u{1f980}");
        }
    }

    #[test]
    fn garbage_line_is_skipped() {
        let mut d = FrameDecoder::new();
        let records = d.push(b"not json at all\n{\"response\":\"ok\",\"done\":true}\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(text(&records[0]), "ok");
    }

    #[test]
    fn garbage_waits_for_its_line_end() {
        let mut d = FrameDecoder::new();
        assert!(d.push(b"oops").unwrap().is_empty());
        let records = d.push(b" still oops\n{\"response\":\"ok\"}\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(text(&records[0]), "ok");
    }

    #[test]
    fn unterminated_bytes_past_the_limit_fail() {
        let mut d = FrameDecoder::with_limit(64);
        assert!(d.push(&[b'x'; 40]).unwrap().is_empty());
        let err = d.push(&[b'x'; 40]).unwrap_err();
        assert!(matches!(err, BackendError::StreamInterrupted(_)));
    }

    #[test]
    fn limit_applies_to_leftovers_not_whole_chunks() {
        let mut d = FrameDecoder::with_limit(64);
        let mut body = Vec::new();
        for _ in 0..10 {
            body.extend_from_slice(b"{\"response\":\"abc\",\"done\":false}\n");
        }
        assert!(body.len() > 64);
        assert_eq!(d.push(&body).unwrap().len(), 10);
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn escaped_newline_inside_text() {
        let mut d = FrameDecoder::new();
        let records = d.push(b"{\"response\":\"lo\\n\",\"done\":false}\n").unwrap();
        assert_eq!(text(&records[0]), "lo\n");
    }
}
