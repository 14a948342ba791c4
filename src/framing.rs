//! Newline framing of the device byte stream.
//!
//! Bytes arrive in arbitrary chunks; [`LineFramer`] keeps whatever follows the
//! last `\n` until the next feed. Each complete line is decoded lossily so a
//! garbled byte never costs more than that byte, then trimmed. Blank lines are
//! dropped.
//!
//! The buffer has no length cap: a peer that never sends `\n` grows it
//! without bound.

use std::borrow::Cow;

const LINE_TERMINATOR: u8 = b'\n';

/// Splits a byte stream into lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Framer with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every complete, non-empty line in arrival order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..]
            .iter()
            .position(|&b| b == LINE_TERMINATOR)
        {
            let end = start + offset;
            if let Some(line) = decode_line(&self.buffer[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);

        lines
    }

    /// Number of bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let text: Cow<'_, str> = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &[u8] = b"READY\r\nSTATUS:MAGNET:ON_MAGNET\n\n   \nDATA,7,5,12543,18865,6.32,AUTO\r\npartial";

    #[test]
    fn test_splits_trims_and_drops_blank_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(STREAM);
        assert_eq!(
            lines,
            vec![
                "READY",
                "STATUS:MAGNET:ON_MAGNET",
                "DATA,7,5,12543,18865,6.32,AUTO"
            ]
        );
        assert_eq!(framer.pending(), "partial".len());
    }

    #[test]
    fn test_remainder_completes_on_next_feed() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"STAT").is_empty());
        assert!(framer.feed(b"US:MOUSE:").is_empty());
        assert_eq!(framer.feed(b"IDLE\nnext"), vec!["STATUS:MOUSE:IDLE"]);
        assert_eq!(framer.feed(b"\n"), vec!["next"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_output() {
        let mut whole = LineFramer::new();
        let expected = whole.feed(STREAM);

        for chunk_size in 1..STREAM.len() {
            let mut framer = LineFramer::new();
            let mut lines = Vec::new();
            for chunk in STREAM.chunks(chunk_size) {
                lines.extend(framer.feed(chunk));
            }
            assert_eq!(lines, expected, "chunk size {}", chunk_size);
            assert_eq!(framer.pending(), whole.pending());
        }

        // Every possible single split point
        for split in 0..=STREAM.len() {
            let mut framer = LineFramer::new();
            let (a, b) = STREAM.split_at(split);
            let mut lines = framer.feed(a);
            lines.extend(framer.feed(b));
            assert_eq!(lines, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_fatal() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"ERROR:\xff\xfe bad\nINFO ok\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ERROR:"));
        assert!(lines[0].ends_with("bad"));
        assert_eq!(lines[1], "INFO ok");
    }

    #[test]
    fn test_multibyte_character_split_across_reads_survives() {
        let line = "\u{26a0}\u{fe0f} Beam blocked\n".as_bytes();
        let mut framer = LineFramer::new();
        assert!(framer.feed(&line[..1]).is_empty());
        assert_eq!(framer.feed(&line[1..]), vec!["\u{26a0}\u{fe0f} Beam blocked"]);
    }
}
