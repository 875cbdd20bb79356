//! Reassembles UTF-8 text from output chunks.
//!
//! A multi-byte character may straddle two chunks. Decoding each chunk on its
//! own would turn both halves into U+FFFD, so the trailing incomplete bytes are
//! held back and prepended to the next chunk.

/// A code point is at most 4 bytes, so at most 3 can be pending
const MAX_PENDING: usize = 3;

#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, keeping an incomplete trailing sequence for next time.
    ///
    /// Bytes that can never form a valid sequence become U+FFFD.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let split = bytes.len() - incomplete_suffix_len(&bytes);
        self.pending = bytes.split_off(split);

        match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    /// Bytes held back from the last chunk
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Flush held-back bytes at end of stream; an incomplete sequence
    /// becomes U+FFFD
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

/// Length of a cut-short sequence at the end of `bytes`: a lead byte followed
/// only by continuation bytes, fewer than the lead byte announces
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    for len in 1..=MAX_PENDING.min(bytes.len()) {
        let lead = bytes[bytes.len() - len];
        if (0x80..=0xBF).contains(&lead) {
            continue;
        }
        let expected = match lead {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return 0,
        };
        return if len < expected { len } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"ok\n"), "ok\n");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_split_three_byte_char() {
        let mut decoder = Utf8Decoder::new();
        // '€' = E2 82 AC
        assert_eq!(decoder.decode(b"abc\xE2\x82"), "abc");
        assert_eq!(decoder.pending(), 2);
        assert_eq!(decoder.decode(b"\xACdef"), "€def");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_split_four_byte_char_byte_by_byte() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "𝕳".as_bytes();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..2]), "");
        assert_eq!(decoder.decode(&bytes[2..3]), "");
        assert_eq!(decoder.decode(&bytes[3..]), "𝕳");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xFFb"), "a\u{FFFD}b");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_invalid_then_split_char() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xFFb\xE2\x82"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(b"\xAC"), "€");
    }

    #[test]
    fn test_broken_sequence_is_not_held() {
        let mut decoder = Utf8Decoder::new();
        // Lead byte followed by a non-continuation byte
        assert_eq!(decoder.decode(b"\xE2A"), "\u{FFFD}A");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_finish_flushes_incomplete_tail() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"ok\xE2\x82"), "ok");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.pending(), 0);
        assert_eq!(decoder.finish(), "");
    }
}
