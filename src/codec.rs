//! Transport byte stream to text chunk decoding.
//!
//! Transports deliver arbitrary byte slices, so a multi-byte UTF-8 sequence
//! may straddle two reads. The codec yields the longest decodable prefix and
//! holds the incomplete tail back until the next read completes it.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Default, Clone, Copy)]
pub struct TextChunkCodec;

impl TextChunkCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for TextChunkCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        match std::str::from_utf8(src) {
            Ok(text) => {
                let text = text.to_string();
                src.clear();
                Ok(Some(text))
            }
            Err(e) => {
                let valid = e.valid_up_to();
                match e.error_len() {
                    // Incomplete sequence at the end: emit what we have, keep the tail
                    None => {
                        if valid == 0 {
                            return Ok(None);
                        }
                        let head = src.split_to(valid);
                        Ok(Some(String::from_utf8_lossy(&head).into_owned()))
                    }
                    // Invalid bytes mid-buffer: replace them and move on
                    Some(bad) => {
                        let head = src.split_to(valid + bad);
                        Ok(Some(String::from_utf8_lossy(&head).into_owned()))
                    }
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        match self.decode(src)? {
            Some(text) => Ok(Some(text)),
            None => {
                if src.is_empty() {
                    Ok(None)
                } else {
                    let rest = src.split();
                    tracing::debug!(
                        "[CODEC] Flushing {} dangling bytes at end of stream",
                        rest.len()
                    );
                    Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_ascii_passes_through() {
        let mut codec = TextChunkCodec::new();
        let mut buf = BytesMut::from(&b"hello"[..]);
        assert_eq!(codec.decode(&mut buf).ok().flatten().as_deref(), Some("hello"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_split_multibyte_is_held_back() {
        let mut codec = TextChunkCodec::new();
        let bytes = "ab€".as_bytes();
        // '€' is three bytes; deliver only the first of them
        let mut buf = BytesMut::from(&bytes[..3]);
        assert_eq!(codec.decode(&mut buf).ok().flatten().as_deref(), Some("ab"));
        assert_eq!(buf.len(), 1);
        assert_eq!(codec.decode(&mut buf).ok().flatten(), None);

        buf.extend_from_slice(&bytes[3..]);
        assert_eq!(codec.decode(&mut buf).ok().flatten().as_deref(), Some("€"));
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut codec = TextChunkCodec::new();
        let mut buf = BytesMut::from(&[b'a', 0xff, b'b'][..]);
        let first = codec.decode(&mut buf).ok().flatten();
        assert_eq!(first.as_deref(), Some("a\u{fffd}"));
        assert_eq!(codec.decode(&mut buf).ok().flatten().as_deref(), Some("b"));
    }

    #[test]
    fn test_eof_flushes_dangling_bytes() {
        let mut codec = TextChunkCodec::new();
        let mut buf = BytesMut::from(&"€".as_bytes()[..2]);
        let flushed = codec.decode_eof(&mut buf).ok().flatten();
        assert_eq!(flushed.as_deref(), Some("\u{fffd}"));
        assert!(buf.is_empty());
    }
}
