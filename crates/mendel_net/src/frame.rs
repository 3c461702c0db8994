//! Delimiter-framed codec.
//!
//! Each frame is a UTF-8 payload followed by [`FRAME_DELIMITER`]. JSON text
//! never contains that byte unescaped, so no length prefix or escaping is
//! needed. Partial frames are buffered across reads.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::NetError;

/// End-of-transmission byte terminating every frame.
pub const FRAME_DELIMITER: u8 = 0x04;

/// Largest payload accepted by default.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Codec for `0x04`-terminated UTF-8 frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
    // Bytes of the buffer already searched for a delimiter.
    next_index: usize,
}

impl FrameCodec {
    /// A codec accepting payloads of at most `max_frame_len` bytes.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            next_index: 0,
        }
    }

    /// The payload size limit.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    fn too_large(&self) -> NetError {
        NetError::Frame {
            reason: format!("frame exceeds {} bytes", self.max_frame_len),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = NetError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, NetError> {
        let read_to = src.len().min(self.max_frame_len.saturating_add(1));
        let found = src[self.next_index..read_to]
            .iter()
            .position(|b| *b == FRAME_DELIMITER);
        match found {
            Some(offset) => {
                let at = self.next_index + offset;
                self.next_index = 0;
                let mut frame = src.split_to(at + 1);
                frame.truncate(at);
                String::from_utf8(frame.to_vec())
                    .map(Some)
                    .map_err(|_| NetError::Frame {
                        reason: "frame is not valid UTF-8".into(),
                    })
            }
            None if src.len() > self.max_frame_len => Err(self.too_large()),
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = NetError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), NetError> {
        if item.len() > self.max_frame_len {
            return Err(self.too_large());
        }
        if item.as_bytes().contains(&FRAME_DELIMITER) {
            return Err(NetError::Frame {
                reason: "payload contains the frame delimiter".into(),
            });
        }
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(FRAME_DELIMITER);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut FrameCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn reassembles_across_every_split() {
        let wire = b"{\"a\":1}\x04{\"b\":2}\x04\x04{\"c\":3}\x04";
        let expected = vec!["{\"a\":1}", "{\"b\":2}", "", "{\"c\":3}"];
        for split in 0..=wire.len() {
            let mut codec = FrameCodec::default();
            let mut buf = BytesMut::new();
            let mut frames = Vec::new();
            buf.extend_from_slice(&wire[..split]);
            frames.extend(decode_all(&mut codec, &mut buf));
            buf.extend_from_slice(&wire[split..]);
            frames.extend(decode_all(&mut codec, &mut buf));
            assert_eq!(frames, expected, "split at {split}");
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn byte_at_a_time() {
        let wire = b"hello\x04world\x04tail";
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for byte in wire {
            buf.put_u8(*byte);
            frames.extend(decode_all(&mut codec, &mut buf));
        }
        assert_eq!(frames, vec!["hello", "world"]);
        assert_eq!(&buf[..], b"tail");
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut codec = FrameCodec::with_max_frame_len(4);
        let mut buf = BytesMut::from(&b"abcd\x04"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("abcd"));

        let mut buf = BytesMut::from(&b"abcde"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(NetError::Frame { .. })));

        let mut out = BytesMut::new();
        assert!(codec.encode("abcde".to_string(), &mut out).is_err());
    }

    #[test]
    fn encoder_appends_delimiter() {
        let mut codec = FrameCodec::default();
        let mut out = BytesMut::new();
        codec.encode("{}".to_string(), &mut out).unwrap();
        codec.encode("[]".to_string(), &mut out).unwrap();
        assert_eq!(&out[..], b"{}\x04[]\x04");
    }

    #[test]
    fn encoder_rejects_delimiter_in_payload() {
        let mut codec = FrameCodec::default();
        let mut out = BytesMut::new();
        let err = codec.encode("a\u{4}b".to_string(), &mut out).unwrap_err();
        assert!(err.to_string().contains("delimiter"));
        assert!(out.is_empty());
    }

    #[test]
    fn invalid_utf8_is_a_frame_error() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"\xff\xfe\x04"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(NetError::Frame { .. })));
    }
}
