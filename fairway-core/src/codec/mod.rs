//! Brace-balanced JSON framing for `tokio_util`.
//!
//! Launch monitors write back-to-back JSON objects with no length
//! prefix and no reliable delimiter, so frames are cut by counting
//! braces outside of string literals:
//!
//! ```text
//!   ␠␤{"Type":"Handshake"}{"Type":"SetClubType","ClubType":"Dri{ver"}
//!     └──────── frame ────┘└──────────────── frame ────────────────┘
//! ```
//!
//! Outgoing messages are written as compact JSON followed by `\n`,
//! which both the device and the simulator accept.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::BridgeError;

/// Largest frame accepted before the stream is considered corrupt.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

// ── ScanState ────────────────────────────────────────────────────

/// Where the scanner stopped inside a partial frame.
///
/// Kept between `decode` calls so bytes that were already inspected
/// are not rescanned when more data arrives.
#[derive(Debug, Default, Clone, Copy)]
struct ScanState {
    /// Offset of the next byte to inspect. Always `>= 1` once a frame
    /// has started, since the opening brace sits at offset 0.
    pos: usize,
    /// Brace nesting depth; `0` means no frame has started.
    depth: usize,
    in_string: bool,
    escaped: bool,
}

// ── JsonFrameCodec ───────────────────────────────────────────────

/// Splits a byte stream into complete JSON object frames.
#[derive(Debug, Clone)]
pub struct JsonFrameCodec {
    scan: ScanState,
    max_frame_size: usize,
}

impl Default for JsonFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            scan: ScanState::default(),
            max_frame_size,
        }
    }

    /// Drop everything in front of the first `{`.
    ///
    /// Returns `false` when the buffer holds no frame start at all.
    fn skip_to_frame_start(src: &mut BytesMut) -> bool {
        match src.iter().position(|&b| b == b'{') {
            Some(start) => {
                if start > 0 {
                    let skipped = src.split_to(start);
                    if skipped.iter().any(|b| !b.is_ascii_whitespace()) {
                        tracing::debug!(bytes = skipped.len(), "discarding bytes before frame start");
                    }
                }
                true
            }
            None => {
                src.clear();
                false
            }
        }
    }
}

impl Decoder for JsonFrameCodec {
    type Item = Bytes;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.scan.depth == 0 {
            if !Self::skip_to_frame_start(src) {
                return Ok(None);
            }
            self.scan = ScanState {
                pos: 1,
                depth: 1,
                in_string: false,
                escaped: false,
            };
        }

        let mut scan = self.scan;
        while scan.pos < src.len() {
            let b = src[scan.pos];
            scan.pos += 1;

            if scan.in_string {
                if scan.escaped {
                    scan.escaped = false;
                } else if b == b'\\' {
                    scan.escaped = true;
                } else if b == b'"' {
                    scan.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => scan.in_string = true,
                b'{' => scan.depth += 1,
                b'}' => {
                    scan.depth -= 1;
                    if scan.depth == 0 {
                        self.scan = ScanState::default();
                        return Ok(Some(src.split_to(scan.pos).freeze()));
                    }
                }
                _ => {}
            }
        }

        if src.len() > self.max_frame_size {
            self.scan = ScanState::default();
            return Err(BridgeError::FrameTooLarge {
                size: src.len(),
                max: self.max_frame_size,
            });
        }

        self.scan = scan;
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.scan.depth > 0 && !src.is_empty() {
            // Best effort: hand over the unterminated tail and let the
            // JSON parser reject it.
            tracing::warn!(bytes = src.len(), "stream ended inside a frame");
            self.scan = ScanState::default();
            return Ok(Some(src.split().freeze()));
        }
        src.clear();
        Ok(None)
    }
}

impl<T: Serialize> Encoder<T> for JsonFrameCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        dst.reserve(body.len() + 1);
        dst.extend_from_slice(&body);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut JsonFrameCodec, buf: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn splits_back_to_back_objects() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\":1}{\"b\":{\"c\":2}}"[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames, vec![&b"{\"a\":1}"[..], &b"{\"b\":{\"c\":2}}"[..]]);
        assert!(buf.is_empty());
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\":\"}\"}{\"b\":1}"[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames, vec![&b"{\"a\":\"}\"}"[..], &b"{\"b\":1}"[..]]);
    }

    #[test]
    fn escaped_quote_keeps_string_open() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(&br#"{"a":"x\"}"}{"b":"\\"}"#[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames, vec![&br#"{"a":"x\"}"}"#[..], &br#"{"b":"\\"}"#[..]]);
    }

    #[test]
    fn leading_whitespace_is_discarded() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(&b" \r\n\t{\"a\":1}\n\n{\"b\":2}\n"[..]);
        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames, vec![&b"{\"a\":1}"[..], &b"{\"b\":2}"[..]]);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_and_keeps_bytes() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\":{\"b\""[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"{\"a\":{\"b\"");

        buf.extend_from_slice(b":1}}");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"{\"a\":{\"b\":1}}");
    }

    #[test]
    fn any_chunking_yields_same_frames() {
        let objects: [&[u8]; 4] = [
            br#"{"Type":"Handshake"}"#,
            br#"{"Type":"SetClubType","ClubType":"Dri}ver"}"#,
            br#"{"Type":"SetBallData","BallData":{"BallSpeed":150.5,"SpinAxis":350}}"#,
            br#"{"s":"a\"{b"}"#,
        ];
        let input: Vec<u8> = objects.concat();

        for chunk in 1..=input.len() {
            let mut codec = JsonFrameCodec::new();
            let mut buf = BytesMut::new();
            let mut frames = Vec::new();
            for piece in input.chunks(chunk) {
                buf.extend_from_slice(piece);
                frames.extend(decode_all(&mut codec, &mut buf));
            }
            assert_eq!(frames.len(), objects.len(), "chunk size {chunk}");
            for (frame, object) in frames.iter().zip(objects) {
                assert_eq!(&frame[..], object, "chunk size {chunk}");
            }
        }
    }

    #[test]
    fn eof_emits_unterminated_tail() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\":1}{\"b\":"[..]);
        assert_eq!(&codec.decode_eof(&mut buf).unwrap().unwrap()[..], b"{\"a\":1}");
        assert_eq!(&codec.decode_eof(&mut buf).unwrap().unwrap()[..], b"{\"b\":");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn eof_with_only_whitespace_is_clean() {
        let mut codec = JsonFrameCodec::new();
        let mut buf = BytesMut::from(&b"  \n"[..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut codec = JsonFrameCodec::with_max_frame_size(16);
        let mut buf = BytesMut::from(&b"{\"aaaaaaaaaaaaaaaaaaaaaaaa\""[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, BridgeError::FrameTooLarge { max: 16, .. }));
    }

    #[test]
    fn encoder_writes_newline_terminated_json() {
        let mut codec = JsonFrameCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(serde_json::json!({"Type": "ACK"}), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"{\"Type\":\"ACK\"}\n");
    }
}
