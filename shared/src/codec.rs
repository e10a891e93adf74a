//! Frame codec.
//!
//! Format (little-endian):
//! - u8 packet type
//! - u32 LEN (bytes of payload)
//! - [u8; LEN] payload
//!
//! Decoding never panics: short input or a declared length larger than what
//! is available yields [`DecodeError::Truncated`].

use crate::messages::PacketType;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the `[type][len]` header.
pub const HEADER_LEN: usize = 5;

/// Largest payload accepted from a peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// A raw frame: type byte plus undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("declared payload length {0} exceeds the 64 KiB limit")]
    FrameTooLarge(usize),

    #[error("unknown packet type {0}")]
    UnknownType(u8),

    #[error("packet type {0:?} is not supported")]
    Unsupported(PacketType),

    #[error("malformed {kind:?} payload: {reason}")]
    Malformed {
        kind: PacketType,
        reason: &'static str,
    },

    #[error("invalid UTF-8 in {0:?} payload")]
    InvalidUtf8(PacketType),
}

/// Builds a complete frame around `payload`.
pub fn encode_frame(kind: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(kind);
    buf.put_u32_le(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Reads one frame from the front of `inp`.
///
/// Returns the frame and the number of bytes it occupied so stream readers
/// can advance past it. Trailing bytes after the frame are left untouched.
pub fn decode_frame(inp: &[u8]) -> Result<(Frame, usize), DecodeError> {
    if inp.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            needed: HEADER_LEN,
            available: inp.len(),
        });
    }

    let kind = inp[0];
    let mut lenb = [0u8; 4];
    lenb.copy_from_slice(&inp[1..HEADER_LEN]);
    let len = u32::from_le_bytes(lenb) as usize;
    if len > MAX_FRAME_LEN {
        return Err(DecodeError::FrameTooLarge(len));
    }

    let total = HEADER_LEN + len;
    if inp.len() < total {
        return Err(DecodeError::Truncated {
            needed: total,
            available: inp.len(),
        });
    }

    let frame = Frame {
        kind,
        payload: Bytes::copy_from_slice(&inp[HEADER_LEN..total]),
    };
    Ok((frame, total))
}

/// Accumulates bytes from a stream and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Backing buffer, for `read_buf` style readers.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete frame, or `Ok(None)` if more bytes are needed.
    ///
    /// An oversized frame is returned as an error; the stream cannot be
    /// resynchronised after it.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        match decode_frame(&self.buf) {
            Ok((frame, used)) => {
                self.buf.advance(used);
                Ok(Some(frame))
            }
            Err(DecodeError::Truncated { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(3, b"abc");
        assert_eq!(&frame[..], &[3, 3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_frame_roundtrip_with_trailing_bytes() {
        let mut buf = encode_frame(6, &[]).to_vec();
        buf.extend_from_slice(&encode_frame(12, &[1, 0, 0, 0]));

        let (first, used) = decode_frame(&buf).expect("first frame");
        assert_eq!(first.kind, 6);
        assert!(first.payload.is_empty());
        assert_eq!(used, HEADER_LEN);

        let (second, used2) = decode_frame(&buf[used..]).expect("second frame");
        assert_eq!(second.kind, 12);
        assert_eq!(&second.payload[..], &[1, 0, 0, 0]);
        assert_eq!(used + used2, buf.len());
    }

    #[test]
    fn test_short_header_is_truncated() {
        for len in 0..HEADER_LEN {
            let buf = vec![0u8; len];
            assert_eq!(
                decode_frame(&buf),
                Err(DecodeError::Truncated {
                    needed: HEADER_LEN,
                    available: len
                })
            );
        }
    }

    #[test]
    fn test_declared_length_beyond_input() {
        let mut buf = encode_frame(2, &[9; 10]).to_vec();
        buf.truncate(12);
        assert_eq!(
            decode_frame(&buf),
            Err(DecodeError::Truncated {
                needed: 15,
                available: 12
            })
        );
    }

    #[test]
    fn test_frame_buffer_reassembles_split_frames() {
        let frame = encode_frame(9, &[1, 2, 3, 4, 5, 6]);
        let mut buffer = FrameBuffer::new();

        buffer.extend(&frame[..3]);
        assert_eq!(buffer.next_frame(), Ok(None));
        buffer.extend(&frame[3..8]);
        assert_eq!(buffer.next_frame(), Ok(None));
        buffer.extend(&frame[8..]);
        buffer.extend(&encode_frame(6, &[]));

        let first = buffer.next_frame().unwrap().expect("complete frame");
        assert_eq!(first.kind, 9);
        assert_eq!(&first.payload[..], &[1, 2, 3, 4, 5, 6]);
        let second = buffer.next_frame().unwrap().expect("heartbeat frame");
        assert_eq!(second.kind, 6);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[1..5].copy_from_slice(&(u32::MAX).to_le_bytes());
        assert_eq!(
            decode_frame(&buf),
            Err(DecodeError::FrameTooLarge(u32::MAX as usize))
        );
    }
}
