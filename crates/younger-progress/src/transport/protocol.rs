//! Progress message types and framing.
//!
//! Every message travels as a 4-byte big-endian length prefix followed by a
//! UTF-8 JSON payload.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Workers write frames with blocking IO (see [`super::sender`]); the
//! coordinator decodes them incrementally from a read buffer so a partially
//! received frame survives a cancelled read.

use crate::config::TransportConfig;
use crate::error::{ProgressError, Result};
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::num::NonZeroU64;

const LEN_PREFIX: usize = 4;

/// A single progress message sent by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressMessage {
    /// Units of work completed since the previous delta from the same worker.
    Delta { n: NonZeroU64 },
    /// The worker finished its chunk. Sent exactly once per worker.
    Done,
}

impl ProgressMessage {
    /// Build a delta, or `None` for a zero count.
    pub fn delta(n: u64) -> Option<Self> {
        NonZeroU64::new(n).map(|n| ProgressMessage::Delta { n })
    }

    /// Units carried by this message (zero for `Done`).
    pub fn units(&self) -> u64 {
        match self {
            ProgressMessage::Delta { n } => n.get(),
            ProgressMessage::Done => 0,
        }
    }
}

/// Serialize a message into a complete length-prefixed frame.
pub fn encode_frame(message: &ProgressMessage) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(message)?;
    let mut frame = Vec::with_capacity(LEN_PREFIX + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Write a message frame to a blocking writer.
pub fn write_message<W: Write>(writer: &mut W, message: &ProgressMessage) -> Result<()> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Split one complete frame payload off the front of `buf`.
///
/// Returns `None` while the buffer holds less than a full frame; the partial
/// bytes stay in place for the next read.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<Bytes>> {
    if buf.len() < LEN_PREFIX {
        return Ok(None);
    }

    let mut len_buf = [0u8; LEN_PREFIX];
    len_buf.copy_from_slice(&buf[..LEN_PREFIX]);
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > TransportConfig::MAX_FRAME_SIZE {
        return Err(ProgressError::Validation {
            field: "progress_frame".to_string(),
            message: format!(
                "frame size {} exceeds maximum {}",
                len,
                TransportConfig::MAX_FRAME_SIZE
            ),
        });
    }

    if buf.len() < LEN_PREFIX + len {
        buf.reserve(LEN_PREFIX + len - buf.len());
        return Ok(None);
    }

    buf.advance(LEN_PREFIX);
    Ok(Some(buf.split_to(len).freeze()))
}

/// Parse a frame payload into a message.
pub fn parse_message(payload: &[u8]) -> Result<ProgressMessage> {
    serde_json::from_slice(payload).map_err(|e| ProgressError::Validation {
        field: "progress_payload".to_string(),
        message: format!("invalid progress message: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(n: u64) -> ProgressMessage {
        ProgressMessage::delta(n).unwrap()
    }

    #[test]
    fn test_wire_format_is_tagged_json() {
        let frame = encode_frame(&delta(7)).unwrap();
        let json = std::str::from_utf8(&frame[LEN_PREFIX..]).unwrap();
        assert_eq!(json, r#"{"type":"delta","n":7}"#);

        let frame = encode_frame(&ProgressMessage::Done).unwrap();
        let json = std::str::from_utf8(&frame[LEN_PREFIX..]).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
    }

    #[test]
    fn test_zero_delta_is_unrepresentable() {
        assert!(ProgressMessage::delta(0).is_none());
        let err = parse_message(br#"{"type":"delta","n":0}"#).unwrap_err();
        assert!(matches!(err, ProgressError::Validation { .. }));
    }

    #[test]
    fn test_negative_delta_rejected() {
        assert!(parse_message(br#"{"type":"delta","n":-3}"#).is_err());
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let frame = encode_frame(&delta(42)).unwrap();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&frame[..2]);
        assert!(decode_frame(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[2..frame.len() - 1]);
        assert!(decode_frame(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[frame.len() - 1..]);
        let payload = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(parse_message(&payload).unwrap(), delta(42));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_preserves_order_of_back_to_back_frames() {
        let mut buf = BytesMut::new();
        let mut writer = Vec::new();
        for message in [delta(1), delta(2), ProgressMessage::Done] {
            write_message(&mut writer, &message).unwrap();
        }
        buf.extend_from_slice(&writer);

        let mut decoded = Vec::new();
        while let Some(payload) = decode_frame(&mut buf).unwrap() {
            decoded.push(parse_message(&payload).unwrap());
        }
        assert_eq!(decoded, vec![delta(1), delta(2), ProgressMessage::Done]);
    }

    #[test]
    fn test_decode_oversized_returns_error() {
        let huge_len = (TransportConfig::MAX_FRAME_SIZE + 1) as u32;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        assert!(decode_frame(&mut buf).is_err());
    }

    #[test]
    fn test_units() {
        assert_eq!(delta(9).units(), 9);
        assert_eq!(ProgressMessage::Done.units(), 0);
    }
}
