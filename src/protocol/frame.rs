//! Decoded frame type.
//!
//! A [`Frame`] holds the payload with delimiters and checksum trailer
//! stripped. Uses `bytes::Bytes` so frames can be handed downstream without
//! copying.
//!
//! # Example
//!
//! ```
//! use streamframe::protocol::Frame;
//!
//! let frame = Frame::new(&b"hello"[..], 7, true);
//!
//! assert_eq!(frame.payload(), b"hello");
//! assert_eq!(frame.sequence, 7);
//! assert!(frame.verified().is_ok());
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// A complete, validated application frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Payload bytes.
    pub data: Bytes,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Per-worker sequence number, starting at 0 after each reset.
    pub sequence: u64,
    /// `false` when the checksum trailer did not match.
    pub checksum_valid: bool,
}

impl Frame {
    /// Create a frame stamped with the current time.
    pub fn new(data: impl Into<Bytes>, sequence: u64, checksum_valid: bool) -> Self {
        Self {
            data: data.into(),
            timestamp: now_millis(),
            sequence,
            checksum_valid,
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Get the payload length.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Escalate a failed checksum into an error.
    pub fn verified(self) -> Result<Self> {
        if self.checksum_valid {
            Ok(self)
        } else {
            Err(StreamError::ChecksumMismatch {
                sequence: self.sequence,
            })
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::new(Bytes::from_static(b"abc"), 3, true);
        assert_eq!(frame.payload(), b"abc");
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
        assert!(frame.timestamp > 0);
    }

    #[test]
    fn test_verified_rejects_bad_checksum() {
        let frame = Frame::new(&b"abc"[..], 9, false);
        assert!(matches!(
            frame.verified(),
            Err(StreamError::ChecksumMismatch { sequence: 9 })
        ));
    }

    #[test]
    fn test_serializes_camel_case() {
        let frame = Frame::new(&b"A"[..], 1, true);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["checksumValid"], true);
        assert_eq!(json["sequence"], 1);
        assert_eq!(json["data"], serde_json::json!([65]));
    }
}
