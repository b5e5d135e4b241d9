//! MsgPack codec using `rmp-serde`.
//!
//! Always encodes with `to_vec_named`: structs become maps keyed by field
//! name, which is what the tagged worker messages need to decode again.
//! `to_vec` would emit positional arrays.
//!
//! # Example
//!
//! ```
//! use streamframe::codec::MsgPackCodec;
//! use streamframe::buffer::BufferStats;
//!
//! let stats = BufferStats {
//!     size: 10,
//!     capacity: 100,
//!     free_space: 90,
//!     utilization_percent: 10.0,
//! };
//! let encoded = MsgPackCodec::encode(&stats).unwrap();
//! let decoded: BufferStats = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, stats);
//! ```

use crate::error::Result;

/// MessagePack codec for worker messages, frames and configuration.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Serialize `value` with named struct fields.
    ///
    /// # Errors
    ///
    /// [`StreamError::MsgPackEncode`](crate::StreamError::MsgPackEncode) when
    /// serialization fails.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Deserialize a value from MsgPack bytes.
    ///
    /// # Errors
    ///
    /// [`StreamError::MsgPackDecode`](crate::StreamError::MsgPackDecode) for
    /// truncated input or a shape that does not match `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
