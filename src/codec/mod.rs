//! Codec module - serialization of worker protocol messages.
//!
//! - [`JsonCodec`] - JSON using `serde_json`
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`, struct-as-map)
//!
//! Codecs are marker structs with static methods. [`WireFormat`] picks one at
//! runtime when the format is only known from the transport.
//!
//! # Example
//!
//! ```
//! use streamframe::codec::{JsonCodec, MsgPackCodec, WireFormat};
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//!
//! let json = JsonCodec::encode(&[1, 2, 3]).unwrap();
//! assert_eq!(json, b"[1,2,3]");
//!
//! let decoded: Vec<u8> = WireFormat::Json.decode(&json).unwrap();
//! assert_eq!(decoded, vec![1, 2, 3]);
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use crate::error::Result;

/// Runtime codec selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    Json,
    MsgPack,
}

impl WireFormat {
    /// Encode with the selected codec.
    #[inline]
    pub fn encode<T: serde::Serialize>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            WireFormat::Json => JsonCodec::encode(value),
            WireFormat::MsgPack => MsgPackCodec::encode(value),
        }
    }

    /// Decode with the selected codec.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            WireFormat::Json => JsonCodec::decode(bytes),
            WireFormat::MsgPack => MsgPackCodec::decode(bytes),
        }
    }
}
