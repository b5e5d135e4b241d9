//! Worker request/response messages.
//!
//! Inside the pool, messages travel as [`Envelope`]s over channels and carry
//! a numeric correlation id. At the external boundary they are
//! [`WireMessage`]s: a map with `type`, an optional caller-supplied `id`
//! (echoed verbatim) and a `data` payload:
//!
//! ```json
//! {"type": "processData", "id": "task-7", "data": {"bytes": [104, 105, 10]}}
//! {"type": "frameProcessed", "id": "task-7", "data": {"frames": [...]}}
//! {"type": "getStats", "id": "task-8"}
//! ```
//!
//! Variants without a payload omit `data` (or send `null`).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::buffer::BufferStats;
use crate::codec::WireFormat;
use crate::config::FrameConfig;
use crate::error::{Result, StreamError};

use super::frame::Frame;

/// Pool-internal correlation id.
pub type CorrelationId = u64;

/// Identifies one logical byte stream (one connection).
///
/// All chunks of a stream are routed to the same worker, and each stream
/// gets its own buffer and detector inside that worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub u64);

impl StreamId {
    /// Stream used by calls that do not name one.
    pub const DEFAULT: StreamId = StreamId(0);
}

impl Default for StreamId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        StreamId(id)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// A message tagged with the correlation id of its task.
///
/// `stream` is `None` for requests addressed to the whole worker.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub id: CorrelationId,
    pub stream: Option<StreamId>,
    pub body: T,
}

impl<T> Envelope<T> {
    #[inline]
    pub fn new(id: CorrelationId, stream: Option<StreamId>, body: T) -> Self {
        Self { id, stream, body }
    }
}

/// Request handled by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum WorkerRequest {
    /// Replace the detection configuration.
    Configure(FrameConfig),
    /// Append bytes and extract frames.
    ProcessData { bytes: Bytes },
    /// Append several chunks in order and extract frames after each.
    ProcessBatch { chunks: Vec<Bytes> },
    /// Finalize a pending start-delimited frame.
    Flush,
    GetStats,
    /// Up to `count` buffered, unconsumed bytes.
    GetHistory { count: usize },
    /// Drop buffered bytes and restart the sequence counter.
    Reset,
    /// Start the stream over in the middle of a frame, after it moved
    /// between workers. Pool-internal only.
    #[serde(skip)]
    Resync,
    /// Stop the worker thread. Pool-internal only.
    #[serde(skip)]
    Shutdown,
}

impl WorkerRequest {
    /// Message types accepted on the wire.
    pub const TYPES: &'static [&'static str] = &[
        "configure",
        "processData",
        "processBatch",
        "flush",
        "getStats",
        "getHistory",
        "reset",
    ];

    /// Wire name of the request type.
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerRequest::Configure(_) => "configure",
            WorkerRequest::ProcessData { .. } => "processData",
            WorkerRequest::ProcessBatch { .. } => "processBatch",
            WorkerRequest::Flush => "flush",
            WorkerRequest::GetStats => "getStats",
            WorkerRequest::GetHistory { .. } => "getHistory",
            WorkerRequest::Reset => "reset",
            WorkerRequest::Resync => "resync",
            WorkerRequest::Shutdown => "shutdown",
        }
    }

    /// Whether the request produces frames.
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            WorkerRequest::ProcessData { .. }
                | WorkerRequest::ProcessBatch { .. }
                | WorkerRequest::Flush
        )
    }
}

/// Response produced by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum WorkerResponse {
    Configured,
    FrameProcessed { frames: Vec<Frame> },
    BatchProcessed { frames: Vec<Frame> },
    Stats(BufferStats),
    History { data: Bytes },
    Reset,
    /// Request could not be handled; the worker stays alive.
    Error { message: String },
}

impl WorkerResponse {
    /// Wire name of the response type.
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerResponse::Configured => "configured",
            WorkerResponse::FrameProcessed { .. } => "frameProcessed",
            WorkerResponse::BatchProcessed { .. } => "batchProcessed",
            WorkerResponse::Stats(_) => "stats",
            WorkerResponse::History { .. } => "history",
            WorkerResponse::Reset => "reset",
            WorkerResponse::Error { .. } => "error",
        }
    }

    pub(crate) fn error(err: impl std::fmt::Display) -> Self {
        WorkerResponse::Error {
            message: err.to_string(),
        }
    }

    /// Frames carried by a data response.
    ///
    /// # Errors
    ///
    /// `Protocol` for an `error` response or any non-frame response.
    pub fn into_frames(self) -> Result<Vec<Frame>> {
        match self {
            WorkerResponse::FrameProcessed { frames } | WorkerResponse::BatchProcessed { frames } => {
                Ok(frames)
            }
            WorkerResponse::Error { message } => Err(StreamError::Protocol(message)),
            other => Err(StreamError::Protocol(format!(
                "expected frames, got {}",
                other.type_name()
            ))),
        }
    }
}

/// External form of a message: `{type, id?, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

pub type WireRequest = WireMessage<WorkerRequest>;
pub type WireResponse = WireMessage<WorkerResponse>;

impl<T> WireMessage<T> {
    pub fn new(id: Option<String>, body: T) -> Self {
        Self { id, body }
    }
}

/// A request that could not be decoded, with whatever id could be recovered.
#[derive(Debug)]
pub struct WireRejection {
    pub id: Option<String>,
    pub error: StreamError,
}

impl WireRejection {
    /// The `error` response to send back.
    pub fn into_response(self) -> WireResponse {
        WireMessage::new(self.id, WorkerResponse::error(&self.error))
    }
}

#[derive(Deserialize)]
struct WireHeader {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
}

/// Decode a wire request.
///
/// The `type` and `id` fields are read first so that an unknown type or a
/// malformed payload can still be answered with the caller's id.
pub fn decode_request(
    format: WireFormat,
    bytes: &[u8],
) -> std::result::Result<WireRequest, WireRejection> {
    let header: WireHeader = format
        .decode(bytes)
        .map_err(|error| WireRejection { id: None, error })?;

    if !WorkerRequest::TYPES.contains(&header.kind.as_str()) {
        return Err(WireRejection {
            id: header.id,
            error: StreamError::Protocol(format!("unknown message type: {}", header.kind)),
        });
    }

    format.decode(bytes).map_err(|error| WireRejection {
        id: header.id,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[test]
    fn test_request_json_shape() {
        let request = WireMessage::new(
            Some("t1".into()),
            WorkerRequest::ProcessData {
                bytes: Bytes::from_static(b"hi"),
            },
        );
        let json: serde_json::Value =
            serde_json::from_slice(&JsonCodec::encode(&request).unwrap()).unwrap();

        assert_eq!(json["type"], "processData");
        assert_eq!(json["id"], "t1");
        assert_eq!(json["data"]["bytes"], serde_json::json!([104, 105]));
    }

    #[test]
    fn test_unit_request_without_data() {
        let request = decode_request(WireFormat::Json, br#"{"type":"getStats","id":"s"}"#).unwrap();
        assert_eq!(request.id.as_deref(), Some("s"));
        assert_eq!(request.body, WorkerRequest::GetStats);
    }

    #[test]
    fn test_unknown_type_keeps_id() {
        let rejection =
            decode_request(WireFormat::Json, br#"{"type":"explode","id":"42"}"#).unwrap_err();
        assert_eq!(rejection.id.as_deref(), Some("42"));
        assert!(matches!(rejection.error, StreamError::Protocol(_)));

        let response = rejection.into_response();
        assert_eq!(response.id.as_deref(), Some("42"));
        assert_eq!(response.body.type_name(), "error");
    }

    #[test]
    fn test_shutdown_is_not_a_wire_type() {
        let rejection = decode_request(WireFormat::Json, br#"{"type":"shutdown"}"#).unwrap_err();
        assert!(rejection.id.is_none());
        assert!(matches!(rejection.error, StreamError::Protocol(_)));
    }

    #[test]
    fn test_malformed_payload_keeps_id() {
        let rejection = decode_request(
            WireFormat::Json,
            br#"{"type":"getHistory","id":"h","data":{"count":"many"}}"#,
        )
        .unwrap_err();
        assert_eq!(rejection.id.as_deref(), Some("h"));
        assert!(matches!(rejection.error, StreamError::Json(_)));
    }

    #[test]
    fn test_garbage_has_no_id() {
        let rejection = decode_request(WireFormat::Json, b"\x00\x01").unwrap_err();
        assert!(rejection.id.is_none());
    }

    #[test]
    fn test_msgpack_request() {
        let request = WireMessage::new(
            Some("m".into()),
            WorkerRequest::GetHistory { count: 16 },
        );
        let encoded = WireFormat::MsgPack.encode(&request).unwrap();
        let decoded = decode_request(WireFormat::MsgPack, &encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_into_frames() {
        let frames = vec![Frame::new(&b"a"[..], 0, true)];
        let response = WorkerResponse::FrameProcessed {
            frames: frames.clone(),
        };
        assert_eq!(response.into_frames().unwrap(), frames);

        let err = WorkerResponse::error("boom").into_frames().unwrap_err();
        assert!(err.to_string().contains("boom"));

        assert!(WorkerResponse::Configured.into_frames().is_err());
    }
}
