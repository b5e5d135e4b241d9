//! Protocol module - frame type and worker messages.
//!
//! - [`Frame`]: a decoded payload with sequence, timestamp and checksum flag
//! - [`WorkerRequest`] / [`WorkerResponse`]: the worker message contract
//! - [`WireMessage`]: the external `{type, id, data}` form of those messages

mod frame;
mod messages;

pub use frame::Frame;
pub use messages::{
    decode_request, CorrelationId, Envelope, StreamId, WireMessage, WireRejection, WireRequest,
    WireResponse, WorkerRequest, WorkerResponse,
};
