//! Error types for streamframe.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all frame-engine operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Detection configuration that can never produce frames.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Append would exceed the ring buffer capacity.
    #[error("Buffer overflow: {requested} bytes requested, {free} free of {capacity}")]
    BufferOverflow {
        requested: usize,
        free: usize,
        capacity: usize,
    },

    /// Read of more bytes than are currently buffered.
    #[error("Not enough data in buffer: {requested} requested, {available} available")]
    InsufficientData { requested: usize, available: usize },

    /// Capacity change would drop buffered bytes.
    #[error("Cannot shrink buffer to {requested} bytes while holding {size}")]
    CapacityTooSmall { requested: usize, size: usize },

    /// Frame trailer did not match its payload.
    #[error("Checksum mismatch on frame {sequence}")]
    ChecksumMismatch { sequence: u64 },

    /// Pool has no live workers (never started, or terminated).
    #[error("No worker available")]
    WorkerUnavailable,

    /// Worker could not accept a message.
    #[error("Worker {worker} crashed")]
    WorkerCrash { worker: usize },

    /// Worker thread exited while a task was pending.
    #[error("Worker {worker} exited")]
    WorkerExit { worker: usize },

    /// Worker did not answer before the task deadline.
    #[error("Worker {worker} did not respond within {timeout:?}")]
    WorkerTimeout { worker: usize, timeout: Duration },

    /// Unknown message type or unexpected response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Too many tasks in flight.
    #[error("Task queue full ({limit} in flight)")]
    QueueFull { limit: usize },

    /// I/O error (worker thread spawn).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}

impl StreamError {
    /// Whether the error means the pool cannot service work for this stream
    /// and the caller should reconnect or notify the user.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            StreamError::WorkerUnavailable
                | StreamError::WorkerCrash { .. }
                | StreamError::WorkerExit { .. }
                | StreamError::WorkerTimeout { .. }
        )
    }
}

/// Result type alias using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;
