//! Frame detection configuration.
//!
//! [`FrameConfig`] is the immutable snapshot each worker runs with. It is
//! serialized with camelCase field names and numeric mode discriminants so it
//! travels unchanged inside a `configure` worker message:
//!
//! ```json
//! {
//!   "operationMode": 0,
//!   "frameDetectionMode": 1,
//!   "startSequence": "<",
//!   "finishSequence": ">",
//!   "checksumAlgorithm": "crc16",
//!   "bufferCapacity": 65536
//! }
//! ```
//!
//! Omitted fields take their defaults. Partial updates go through
//! [`ConfigUpdate`] and [`FrameConfig::merge`].
//!
//! # Example
//!
//! ```
//! use streamframe::config::{ConfigUpdate, FrameConfig, OperationMode};
//!
//! let config = FrameConfig::start_end("<", ">").with_checksum("crc16");
//! let update = ConfigUpdate {
//!     operation_mode: Some(OperationMode::DeviceSendsJson),
//!     ..Default::default()
//! };
//!
//! let merged = config.merge(&update);
//! assert_eq!(merged.operation_mode, OperationMode::DeviceSendsJson);
//! assert_eq!(merged.checksum_algorithm.name(), "crc16");
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::checksum::ChecksumAlgorithm;
use crate::error::{Result, StreamError};

/// Default ring buffer capacity per worker (10 MiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 10 * 1024 * 1024;

/// How the device is expected to talk to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum OperationMode {
    /// Framing fully described by the project configuration.
    ProjectFile = 0,
    /// Device emits JSON documents.
    DeviceSendsJson = 1,
    /// Plain line-oriented output; any common line ending ends a frame.
    #[default]
    QuickPlot = 2,
}

impl TryFrom<u8> for OperationMode {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::ProjectFile),
            1 => Ok(Self::DeviceSendsJson),
            2 => Ok(Self::QuickPlot),
            other => Err(StreamError::Configuration(format!(
                "unknown operation mode {other}"
            ))),
        }
    }
}

impl From<OperationMode> for u8 {
    fn from(mode: OperationMode) -> Self {
        mode as u8
    }
}

/// Frame boundary rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum FrameDetection {
    #[default]
    EndDelimiterOnly = 0,
    StartAndEndDelimiter = 1,
    /// Fixed-length frames.
    NoDelimiters = 2,
    StartDelimiterOnly = 3,
}

impl TryFrom<u8> for FrameDetection {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::EndDelimiterOnly),
            1 => Ok(Self::StartAndEndDelimiter),
            2 => Ok(Self::NoDelimiters),
            3 => Ok(Self::StartDelimiterOnly),
            other => Err(StreamError::Configuration(format!(
                "unknown frame detection mode {other}"
            ))),
        }
    }
}

impl From<FrameDetection> for u8 {
    fn from(mode: FrameDetection) -> Self {
        mode as u8
    }
}

/// Detection configuration held by every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameConfig {
    pub operation_mode: OperationMode,
    pub frame_detection_mode: FrameDetection,
    pub start_sequence: Bytes,
    pub finish_sequence: Bytes,
    /// Payload length in `NoDelimiters` mode.
    pub fixed_frame_length: usize,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub buffer_capacity: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            operation_mode: OperationMode::QuickPlot,
            frame_detection_mode: FrameDetection::EndDelimiterOnly,
            start_sequence: Bytes::new(),
            finish_sequence: Bytes::from_static(b"\n"),
            fixed_frame_length: 0,
            checksum_algorithm: ChecksumAlgorithm::None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl FrameConfig {
    /// Frames end at `finish`.
    pub fn end_delimited(finish: impl Into<Bytes>) -> Self {
        Self {
            operation_mode: OperationMode::ProjectFile,
            frame_detection_mode: FrameDetection::EndDelimiterOnly,
            finish_sequence: finish.into(),
            ..Self::default()
        }
    }

    /// Frames sit between `start` and `finish`.
    pub fn start_end(start: impl Into<Bytes>, finish: impl Into<Bytes>) -> Self {
        Self {
            operation_mode: OperationMode::ProjectFile,
            frame_detection_mode: FrameDetection::StartAndEndDelimiter,
            start_sequence: start.into(),
            finish_sequence: finish.into(),
            ..Self::default()
        }
    }

    /// Frames are exactly `length` payload bytes.
    pub fn fixed_length(length: usize) -> Self {
        Self {
            operation_mode: OperationMode::ProjectFile,
            frame_detection_mode: FrameDetection::NoDelimiters,
            finish_sequence: Bytes::new(),
            fixed_frame_length: length,
            ..Self::default()
        }
    }

    /// Frames run from one `start` to the next.
    pub fn start_delimited(start: impl Into<Bytes>) -> Self {
        Self {
            operation_mode: OperationMode::ProjectFile,
            frame_detection_mode: FrameDetection::StartDelimiterOnly,
            start_sequence: start.into(),
            finish_sequence: Bytes::new(),
            ..Self::default()
        }
    }

    /// Set the checksum trailer algorithm by name.
    pub fn with_checksum(mut self, algorithm: impl Into<ChecksumAlgorithm>) -> Self {
        self.checksum_algorithm = algorithm.into();
        self
    }

    /// Set the per-worker ring buffer capacity.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Load a configuration from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Report settings under which the detector can never emit a frame.
    ///
    /// Workers accept such configurations anyway and only log the problem.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(StreamError::Configuration(
                "buffer capacity must be greater than zero".into(),
            ));
        }

        let quick_plot = self.operation_mode == OperationMode::QuickPlot;
        match self.frame_detection_mode {
            FrameDetection::EndDelimiterOnly if self.finish_sequence.is_empty() && !quick_plot => {
                Err(StreamError::Configuration(
                    "end delimiter mode requires a finish sequence".into(),
                ))
            }
            FrameDetection::StartAndEndDelimiter
                if self.start_sequence.is_empty() || self.finish_sequence.is_empty() =>
            {
                Err(StreamError::Configuration(
                    "start and end delimiter mode requires both sequences".into(),
                ))
            }
            FrameDetection::NoDelimiters if self.fixed_frame_length == 0 => Err(
                StreamError::Configuration("fixed frame length must be greater than zero".into()),
            ),
            FrameDetection::StartDelimiterOnly if self.start_sequence.is_empty() => Err(
                StreamError::Configuration("start delimiter mode requires a start sequence".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Copy of `self` with every field present in `update` replaced.
    pub fn merge(&self, update: &ConfigUpdate) -> Self {
        let mut merged = self.clone();
        if let Some(mode) = update.operation_mode {
            merged.operation_mode = mode;
        }
        if let Some(mode) = update.frame_detection_mode {
            merged.frame_detection_mode = mode;
        }
        if let Some(start) = &update.start_sequence {
            merged.start_sequence = start.clone();
        }
        if let Some(finish) = &update.finish_sequence {
            merged.finish_sequence = finish.clone();
        }
        if let Some(length) = update.fixed_frame_length {
            merged.fixed_frame_length = length;
        }
        if let Some(algorithm) = &update.checksum_algorithm {
            merged.checksum_algorithm = algorithm.clone();
        }
        if let Some(capacity) = update.buffer_capacity {
            merged.buffer_capacity = capacity;
        }
        merged
    }
}

/// Partial configuration; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_mode: Option<OperationMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_detection_mode: Option<FrameDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_sequence: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_sequence: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_frame_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_capacity: Option<usize>,
}

impl ConfigUpdate {
    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
