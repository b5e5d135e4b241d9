//! # streamframe
//!
//! Frame detection engine for continuous byte streams (serial ports, TCP
//! and UDP sockets), with a pool of worker threads that decodes many
//! streams in parallel.
//!
//! ## Architecture
//!
//! - **Engine**: [`buffer::RingBuffer`] holds raw bytes, [`detector::FrameDetector`]
//!   pulls delimited, fixed-length or checksummed [`Frame`]s out of it
//! - **Workers**: each OS thread owns its buffers and detectors and talks to
//!   the pool only through messages
//! - **Pool**: [`WorkerPool`] routes chunks with per-stream stickiness,
//!   matches replies by correlation id, enforces task deadlines and
//!   backpressure, restarts stopped workers, keeps statistics and publishes
//!   [`PoolEvent`]s
//!
//! ## Example
//!
//! ```
//! use streamframe::{FrameConfig, WorkerPoolBuilder};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> streamframe::Result<()> {
//! let pool = WorkerPoolBuilder::new()
//!     .max_workers(4)
//!     .frame_config(FrameConfig::start_end("<", ">"))
//!     .build()?;
//!
//! let frames = pool.process_data(&b"garbage<A>junk<B>"[..])?.await?;
//! let payloads: Vec<&[u8]> = frames.iter().map(|f| f.payload()).collect();
//! assert_eq!(payloads, [&b"A"[..], &b"B"[..]]);
//!
//! pool.terminate().await;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod detector;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod stats;
pub mod worker;

mod backpressure;

pub use checksum::ChecksumAlgorithm;
pub use config::{ConfigUpdate, FrameConfig, FrameDetection, OperationMode};
pub use error::{Result, StreamError};
pub use pool::{Pending, PendingFrames, PoolEvent, WorkerPool, WorkerPoolBuilder, WorkerState};
pub use protocol::{Frame, StreamId};
pub use stats::PoolStatistics;
