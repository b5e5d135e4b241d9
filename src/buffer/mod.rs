//! Buffer module - fixed-capacity byte storage and delimiter search.
//!
//! - [`RingBuffer`] - append at the tail, consume from the head, never grows
//! - [`Pattern`] - delimiter with a precomputed KMP failure table
//!
//! # Example
//!
//! ```
//! use streamframe::buffer::{Pattern, RingBuffer};
//!
//! let mut buffer = RingBuffer::new(64);
//! buffer.append(b"frame1\nframe2").unwrap();
//!
//! let newline = Pattern::new(b"\n".to_vec());
//! assert_eq!(buffer.find_pattern(&newline), Some(6));
//! ```

mod pattern;
mod ring_buffer;

pub use pattern::Pattern;
pub use ring_buffer::{BufferStats, RingBuffer};
