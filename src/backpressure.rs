//! Backpressure for in-flight data tasks.
//!
//! The pool hands a chunk to a worker only after taking a [`TaskPermit`]
//! from its [`TaskBudget`]. A producer that outruns the workers gets
//! [`StreamError::QueueFull`] right away instead of an ever-growing channel.
//!
//! The permit travels with the pending task and gives its slot back when
//! dropped, so completion, failure, timeout and termination all release it.
//!
//! Control requests (configure, stats, history, reset) never take a permit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Result, StreamError};

/// Default limit on in-flight data tasks.
pub const DEFAULT_MAX_PENDING: usize = 1024;

#[derive(Debug)]
struct Counter {
    in_flight: AtomicUsize,
    limit: usize,
}

/// Shared count of data tasks awaiting an answer, capped at a limit.
#[derive(Debug, Clone)]
pub struct TaskBudget {
    counter: Arc<Counter>,
}

impl TaskBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            counter: Arc::new(Counter {
                in_flight: AtomicUsize::new(0),
                limit,
            }),
        }
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.counter.limit
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.counter.in_flight.load(Ordering::Acquire)
    }

    /// Whether a permit would be granted right now.
    #[inline]
    pub fn has_room(&self) -> bool {
        self.in_flight() < self.limit()
    }

    /// Take one slot.
    ///
    /// # Errors
    ///
    /// `QueueFull` when `limit` permits are outstanding.
    pub fn try_acquire(&self) -> Result<TaskPermit> {
        let limit = self.counter.limit;
        self.counter
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map_err(|_| StreamError::QueueFull { limit })?;

        Ok(TaskPermit {
            counter: Arc::clone(&self.counter),
        })
    }
}

impl Default for TaskBudget {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

/// One granted slot; returned to the budget on drop.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct TaskPermit {
    counter: Arc<Counter>,
}

impl Drop for TaskPermit {
    fn drop(&mut self) {
        self.counter.in_flight.fetch_sub(1, Ordering::Release);
    }
}
