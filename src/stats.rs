//! Pool statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Counters maintained by the pool. Callers always get a copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolStatistics {
    /// Worker threads started, replacements included.
    pub workers_created: usize,
    pub workers_terminated: usize,
    /// Data tasks answered with frames.
    pub tasks_processed: u64,
    /// Data tasks answered with an `error` response.
    pub error_responses: u64,
    pub total_processing_time: Duration,
    pub average_processing_time: Duration,
    pub active_workers: usize,
    /// Data tasks accepted and not yet answered.
    pub queued_tasks: usize,
}

impl PoolStatistics {
    /// Account for one data task answered with frames.
    pub fn record_completion(&mut self, elapsed: Duration) {
        self.tasks_processed += 1;
        self.total_processing_time += elapsed;
        self.average_processing_time = average(self.total_processing_time, self.tasks_processed);
    }

    /// Account for one data task the worker could not process.
    pub fn record_error(&mut self) {
        self.error_responses += 1;
    }
}

fn average(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(count) => total / count,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}
