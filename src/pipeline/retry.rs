//! Bounded-attempt retry buffer for outreach delivery.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::pipeline::types::LeadTask;

/// A task whose delivery failed, waiting for another attempt.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    pub task: LeadTask,
    /// Delivery attempts made so far (at least 1).
    pub attempt: u32,
    /// Earliest time the next attempt may run.
    pub not_before: Instant,
}

/// What happened to a failed delivery.
#[derive(Debug)]
pub enum RetryDisposition {
    /// Buffered again; `attempt` sends have been made.
    Requeued { attempt: u32 },
    /// The cap is reached. The entry is handed back for the final write.
    Exhausted(RetryEntry),
}

/// Holding area owned by the outreach worker.
///
/// `max_attempts` counts every send, the first one included, so a lead is
/// never sent to more than `max_attempts` times.
#[derive(Debug)]
pub struct RetryBuffer {
    entries: VecDeque<RetryEntry>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl RetryBuffer {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Buffer a task after its first failed send.
    pub fn defer(&mut self, task: LeadTask, now: Instant) -> RetryDisposition {
        let entry = RetryEntry {
            task,
            attempt: 1,
            not_before: now,
        };
        self.requeue(entry, now)
    }

    /// Remove and return every entry whose delay has elapsed, oldest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<RetryEntry> {
        let (due, waiting): (VecDeque<_>, VecDeque<_>) = self
            .entries
            .drain(..)
            .partition(|entry| entry.not_before <= now);
        self.entries = waiting;
        due.into()
    }

    /// Record another failed send for an entry taken with `take_due`.
    pub fn record_failure(&mut self, mut entry: RetryEntry, now: Instant) -> RetryDisposition {
        entry.attempt += 1;
        self.requeue(entry, now)
    }

    fn requeue(&mut self, mut entry: RetryEntry, now: Instant) -> RetryDisposition {
        if entry.attempt >= self.max_attempts {
            return RetryDisposition::Exhausted(entry);
        }
        let attempt = entry.attempt;
        entry.not_before = now + self.retry_delay;
        self.entries.push_back(entry);
        RetryDisposition::Requeued { attempt }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
