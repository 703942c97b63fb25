//! Two-lane FIFO task queue shared by the pipeline stages.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::pipeline::types::LeadTask;

/// Verification and outreach channels.
///
/// Safe to share across tasks behind an `Arc`. Dequeue never waits; an empty
/// lane returns `None`. Every task is handed to exactly one dequeue call.
#[derive(Debug, Default)]
pub struct TaskQueue {
    verification: Mutex<VecDeque<LeadTask>>,
    outreach: Mutex<VecDeque<LeadTask>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_verification(&self, task: LeadTask) {
        lock(&self.verification).push_back(task);
    }

    pub fn enqueue_outreach(&self, task: LeadTask) {
        lock(&self.outreach).push_back(task);
    }

    pub fn try_dequeue_verification(&self) -> Option<LeadTask> {
        lock(&self.verification).pop_front()
    }

    pub fn try_dequeue_outreach(&self) -> Option<LeadTask> {
        lock(&self.outreach).pop_front()
    }

    pub fn verification_len(&self) -> usize {
        lock(&self.verification).len()
    }

    pub fn outreach_len(&self) -> usize {
        lock(&self.outreach).len()
    }
}

// A panic while holding the lock cannot leave a VecDeque half-updated.
fn lock(lane: &Mutex<VecDeque<LeadTask>>) -> MutexGuard<'_, VecDeque<LeadTask>> {
    lane.lock().unwrap_or_else(PoisonError::into_inner)
}
