//! Slot and queue types for the dispatcher

use std::fmt;
use std::time::Instant;

use crate::error::TaskError;

/// Completion callback bound to one task
///
/// Invoked exactly once with `Ok(result)` on success or `Err(error)` on
/// failure. Tasks dropped by pool termination never see their callback run.
pub type TaskCallback = Box<dyn FnOnce(Result<serde_json::Value, TaskError>) + Send + 'static>;

/// One queued unit of work
pub struct Task {
    /// Opaque identifier telling the handler which operation to run
    pub event: String,

    /// Payload for that operation
    pub args: serde_json::Value,

    /// Completion callback; `None` means fire-and-forget
    pub callback: Option<TaskCallback>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("event", &self.event)
            .field("args", &self.args)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Busy/idle state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Idle,
    Busy,
}

/// Pool lifecycle state; `Terminated` is absorbing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Active,
    Terminated,
}

/// The dispatcher's view of one worker context
pub struct Slot {
    /// Position in the pool, stable for the slot's lifetime
    pub id: usize,

    /// Busy/idle state
    pub status: SlotStatus,

    /// Callback for the task currently assigned; present iff Busy
    callback: Option<TaskCallback>,

    /// Timestamp of the last assignment
    ///
    /// Recorded for diagnostics; timeout enforcement would read this, but
    /// none is implemented.
    pub dispatched_at: Option<Instant>,
}

impl Slot {
    /// Create an idle slot
    pub fn new(id: usize) -> Self {
        Self {
            id,
            status: SlotStatus::Idle,
            callback: None,
            dispatched_at: None,
        }
    }

    /// Mark the slot busy with the given task callback
    pub fn assign(&mut self, callback: Option<TaskCallback>, now: Instant) {
        self.status = SlotStatus::Busy;
        self.callback = callback;
        self.dispatched_at = Some(now);
    }

    /// Return the slot to idle, yielding the stored callback
    pub fn release(&mut self) -> Option<TaskCallback> {
        self.status = SlotStatus::Idle;
        self.dispatched_at = None;
        self.callback.take()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("callback", &self.callback.is_some())
            .field("dispatched_at", &self.dispatched_at)
            .finish()
    }
}

/// Counters accumulated over the pool's lifetime
#[derive(Debug, Default, Clone)]
pub struct PoolStats {
    pub total_submitted: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_broadcast: u64,
    pub peak_queue_depth: usize,
    pub peak_working: usize,
}

/// Point-in-time view of the pool for observability
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub state: PoolState,
    pub working: usize,
    pub queued: usize,
    pub stats: PoolStats,
}
