//! Pool dispatcher: slots, FIFO queue, assignment and completion routing
//!
//! The pool owns a fixed set of slots (one per worker context) and an
//! unbounded FIFO queue of pending tasks. The dispatch loop assigns queued
//! tasks to idle slots; completion and failure signals route back to each
//! task's own callback.

mod config;
mod core;
mod queue;

pub use config::PoolConfig;
pub use core::{WorkerPool, host_parallelism};
pub use queue::{PoolSnapshot, PoolState, PoolStats, Slot, SlotStatus, Task, TaskCallback};
