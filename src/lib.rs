//! Workpool - fixed-size worker pool with FIFO dispatch
//!
//! Workpool runs one registered task-handling routine concurrently across a
//! fixed number of isolated worker contexts, queues excess work, and routes
//! every task's outcome back to the callback that submitted it. Callers
//! define their routine once; the pool owns the worker lifecycles.
//!
//! # Core Concepts
//!
//! - **One Handler, N Workers**: a single [`TaskHandler`] serves the whole
//!   pool; each worker context gets an `{id, deps}` init handshake
//! - **FIFO, No Priorities**: tasks dispatch in submission order to the
//!   first idle slot; completions re-trigger the dispatch loop
//! - **Callbacks, Not Futures**: each task carries its own completion
//!   callback, invoked exactly once unless the pool terminates first
//! - **Pluggable Backends**: the dispatcher schedules; an
//!   [`ExecutionBackend`] decides how workers actually run
//!
//! # Modules
//!
//! - [`pool`] - dispatcher core: slots, queue, assignment, termination
//! - [`backend`] - execution backend traits and the in-process reference
//!   backend
//! - [`error`] - pool and task error types

pub mod backend;
pub mod error;
pub mod pool;

// Re-export commonly used types
pub use backend::{ExecutionBackend, LocalBackend, TaskHandler, WorkerContext, WorkerRequest, WorkerSignal};
pub use error::{PoolError, TaskError};
pub use pool::{PoolConfig, PoolSnapshot, PoolState, PoolStats, Slot, SlotStatus, Task, TaskCallback, WorkerPool, host_parallelism};
