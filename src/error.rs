//! Error types for the pool and for individual tasks

use thiserror::Error;

/// Errors raised by pool construction and submission operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool configuration is unusable (e.g. a zero parallelism hint)
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The pool has been terminated; no further submissions are accepted
    #[error("pool terminated")]
    Terminated,

    /// The execution backend failed to launch or initialize a worker context
    #[error("execution backend error: {0}")]
    Backend(#[from] eyre::Report),
}

/// Failure delivered to a task's callback
///
/// Execution errors are local to the failing task: they reach exactly that
/// task's callback and are never thrown into caller code or escalated to
/// other in-flight tasks (unless `terminate_on_error` shuts the pool down).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The worker context reported a failure while running the task
    #[error("task execution failed: {0}")]
    Execution(String),
}
