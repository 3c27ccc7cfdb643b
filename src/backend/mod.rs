//! Execution backend boundary
//!
//! The dispatcher never runs task code itself. It talks to an
//! [`ExecutionBackend`] which turns a registered [`TaskHandler`] into N
//! isolated worker contexts, and to the [`WorkerContext`] handles the
//! backend returns. Everything behind these traits (transport, isolation,
//! dependency injection) is backend business, not scheduling logic.
//!
//! Message shapes exchanged with a worker context:
//! - **Init:** handshake carrying the worker's id and the dependency list
//! - **Exec:** tracked execution request; the worker answers with a signal
//! - **Cast:** out-of-band execution request; no signal comes back
//! - **Stop:** directive to shut the context down

mod local;

pub use local::LocalBackend;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Messages sent from the dispatcher to a worker context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerRequest {
    /// Initialization handshake, sent once after launch
    Init { id: usize, deps: Vec<String> },

    /// Run one tracked task; the context must answer with a [`WorkerSignal`]
    Exec { event: String, args: serde_json::Value },

    /// Run an out-of-band message (broadcast); no signal is emitted
    Cast { event: String, args: serde_json::Value },

    /// Stop the context
    Stop,
}

/// Signals reported asynchronously by a worker context
///
/// Each signal carries the id of the slot it belongs to so the dispatcher
/// can route it to the stored callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerSignal {
    /// The current task finished successfully
    Done { id: usize, result: serde_json::Value },

    /// The current task failed
    Failed { id: usize, error: String },
}

/// The task-handling routine a pool is bound to
///
/// One handler instance is shared by every worker context in the pool; it
/// is registered by reference rather than transported as code. `init` is
/// invoked once per context with the handshake payload before any task runs.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Initialization hook, called with the context id and dependency list
    async fn init(&self, _id: usize, _deps: &[String]) {}

    /// Run one operation; `Err` becomes the task's failure payload
    async fn handle(&self, event: &str, args: serde_json::Value) -> Result<serde_json::Value, String>;
}

/// Handle on one live worker context
#[async_trait]
pub trait WorkerContext: Send + Sync {
    /// Deliver a request to the context
    async fn send(&self, request: WorkerRequest) -> eyre::Result<()>;

    /// Direct the context to stop; best-effort, never fails
    async fn stop(&self);
}

/// Factory for worker contexts
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Create one isolated worker context running `handler`
    ///
    /// Signals for tasks executed by this context are delivered on
    /// `signal_tx`, tagged with `id`.
    async fn launch(
        &self,
        id: usize,
        handler: Arc<dyn TaskHandler>,
        signal_tx: mpsc::UnboundedSender<WorkerSignal>,
    ) -> eyre::Result<Box<dyn WorkerContext>>;
}
