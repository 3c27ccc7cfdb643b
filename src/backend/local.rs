//! Reference backend running workers as tokio tasks
//!
//! Each worker context is one spawned task with its own request channel.
//! Requests are served in arrival order, so a Cast delivered to a busy
//! worker queues behind the in-flight task, the same way a message posted
//! to a busy browser worker waits in its event queue.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::eyre;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ExecutionBackend, TaskHandler, WorkerContext, WorkerRequest, WorkerSignal};

/// Buffer for each worker's request channel
const REQUEST_BUFFER: usize = 64;

/// In-process [`ExecutionBackend`] backed by tokio tasks
#[derive(Debug, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Handle on one spawned worker task
struct LocalWorker {
    tx: mpsc::Sender<WorkerRequest>,
}

#[async_trait]
impl WorkerContext for LocalWorker {
    async fn send(&self, request: WorkerRequest) -> eyre::Result<()> {
        self.tx.send(request).await.map_err(|_| eyre!("worker channel closed"))
    }

    async fn stop(&self) {
        // The worker may already be gone; stop is best-effort
        let _ = self.tx.send(WorkerRequest::Stop).await;
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    async fn launch(
        &self,
        id: usize,
        handler: Arc<dyn TaskHandler>,
        signal_tx: mpsc::UnboundedSender<WorkerSignal>,
    ) -> eyre::Result<Box<dyn WorkerContext>> {
        debug!(id, "LocalBackend::launch: spawning worker task");
        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);

        tokio::spawn(worker_loop(id, rx, handler, signal_tx));

        Ok(Box::new(LocalWorker { tx }))
    }
}

/// Serve requests until Stop or channel close
async fn worker_loop(
    id: usize,
    mut rx: mpsc::Receiver<WorkerRequest>,
    handler: Arc<dyn TaskHandler>,
    signal_tx: mpsc::UnboundedSender<WorkerSignal>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            WorkerRequest::Init { id, deps } => {
                debug!(id, ?deps, "worker_loop: init handshake");
                handler.init(id, &deps).await;
            }

            WorkerRequest::Exec { event, args } => {
                debug!(id, %event, "worker_loop: executing task");
                let signal = match handler.handle(&event, args).await {
                    Ok(result) => WorkerSignal::Done { id, result },
                    Err(error) => WorkerSignal::Failed { id, error },
                };
                if signal_tx.send(signal).is_err() {
                    debug!(id, "worker_loop: dispatcher gone, dropping signal");
                }
            }

            WorkerRequest::Cast { event, args } => {
                debug!(id, %event, "worker_loop: out-of-band message");
                if let Err(error) = handler.handle(&event, args).await {
                    warn!(id, %event, %error, "worker_loop: out-of-band message failed");
                }
            }

            WorkerRequest::Stop => {
                debug!(id, "worker_loop: stop directive");
                break;
            }
        }
    }

    debug!(id, "worker_loop: exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records init handshakes and echoes args back
    struct EchoHandler {
        inits: Mutex<Vec<(usize, Vec<String>)>>,
    }

    impl EchoHandler {
        fn new() -> Self {
            Self {
                inits: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn init(&self, id: usize, deps: &[String]) {
            self.inits.lock().unwrap().push((id, deps.to_vec()));
        }

        async fn handle(&self, event: &str, args: serde_json::Value) -> Result<serde_json::Value, String> {
            match event {
                "echo" => Ok(args),
                other => Err(format!("unknown event: {other}")),
            }
        }
    }

    #[tokio::test]
    async fn test_init_handshake_reaches_handler() {
        let handler = Arc::new(EchoHandler::new());
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

        let ctx = LocalBackend::new()
            .launch(0, handler.clone(), signal_tx)
            .await
            .unwrap();
        ctx.send(WorkerRequest::Init {
            id: 0,
            deps: vec!["fft".to_string()],
        })
        .await
        .unwrap();

        // Echo round-trip proves the init was processed first (FIFO channel)
        ctx.send(WorkerRequest::Exec {
            event: "echo".to_string(),
            args: serde_json::json!(1),
        })
        .await
        .unwrap();
        signal_rx.recv().await.unwrap();

        let inits = handler.inits.lock().unwrap().clone();
        assert_eq!(inits, vec![(0, vec!["fft".to_string()])]);
    }

    #[tokio::test]
    async fn test_exec_emits_done_signal() {
        let handler = Arc::new(EchoHandler::new());
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

        let ctx = LocalBackend::new().launch(2, handler, signal_tx).await.unwrap();
        ctx.send(WorkerRequest::Exec {
            event: "echo".to_string(),
            args: serde_json::json!({"n": 7}),
        })
        .await
        .unwrap();

        match signal_rx.recv().await.unwrap() {
            WorkerSignal::Done { id, result } => {
                assert_eq!(id, 2);
                assert_eq!(result["n"], 7);
            }
            other => panic!("Expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exec_failure_emits_failed_signal() {
        let handler = Arc::new(EchoHandler::new());
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

        let ctx = LocalBackend::new().launch(1, handler, signal_tx).await.unwrap();
        ctx.send(WorkerRequest::Exec {
            event: "explode".to_string(),
            args: serde_json::Value::Null,
        })
        .await
        .unwrap();

        match signal_rx.recv().await.unwrap() {
            WorkerSignal::Failed { id, error } => {
                assert_eq!(id, 1);
                assert!(error.contains("unknown event"));
            }
            other => panic!("Expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cast_emits_no_signal() {
        let handler = Arc::new(EchoHandler::new());
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

        let ctx = LocalBackend::new().launch(0, handler, signal_tx).await.unwrap();
        ctx.send(WorkerRequest::Cast {
            event: "echo".to_string(),
            args: serde_json::json!("ping"),
        })
        .await
        .unwrap();

        // Exec after the cast; the first (and only) signal must be its Done
        ctx.send(WorkerRequest::Exec {
            event: "echo".to_string(),
            args: serde_json::json!("tracked"),
        })
        .await
        .unwrap();

        match signal_rx.recv().await.unwrap() {
            WorkerSignal::Done { result, .. } => assert_eq!(result, "tracked"),
            other => panic!("Expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_ends_worker() {
        let handler = Arc::new(EchoHandler::new());
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

        let ctx = LocalBackend::new().launch(0, handler, signal_tx).await.unwrap();
        ctx.stop().await;

        // Once the worker exits its signal sender is dropped
        assert!(signal_rx.recv().await.is_none());
    }
}
