//! Worker pool dispatcher

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::backend::{ExecutionBackend, TaskHandler, WorkerContext, WorkerRequest, WorkerSignal};
use crate::error::{PoolError, TaskError};

use super::config::PoolConfig;
use super::queue::{PoolSnapshot, PoolState, PoolStats, Slot, SlotStatus, Task};

/// Host parallelism query, the default hint for [`WorkerPool::build`]
pub fn host_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Bookkeeping protected by the pool mutex
///
/// Queue, counters and the slot table are mutated only under this lock,
/// from either a public API call or the signal listener.
struct PoolInner {
    state: PoolState,
    working: usize,
    queue: VecDeque<Task>,
    slots: Vec<Slot>,
    contexts: Vec<Box<dyn WorkerContext>>,
    stats: PoolStats,
}

impl PoolInner {
    /// Assign at most one queued task to the first idle slot
    ///
    /// Level-triggered and safe to invoke redundantly; runs after every
    /// submission and every completion. One assignment per invocation: a
    /// backlog drains one dispatch per triggering event, relying on
    /// completions re-running the loop.
    async fn dispatch_next(&mut self) {
        if self.working == self.slots.len() || self.queue.is_empty() {
            return;
        }

        for id in 0..self.slots.len() {
            if self.slots[id].status != SlotStatus::Idle {
                continue;
            }

            let Some(task) = self.queue.pop_front() else { return };
            let Task { event, args, callback } = task;
            debug!(slot = id, %event, "dispatching task");

            let request = WorkerRequest::Exec { event, args };
            match self.contexts[id].send(request).await {
                Ok(()) => {
                    self.slots[id].assign(callback, Instant::now());
                    self.working += 1;
                    self.stats.peak_working = self.stats.peak_working.max(self.working);
                }
                Err(error) => {
                    warn!(slot = id, %error, "failed to deliver task to worker");
                    if let Some(callback) = callback {
                        callback(Err(TaskError::Execution(format!("dispatch failed: {error}"))));
                    }
                }
            }
            break;
        }
    }

    /// Stop every context, drop queued tasks, enter Terminated
    async fn shut_down(&mut self) {
        for ctx in &self.contexts {
            ctx.stop().await;
        }
        let dropped = self.queue.len();
        self.queue.clear();
        self.state = PoolState::Terminated;
        info!(dropped, "pool terminated");
    }
}

/// Fixed-size pool of worker contexts with a FIFO task queue
///
/// Built once around a registered [`TaskHandler`]; tasks submitted here run
/// concurrently across the pool, completions come back through per-task
/// callbacks. Cheap to share: `build` returns an `Arc`.
pub struct WorkerPool {
    size: usize,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
}

impl WorkerPool {
    /// Build a pool sized from the host parallelism query
    pub async fn build(
        backend: &dyn ExecutionBackend,
        handler: Arc<dyn TaskHandler>,
        config: PoolConfig,
    ) -> Result<Arc<Self>, PoolError> {
        Self::build_with_parallelism(backend, handler, config, host_parallelism()).await
    }

    /// Build a pool with an explicit available-parallelism hint
    ///
    /// The effective size is `min(max_workers, parallelism)` when
    /// `max_workers > 0`, else `parallelism`. An explicit hint keeps pool
    /// sizing deterministic in tests.
    pub async fn build_with_parallelism(
        backend: &dyn ExecutionBackend,
        handler: Arc<dyn TaskHandler>,
        config: PoolConfig,
        parallelism: usize,
    ) -> Result<Arc<Self>, PoolError> {
        if parallelism == 0 {
            return Err(PoolError::InvalidConfig("parallelism hint must be at least 1".to_string()));
        }

        let size = config.effective_workers(parallelism);
        info!(size, max_workers = config.max_workers, "building worker pool");

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let mut contexts = Vec::with_capacity(size);
        for id in 0..size {
            let ctx = backend.launch(id, Arc::clone(&handler), signal_tx.clone()).await?;
            ctx.send(WorkerRequest::Init {
                id,
                deps: config.deps.clone(),
            })
            .await?;
            contexts.push(ctx);
        }

        let slots = (0..size).map(Slot::new).collect();
        let pool = Arc::new(Self {
            size,
            config,
            inner: Mutex::new(PoolInner {
                state: PoolState::Active,
                working: 0,
                queue: VecDeque::new(),
                slots,
                contexts,
                stats: PoolStats::default(),
            }),
        });

        tokio::spawn(Self::listen(Arc::downgrade(&pool), signal_rx));

        Ok(pool)
    }

    /// Number of worker contexts, fixed at construction
    pub fn size(&self) -> usize {
        self.size
    }

    /// The configuration the pool was built with
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Submit a task with a completion callback
    ///
    /// The task enters the FIFO queue and is assigned to a worker as soon
    /// as one is idle. The callback fires exactly once, with `Ok(result)`
    /// or `Err(error)` — unless the pool terminates first, in which case a
    /// still-queued task is dropped and its callback never runs.
    pub async fn submit(
        &self,
        event: impl Into<String>,
        args: serde_json::Value,
        callback: impl FnOnce(Result<serde_json::Value, TaskError>) + Send + 'static,
    ) -> Result<(), PoolError> {
        self.enqueue(Task {
            event: event.into(),
            args,
            callback: Some(Box::new(callback)),
        })
        .await
    }

    /// Submit a task without a callback
    pub async fn submit_detached(&self, event: impl Into<String>, args: serde_json::Value) -> Result<(), PoolError> {
        self.enqueue(Task {
            event: event.into(),
            args,
            callback: None,
        })
        .await
    }

    async fn enqueue(&self, task: Task) -> Result<(), PoolError> {
        debug!(event = %task.event, "WorkerPool::enqueue: called");
        let mut inner = self.inner.lock().await;

        if inner.state == PoolState::Terminated {
            return Err(PoolError::Terminated);
        }

        inner.queue.push_back(task);
        inner.stats.total_submitted += 1;
        inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(inner.queue.len());

        inner.dispatch_next().await;
        Ok(())
    }

    /// Send the same message to every worker context, busy or idle
    ///
    /// Out-of-band by design (pushing configuration, cancellation hints):
    /// bypasses the queue, the working count and callback bookkeeping, so
    /// a busy worker can end up with two concurrent commands. Delivery is
    /// best-effort per worker.
    pub async fn broadcast(&self, event: &str, args: serde_json::Value) -> Result<(), PoolError> {
        debug!(%event, "WorkerPool::broadcast: called");
        let mut inner = self.inner.lock().await;

        if inner.state == PoolState::Terminated {
            return Err(PoolError::Terminated);
        }

        for (id, ctx) in inner.contexts.iter().enumerate() {
            let request = WorkerRequest::Cast {
                event: event.to_string(),
                args: args.clone(),
            };
            if let Err(error) = ctx.send(request).await {
                warn!(slot = id, %error, "broadcast delivery failed");
            }
        }

        inner.stats.total_broadcast += 1;
        Ok(())
    }

    /// Terminate the pool: stop every worker, drop queued tasks
    ///
    /// Idempotent; a second call is a no-op. Tasks still queued are
    /// discarded without their callbacks being invoked.
    pub async fn terminate(&self) {
        debug!("WorkerPool::terminate: called");
        let mut inner = self.inner.lock().await;

        if inner.state == PoolState::Terminated {
            debug!("WorkerPool::terminate: already terminated");
            return;
        }

        inner.shut_down().await;
    }

    /// Current lifecycle state
    pub async fn state(&self) -> PoolState {
        self.inner.lock().await.state
    }

    /// Lifetime counters
    pub async fn stats(&self) -> PoolStats {
        self.inner.lock().await.stats.clone()
    }

    /// Point-in-time view of state, working count and queue depth
    pub async fn snapshot(&self) -> PoolSnapshot {
        let inner = self.inner.lock().await;
        PoolSnapshot {
            state: inner.state,
            working: inner.working,
            queued: inner.queue.len(),
            stats: inner.stats.clone(),
        }
    }

    /// Drain worker signals for the pool's lifetime
    async fn listen(pool: Weak<WorkerPool>, mut rx: mpsc::UnboundedReceiver<WorkerSignal>) {
        while let Some(signal) = rx.recv().await {
            let Some(pool) = pool.upgrade() else {
                debug!("pool dropped, listener exiting");
                return;
            };
            match signal {
                WorkerSignal::Done { id, result } => pool.on_done(id, result).await,
                WorkerSignal::Failed { id, error } => pool.on_failed(id, error).await,
            }
        }
        debug!("signal channel closed, listener exiting");
    }

    /// A worker reported success for its current task
    async fn on_done(&self, id: usize, result: serde_json::Value) {
        debug!(slot = id, "WorkerPool::on_done: called");
        let mut inner = self.inner.lock().await;

        // In-flight signals may race with shutdown
        if inner.state == PoolState::Terminated {
            debug!(slot = id, "ignoring completion after termination");
            return;
        }

        let callback = match inner.slots.get_mut(id) {
            Some(slot) if slot.status == SlotStatus::Busy => slot.release(),
            Some(_) => {
                debug!(slot = id, "completion for idle slot, ignoring");
                return;
            }
            None => {
                warn!(slot = id, "completion from unknown slot");
                return;
            }
        };

        inner.working -= 1;
        inner.stats.total_completed += 1;

        if let Some(callback) = callback {
            callback(Ok(result));
        }

        inner.dispatch_next().await;
    }

    /// A worker reported failure for its current task
    async fn on_failed(&self, id: usize, error: String) {
        debug!(slot = id, %error, "WorkerPool::on_failed: called");
        let mut inner = self.inner.lock().await;

        if inner.state == PoolState::Terminated {
            debug!(slot = id, "ignoring failure after termination");
            return;
        }

        let callback = match inner.slots.get_mut(id) {
            Some(slot) if slot.status == SlotStatus::Busy => slot.release(),
            Some(_) => {
                debug!(slot = id, "failure for idle slot, ignoring");
                return;
            }
            None => {
                warn!(slot = id, "failure from unknown slot");
                return;
            }
        };

        inner.working -= 1;
        inner.stats.total_failed += 1;

        if let Some(callback) = callback {
            callback(Err(TaskError::Execution(error)));
        }

        // One task's failure either stays local to its slot or, by policy,
        // takes the whole pool down
        if self.config.terminate_on_error {
            inner.shut_down().await;
        } else {
            inner.dispatch_next().await;
        }
    }
}
