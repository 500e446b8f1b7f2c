use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use super::handlers::{fail_message, HandlerRegistry, OperationContext};
use crate::catalog::Store;
use crate::error::{CoreError, Result};
use crate::event_hub::{Event, EventHub};
use crate::types::{Operation, OperationId, OperationPriority, OperationStatus, OperationType};

struct PendingJob {
    operation_id: OperationId,
    op_type: OperationType,
    priority: OperationPriority,
    params: Vec<u8>,
    enqueued_seq: u64,
}

impl PartialEq for PendingJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.enqueued_seq == other.enqueued_seq
    }
}
impl Eq for PendingJob {}

impl PartialOrd for PendingJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first; ties broken FIFO by enqueue order (§4.F).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueued_seq.cmp(&self.enqueued_seq))
    }
}

/// Moves `operation` to `next`, logging rather than refusing an invalid
/// transition (§4.F state model) — a background worker has no caller to
/// report a rejection to, so this is a diagnostic, not a guard.
fn transition(operation: &mut Operation, next: OperationStatus) {
    if !operation.status.can_transition_to(next) {
        tracing::error!(
            operation_id = %operation.id,
            from = ?operation.status,
            to = ?next,
            "invalid operation status transition"
        );
    }
    operation.status = next;
}

/// Priority job scheduler (§4.F). A configurable pool of worker tasks
/// dequeues from an in-memory priority heap; every durable state change goes
/// through the Catalog Store so a crash can be recovered from on the next
/// startup (`resume_interrupted`).
pub struct OperationQueue {
    store: Arc<dyn Store>,
    hub: Arc<EventHub>,
    handlers: Arc<HandlerRegistry>,
    pending: Mutex<BinaryHeap<PendingJob>>,
    running: Mutex<HashMap<OperationId, CancellationToken>>,
    notify: Notify,
    next_seq: std::sync::atomic::AtomicU64,
    worker_count: usize,
    shutdown: CancellationToken,
}

impl OperationQueue {
    pub fn new(store: Arc<dyn Store>, hub: Arc<EventHub>, handlers: HandlerRegistry, worker_count: usize) -> Arc<Self> {
        Arc::new(Self {
            store,
            hub,
            handlers: Arc::new(handlers),
            pending: Mutex::new(BinaryHeap::new()),
            running: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            next_seq: std::sync::atomic::AtomicU64::new(0),
            worker_count: worker_count.max(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawns the worker pool. Call once at startup after `resume_interrupted`.
    pub fn spawn_workers(self: &Arc<Self>) {
        for _ in 0..self.worker_count {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.worker_loop().await });
        }
    }

    /// Scans for operations stuck in `running` from a prior process and
    /// marks them `interrupted` (§4.F "On startup, the queue scans for
    /// operations in running status and marks them interrupted").
    pub async fn resume_interrupted(&self) -> Result<()> {
        let stuck = self.store.list_operations_by_status(OperationStatus::Running).await?;
        for mut op in stuck {
            op.status = OperationStatus::Interrupted;
            op.completed_at = Some(chrono::Utc::now());
            self.store.update_operation(op).await?;
        }
        Ok(())
    }

    pub async fn enqueue(
        &self,
        op_type: OperationType,
        priority: OperationPriority,
        folder_scope: Option<String>,
        params: Vec<u8>,
    ) -> Result<Operation> {
        let operation = Operation::new(op_type, priority, folder_scope);
        let operation = self.store.create_operation(operation).await?;
        self.store.put_operation_params(&operation.id, params.clone()).await?;

        let seq = self.next_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.pending.lock().await.push(PendingJob {
            operation_id: operation.id,
            op_type,
            priority,
            params,
            enqueued_seq: seq,
        });
        self.notify.notify_one();
        Ok(operation)
    }

    /// Cooperative cancellation: fires the token; the handler must observe
    /// it at its own safe points (§4.F Cancellation, §5).
    pub async fn cancel(&self, operation_id: &OperationId) -> Result<()> {
        let running = self.running.lock().await;
        if let Some(token) = running.get(operation_id) {
            token.cancel();
            Ok(())
        } else {
            Err(CoreError::NotFound(format!("no running operation {operation_id}")))
        }
    }

    /// Stops accepting new jobs, cancels every running job, waits up to
    /// `deadline`, then returns regardless (§4.F Shutdown).
    pub async fn shutdown(&self, deadline: Duration) {
        self.shutdown.cancel();
        let running = self.running.lock().await;
        for token in running.values() {
            token.cancel();
        }
        drop(running);
        let _ = tokio::time::timeout(deadline, self.wait_for_drain()).await;
    }

    async fn wait_for_drain(&self) {
        loop {
            if self.running.lock().await.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            let job = {
                let mut pending = self.pending.lock().await;
                pending.pop()
            };
            let Some(job) = job else {
                tokio::select! {
                    _ = self.notify.notified() => continue,
                    _ = self.shutdown.cancelled() => return,
                }
            };
            self.run_job(job).await;
        }
    }

    async fn run_job(&self, job: PendingJob) {
        let Some(handler) = self.handlers.get(job.op_type) else {
            tracing::error!(op_type = %job.op_type, "no handler registered");
            return;
        };

        let mut operation = match self.store.get_operation(&job.operation_id).await {
            Ok(op) => op,
            Err(err) => {
                tracing::error!(error = %err, "operation vanished before it could run");
                return;
            }
        };
        transition(&mut operation, OperationStatus::Running);
        operation.started_at = Some(chrono::Utc::now());
        if let Err(err) = self.store.update_operation(operation.clone()).await {
            tracing::error!(error = %err, "failed to persist running state");
            return;
        }

        let token = CancellationToken::new();
        self.running.lock().await.insert(job.operation_id, token.clone());

        let mut ctx = OperationContext::new(
            job.operation_id,
            Arc::clone(&self.store),
            Arc::clone(&self.hub),
            token,
            job.params,
        );

        let outcome = handler.run(&mut ctx).await;

        self.running.lock().await.remove(&job.operation_id);

        let mut operation = match self.store.get_operation(&job.operation_id).await {
            Ok(op) => op,
            Err(err) => {
                tracing::error!(error = %err, "operation vanished after running");
                return;
            }
        };

        let next_status = match outcome {
            Ok(()) if ctx.is_canceled() => OperationStatus::Canceled,
            Ok(()) => OperationStatus::Completed,
            Err(CoreError::Canceled) => OperationStatus::Canceled,
            Err(ref err) => {
                operation.error_message = Some(fail_message(&operation, err));
                OperationStatus::Failed
            }
        };
        transition(&mut operation, next_status);
        operation.completed_at = Some(chrono::Utc::now());

        let message = operation.error_message.clone().unwrap_or_else(|| "done".to_string());
        if let Err(err) = self.store.update_operation(operation.clone()).await {
            tracing::error!(error = %err, "failed to persist terminal state");
        }
        self.hub.publish(Event::OperationCompleted {
            operation_id: job.operation_id,
            status: operation.status,
            message,
        });
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::catalog::memory::InMemoryStore;
    use crate::orchestration::OperationHandler;

    struct Noop;

    #[async_trait]
    impl OperationHandler for Noop {
        async fn run(&self, ctx: &mut OperationContext) -> Result<()> {
            ctx.report(1, 1, "done").await
        }
    }

    #[tokio::test]
    async fn enqueued_job_runs_to_completion() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let hub = Arc::new(EventHub::new());
        let mut handlers = HandlerRegistry::new();
        handlers.register(OperationType::Scan, Arc::new(Noop));

        let queue = OperationQueue::new(store.clone(), hub, handlers, 1);
        queue.resume_interrupted().await.unwrap();
        queue.spawn_workers();

        let op = queue.enqueue(OperationType::Scan, OperationPriority::NORMAL, None, vec![]).await.unwrap();

        for _ in 0..50 {
            let fetched = store.get_operation(&op.id).await.unwrap();
            if fetched.status.is_terminal() {
                assert_eq!(fetched.status, OperationStatus::Completed);
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("operation did not complete in time");
    }
}
