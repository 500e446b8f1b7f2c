//! Operation handler registry (§9 "Operation handler registry" — the queue
//! stays blind to operation semantics; handlers register themselves at
//! startup rather than being switched on by a union type).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::catalog::Store;
use crate::error::Result;
use crate::event_hub::{Event, EventHub};
use crate::types::{LogLevel, Operation, OperationId, OperationLogEntry, OperationType};

/// Threaded through to every handler invocation: the store, this
/// operation's persisted params, a cancellation token checked at safe
/// points, and progress/log reporting that the queue persists and fans out.
pub struct OperationContext {
    pub operation_id: OperationId,
    pub store: Arc<dyn Store>,
    pub hub: Arc<EventHub>,
    pub cancellation: CancellationToken,
    pub params: Vec<u8>,
    seq: u64,
}

impl OperationContext {
    pub fn new(
        operation_id: OperationId,
        store: Arc<dyn Store>,
        hub: Arc<EventHub>,
        cancellation: CancellationToken,
        params: Vec<u8>,
    ) -> Self {
        Self { operation_id, store, hub, cancellation, params, seq: 0 }
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Publishes `(done, total, message)`; the queue persists the Operation
    /// row on the caller's behalf after each handler tick (§4.F Progress).
    pub async fn report(&self, done: u64, total: u64, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.hub.publish(Event::OperationProgress {
            operation_id: self.operation_id,
            done,
            total,
            message: message.clone(),
        });
        self.log(LogLevel::Info, message).await
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>) -> Result<()> {
        self.seq_log(level, message, None).await
    }

    pub async fn log_detail(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        detail: serde_json::Value,
    ) -> Result<()> {
        self.seq_log(level, message, Some(detail)).await
    }

    async fn seq_log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) -> Result<()> {
        let entry = OperationLogEntry {
            operation_id: self.operation_id,
            seq: self.seq,
            level,
            message: message.into(),
            detail,
            at: chrono::Utc::now(),
        };
        self.store.append_operation_log(entry).await
    }

    pub async fn checkpoint(&self, state: Vec<u8>) -> Result<()> {
        self.store.put_operation_state(&self.operation_id, state).await
    }
}

#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn run(&self, ctx: &mut OperationContext) -> Result<()>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<OperationType, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, op_type: OperationType, handler: Arc<dyn OperationHandler>) {
        self.handlers.insert(op_type, handler);
    }

    pub fn get(&self, op_type: OperationType) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(&op_type).cloned()
    }
}

/// Marks `operation` as failed with a single-sentence message, matching
/// §7's "user-visible failure" rule: detailed diagnostics stay in
/// OperationLog, the terminal event carries only a summary.
pub fn fail_message(operation: &Operation, err: &crate::error::CoreError) -> String {
    format!("{} failed: {err}", operation.op_type)
}
