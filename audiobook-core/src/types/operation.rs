//! Background operation records (data model §3, component §4.F).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::OperationId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Scan,
    Organize,
    FetchMetadata,
    Import,
    BulkFetch,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationType::Scan => "scan",
            OperationType::Organize => "organize",
            OperationType::FetchMetadata => "fetch-metadata",
            OperationType::Import => "import",
            OperationType::BulkFetch => "bulk-fetch",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
    Interrupted,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed
                | OperationStatus::Failed
                | OperationStatus::Canceled
                | OperationStatus::Interrupted
        )
    }

    /// Only `Running` may transition to a terminal state (§4.F state model).
    pub fn can_transition_to(self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Pending, Canceled) => true,
            (Running, Completed | Failed | Canceled | Interrupted) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }
}

/// Integer priority; higher dequeues first, ties FIFO by enqueue time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationPriority(pub i32);

impl OperationPriority {
    pub const LOW: OperationPriority = OperationPriority(0);
    pub const NORMAL: OperationPriority = OperationPriority(10);
    pub const HIGH: OperationPriority = OperationPriority(20);
}

impl Default for OperationPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub op_type: OperationType,
    pub status: OperationStatus,
    pub priority: OperationPriority,
    pub progress: u64,
    pub total: u64,
    pub message: String,
    pub folder_scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Operation {
    pub fn new(op_type: OperationType, priority: OperationPriority, folder_scope: Option<String>) -> Self {
        Self {
            id: OperationId::new(),
            op_type,
            status: OperationStatus::Pending,
            priority,
            progress: 0,
            total: 0,
            message: String::new(),
            folder_scope,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub operation_id: OperationId,
    pub seq: u64,
    pub level: LogLevel,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}
