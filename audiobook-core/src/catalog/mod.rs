//! Catalog Store (component §4.A): the single source of truth.
//!
//! [`Store`] is the narrow transactional interface every caller goes
//! through; [`kv::SledStore`] is the default embedded-KV implementation,
//! [`sql::SqliteStore`] is the optional relational backend selectable with
//! `--db-type`, and [`memory::InMemoryStore`] backs unit tests so they never
//! touch the filesystem (§9 "interface polymorphism for storage backends").

pub mod keys;
pub mod kv;
pub mod memory;
pub mod migrations;
#[cfg(feature = "relational-store")]
pub mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Author, AuthorId, Book, BookId, DashboardStats, DoNotImportEntry, ImportPath, ImportPathId,
    LibraryFingerprint, MetadataFieldState, Operation, OperationId, OperationLogEntry, Series,
    SeriesId, Setting,
};

/// Full replacement update; rejected when `expected_updated_at` is stale
/// relative to the stored row (optimistic concurrency, §4.A).
#[derive(Clone, Copy, Debug)]
pub struct StaleWriteGuard {
    pub expected_updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- Books ---
    async fn get_book(&self, id: &BookId) -> Result<Book>;
    async fn get_book_by_file_path(&self, path: &str) -> Result<Option<Book>>;
    async fn get_book_by_file_hash(&self, hash: &str) -> Result<Option<Book>>;
    async fn get_book_by_original_hash(&self, hash: &str) -> Result<Option<Book>>;
    async fn get_book_by_organized_hash(&self, hash: &str) -> Result<Option<Book>>;
    async fn create_book(&self, book: Book) -> Result<Book>;
    async fn update_book(&self, id: &BookId, book: Book, guard: Option<StaleWriteGuard>) -> Result<Book>;
    async fn soft_delete_book(&self, id: &BookId, at: DateTime<Utc>) -> Result<()>;
    async fn list_soft_deleted_books(&self, older_than: DateTime<Utc>) -> Result<Vec<Book>>;
    async fn get_duplicate_books(&self) -> Result<Vec<Vec<Book>>>;
    async fn search_books(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<Book>>;
    async fn list_books(&self, limit: usize, offset: usize) -> Result<Vec<Book>>;
    async fn count_books(&self) -> Result<u64>;
    async fn get_dashboard_stats(&self) -> Result<DashboardStats>;

    // --- Authors / series ---
    async fn get_author(&self, id: &AuthorId) -> Result<Option<Author>>;
    /// Case-insensitive lookup-or-create, used by the assembler/organizer
    /// pipeline to turn a resolved author name into a stable id.
    async fn find_or_create_author(&self, name: &str) -> Result<Author>;
    async fn get_series(&self, id: &SeriesId) -> Result<Option<Series>>;
    async fn find_or_create_series(&self, name: &str, author_id: Option<AuthorId>) -> Result<Series>;

    // --- Field state / provenance ---
    async fn get_metadata_field_states(&self, book_id: &BookId) -> Result<Vec<MetadataFieldState>>;
    async fn upsert_metadata_field_state(&self, state: MetadataFieldState) -> Result<()>;

    // --- Import paths ---
    async fn list_import_paths(&self) -> Result<Vec<ImportPath>>;
    async fn create_import_path(&self, path: ImportPath) -> Result<ImportPath>;
    async fn delete_import_path(&self, id: &ImportPathId) -> Result<()>;
    async fn touch_import_path_scan(&self, id: &ImportPathId, at: DateTime<Utc>) -> Result<()>;

    // --- Do-not-import ---
    async fn is_blocked_hash(&self, hash: &str) -> Result<Option<DoNotImportEntry>>;
    async fn block_hash(&self, entry: DoNotImportEntry) -> Result<()>;

    // --- Fingerprints ---
    async fn get_fingerprint(&self, path: &str) -> Result<Option<LibraryFingerprint>>;
    async fn put_fingerprint(&self, fp: LibraryFingerprint) -> Result<()>;

    // --- Settings ---
    async fn get_setting(&self, key: &str) -> Result<Option<Setting>>;
    async fn put_setting(&self, setting: Setting) -> Result<()>;

    // --- Operations ---
    async fn create_operation(&self, op: Operation) -> Result<Operation>;
    async fn get_operation(&self, id: &OperationId) -> Result<Operation>;
    async fn update_operation(&self, op: Operation) -> Result<Operation>;
    async fn list_operations_by_status(&self, status: crate::types::OperationStatus) -> Result<Vec<Operation>>;
    async fn append_operation_log(&self, entry: OperationLogEntry) -> Result<()>;
    async fn list_operation_logs(&self, id: &OperationId) -> Result<Vec<OperationLogEntry>>;
    async fn put_operation_state(&self, id: &OperationId, state: Vec<u8>) -> Result<()>;
    async fn get_operation_state(&self, id: &OperationId) -> Result<Option<Vec<u8>>>;
    async fn put_operation_params(&self, id: &OperationId, params: Vec<u8>) -> Result<()>;
    async fn get_operation_params(&self, id: &OperationId) -> Result<Option<Vec<u8>>>;

    /// Allocate the next value from a durable named counter (used for
    /// Author/Series numeric ids).
    async fn next_counter(&self, name: &str) -> Result<u64>;
}
