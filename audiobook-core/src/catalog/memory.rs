//! An in-process [`Store`] backed by locked `HashMap`s, used in unit tests
//! for modules that need a Catalog Store but shouldn't touch a filesystem
//! or database (§9 test tooling).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{StaleWriteGuard, Store};
use crate::error::{CoreError, Result};
use crate::types::{
    Author, AuthorId, Book, BookId, DashboardStats, DoNotImportEntry, ImportPath, ImportPathId,
    LibraryFingerprint, MetadataFieldState, Operation, OperationId, OperationLogEntry,
    OperationStatus, Series, SeriesId, Setting,
};

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Default)]
struct Inner {
    books: HashMap<String, Book>,
    path_index: HashMap<String, String>,
    hash_index: HashMap<String, String>,
    orig_index: HashMap<String, String>,
    org_index: HashMap<String, String>,
    field_states: HashMap<(String, String), MetadataFieldState>,
    import_paths: HashMap<u64, ImportPath>,
    dni: HashMap<String, DoNotImportEntry>,
    fingerprints: HashMap<String, LibraryFingerprint>,
    settings: HashMap<String, Setting>,
    operations: HashMap<String, Operation>,
    operation_logs: HashMap<String, Vec<OperationLogEntry>>,
    operation_state: HashMap<String, Vec<u8>>,
    operation_params: HashMap<String, Vec<u8>>,
    authors: HashMap<u64, Author>,
    author_name_index: HashMap<String, u64>,
    series: HashMap<u64, Series>,
    series_name_index: HashMap<(u64, String), u64>,
    counters: HashMap<String, u64>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: registers an author name so `search_books` can match on
    /// it without requiring a full author-management surface in this store.
    pub fn seed_author(&self, id: u64, name: impl Into<String>) {
        let name = name.into();
        let mut inner = self.inner.lock();
        inner.author_name_index.insert(normalize_name(&name), id);
        inner.authors.insert(id, Author { id: AuthorId(id), name });
    }

    pub fn seed_series(&self, id: u64, name: impl Into<String>) {
        let name = name.into();
        let mut inner = self.inner.lock();
        inner.series_name_index.insert((0, normalize_name(&name)), id);
        inner.series.insert(id, Series { id: SeriesId(id), author_id: None, name });
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_book(&self, id: &BookId) -> Result<Book> {
        self.inner
            .lock()
            .books
            .get(&id.0)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("book {id}")))
    }

    async fn get_book_by_file_path(&self, path: &str) -> Result<Option<Book>> {
        let inner = self.inner.lock();
        Ok(inner
            .path_index
            .get(path)
            .and_then(|id| inner.books.get(id))
            .cloned())
    }

    async fn get_book_by_file_hash(&self, hash: &str) -> Result<Option<Book>> {
        let inner = self.inner.lock();
        Ok(inner
            .hash_index
            .get(hash)
            .and_then(|id| inner.books.get(id))
            .cloned())
    }

    async fn get_book_by_original_hash(&self, hash: &str) -> Result<Option<Book>> {
        let inner = self.inner.lock();
        Ok(inner
            .orig_index
            .get(hash)
            .and_then(|id| inner.books.get(id))
            .cloned())
    }

    async fn get_book_by_organized_hash(&self, hash: &str) -> Result<Option<Book>> {
        let inner = self.inner.lock();
        Ok(inner
            .org_index
            .get(hash)
            .and_then(|id| inner.books.get(id))
            .cloned())
    }

    async fn create_book(&self, book: Book) -> Result<Book> {
        let mut inner = self.inner.lock();
        inner.path_index.insert(book.current_file_path.clone(), book.id.0.clone());
        if let Some(hash) = &book.file_hash {
            inner.hash_index.insert(hash.clone(), book.id.0.clone());
            // Seeded once at creation and never touched by `update_book`.
            inner.orig_index.insert(hash.clone(), book.id.0.clone());
        }
        inner.books.insert(book.id.0.clone(), book.clone());
        Ok(book)
    }

    async fn update_book(
        &self,
        id: &BookId,
        mut book: Book,
        guard: Option<StaleWriteGuard>,
    ) -> Result<Book> {
        let mut inner = self.inner.lock();
        let existing = inner
            .books
            .get(&id.0)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("book {id}")))?;

        if let Some(g) = guard {
            if g.expected_updated_at < existing.updated_at {
                return Err(CoreError::Conflict(format!(
                    "stale write: book {id} was updated more recently"
                )));
            }
        }

        book.updated_at = Utc::now();

        if existing.current_file_path != book.current_file_path {
            inner.path_index.remove(&existing.current_file_path);
            inner.path_index.insert(book.current_file_path.clone(), id.0.clone());
        }
        if existing.file_hash != book.file_hash {
            if let Some(old) = &existing.file_hash {
                inner.hash_index.remove(old);
            }
            if let Some(new) = &book.file_hash {
                inner.hash_index.insert(new.clone(), id.0.clone());
            }
        }
        if existing.organized_hash != book.organized_hash {
            if let Some(old) = &existing.organized_hash {
                inner.org_index.remove(old);
            }
            if let Some(new) = &book.organized_hash {
                inner.org_index.insert(new.clone(), id.0.clone());
            }
        }
        inner.books.insert(id.0.clone(), book.clone());
        Ok(book)
    }

    async fn soft_delete_book(&self, id: &BookId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock();
        let book = inner
            .books
            .get_mut(&id.0)
            .ok_or_else(|| CoreError::NotFound(format!("book {id}")))?;
        book.deleted_at = Some(at);
        book.updated_at = at;
        Ok(())
    }

    async fn list_soft_deleted_books(&self, older_than: DateTime<Utc>) -> Result<Vec<Book>> {
        Ok(self
            .inner
            .lock()
            .books
            .values()
            .filter(|b| b.deleted_at.map(|d| d < older_than).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn get_duplicate_books(&self) -> Result<Vec<Vec<Book>>> {
        let mut groups: HashMap<String, Vec<Book>> = HashMap::new();
        for book in self.inner.lock().books.values() {
            if book.is_deleted() {
                continue;
            }
            if let Some(hash) = &book.file_hash {
                groups.entry(hash.clone()).or_default().push(book.clone());
            }
        }
        Ok(groups.into_values().filter(|g| g.len() > 1).collect())
    }

    async fn search_books(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let inner = self.inner.lock();
        let needle = query.to_lowercase();
        let mut matches: Vec<Book> = inner
            .books
            .values()
            .filter(|b| !b.is_deleted())
            .filter(|b| {
                let mut haystacks = vec![b.title.to_lowercase()];
                if let Some(aid) = b.author_id {
                    if let Some(author) = inner.authors.get(&aid.0) {
                        haystacks.push(author.name.to_lowercase());
                    }
                }
                if let Some(sid) = b.series_id {
                    if let Some(series) = inner.series.get(&sid.0) {
                        haystacks.push(series.name.to_lowercase());
                    }
                }
                haystacks.iter().any(|h| h.contains(&needle))
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_books(&self, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let mut books: Vec<Book> = self
            .inner
            .lock()
            .books
            .values()
            .filter(|b| !b.is_deleted())
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(books.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_books(&self) -> Result<u64> {
        Ok(self.inner.lock().books.values().filter(|b| !b.is_deleted()).count() as u64)
    }

    async fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        let inner = self.inner.lock();
        Ok(DashboardStats {
            total_books: inner.books.values().filter(|b| !b.is_deleted()).count() as u64,
            soft_deleted_books: inner.books.values().filter(|b| b.is_deleted()).count() as u64,
            total_authors: inner.authors.len() as u64,
            total_series: inner.series.len() as u64,
        })
    }

    async fn get_author(&self, id: &AuthorId) -> Result<Option<Author>> {
        Ok(self.inner.lock().authors.get(&id.0).cloned())
    }

    async fn find_or_create_author(&self, name: &str) -> Result<Author> {
        let norm = normalize_name(name);
        let mut inner = self.inner.lock();
        if let Some(id) = inner.author_name_index.get(&norm) {
            return Ok(inner.authors.get(id).cloned().expect("index points at existing author"));
        }
        let next = inner.counters.entry("author".into()).or_insert(0);
        *next += 1;
        let author = Author { id: AuthorId(*next), name: name.trim().to_string() };
        inner.author_name_index.insert(norm, author.id.0);
        inner.authors.insert(author.id.0, author.clone());
        Ok(author)
    }

    async fn get_series(&self, id: &SeriesId) -> Result<Option<Series>> {
        Ok(self.inner.lock().series.get(&id.0).cloned())
    }

    async fn find_or_create_series(&self, name: &str, author_id: Option<AuthorId>) -> Result<Series> {
        let norm = normalize_name(name);
        let scope = author_id.map(|a| a.0).unwrap_or(0);
        let mut inner = self.inner.lock();
        if let Some(id) = inner.series_name_index.get(&(scope, norm.clone())) {
            return Ok(inner.series.get(id).cloned().expect("index points at existing series"));
        }
        let next = inner.counters.entry("series".into()).or_insert(0);
        *next += 1;
        let series = Series { id: SeriesId(*next), author_id, name: name.trim().to_string() };
        inner.series_name_index.insert((scope, norm), series.id.0);
        inner.series.insert(series.id.0, series.clone());
        Ok(series)
    }

    async fn get_metadata_field_states(&self, book_id: &BookId) -> Result<Vec<MetadataFieldState>> {
        Ok(self
            .inner
            .lock()
            .field_states
            .values()
            .filter(|s| s.book_id == *book_id)
            .cloned()
            .collect())
    }

    async fn upsert_metadata_field_state(&self, state: MetadataFieldState) -> Result<()> {
        self.inner
            .lock()
            .field_states
            .insert((state.book_id.0.clone(), state.field.clone()), state);
        Ok(())
    }

    async fn list_import_paths(&self) -> Result<Vec<ImportPath>> {
        Ok(self.inner.lock().import_paths.values().cloned().collect())
    }

    async fn create_import_path(&self, mut path: ImportPath) -> Result<ImportPath> {
        let mut inner = self.inner.lock();
        if path.id.0 == 0 {
            let next = inner.counters.entry("import_path".into()).or_insert(0);
            *next += 1;
            path.id = ImportPathId(*next);
        }
        inner.import_paths.insert(path.id.0, path.clone());
        Ok(path)
    }

    async fn delete_import_path(&self, id: &ImportPathId) -> Result<()> {
        self.inner.lock().import_paths.remove(&id.0);
        Ok(())
    }

    async fn touch_import_path_scan(&self, id: &ImportPathId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock();
        let path = inner
            .import_paths
            .get_mut(&id.0)
            .ok_or_else(|| CoreError::NotFound(format!("import path {id}")))?;
        path.last_scan_at = Some(at);
        Ok(())
    }

    async fn is_blocked_hash(&self, hash: &str) -> Result<Option<DoNotImportEntry>> {
        Ok(self.inner.lock().dni.get(hash).cloned())
    }

    async fn block_hash(&self, entry: DoNotImportEntry) -> Result<()> {
        self.inner.lock().dni.insert(entry.hash.clone(), entry);
        Ok(())
    }

    async fn get_fingerprint(&self, path: &str) -> Result<Option<LibraryFingerprint>> {
        Ok(self.inner.lock().fingerprints.get(path).cloned())
    }

    async fn put_fingerprint(&self, fp: LibraryFingerprint) -> Result<()> {
        self.inner.lock().fingerprints.insert(fp.path.clone(), fp);
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        Ok(self.inner.lock().settings.get(key).cloned())
    }

    async fn put_setting(&self, setting: Setting) -> Result<()> {
        self.inner.lock().settings.insert(setting.key.clone(), setting);
        Ok(())
    }

    async fn create_operation(&self, op: Operation) -> Result<Operation> {
        self.inner.lock().operations.insert(op.id.to_string(), op.clone());
        Ok(op)
    }

    async fn get_operation(&self, id: &OperationId) -> Result<Operation> {
        self.inner
            .lock()
            .operations
            .get(&id.to_string())
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("operation {id}")))
    }

    async fn update_operation(&self, op: Operation) -> Result<Operation> {
        self.inner.lock().operations.insert(op.id.to_string(), op.clone());
        Ok(op)
    }

    async fn list_operations_by_status(&self, status: OperationStatus) -> Result<Vec<Operation>> {
        Ok(self
            .inner
            .lock()
            .operations
            .values()
            .filter(|op| op.status == status)
            .cloned()
            .collect())
    }

    async fn append_operation_log(&self, entry: OperationLogEntry) -> Result<()> {
        self.inner
            .lock()
            .operation_logs
            .entry(entry.operation_id.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn list_operation_logs(&self, id: &OperationId) -> Result<Vec<OperationLogEntry>> {
        Ok(self
            .inner
            .lock()
            .operation_logs
            .get(&id.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn put_operation_state(&self, id: &OperationId, state: Vec<u8>) -> Result<()> {
        self.inner.lock().operation_state.insert(id.to_string(), state);
        Ok(())
    }

    async fn get_operation_state(&self, id: &OperationId) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().operation_state.get(&id.to_string()).cloned())
    }

    async fn put_operation_params(&self, id: &OperationId, params: Vec<u8>) -> Result<()> {
        self.inner.lock().operation_params.insert(id.to_string(), params);
        Ok(())
    }

    async fn get_operation_params(&self, id: &OperationId) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().operation_params.get(&id.to_string()).cloned())
    }

    async fn next_counter(&self, name: &str) -> Result<u64> {
        let mut inner = self.inner.lock();
        let value = inner.counters.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_write_guard_rejects_outdated_update() {
        let store = InMemoryStore::new();
        let book = store.create_book(Book::new("/a.mp3")).await.unwrap();
        let stale_guard = StaleWriteGuard { expected_updated_at: book.created_at };

        let mut newer = book.clone();
        newer.title = "First".into();
        store.update_book(&book.id, newer, None).await.unwrap();

        let mut attempt = book.clone();
        attempt.title = "Second".into();
        let result = store.update_book(&book.id, attempt, Some(stale_guard)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn original_hash_resolves_and_survives_rescan() {
        let store = InMemoryStore::new();
        let mut book = Book::new("/a.mp3");
        book.file_hash = Some("hash-v1".into());
        let book = store.create_book(book).await.unwrap();

        let found = store.get_book_by_original_hash("hash-v1").await.unwrap();
        assert_eq!(found.unwrap().id, book.id);

        let mut rescanned = book.clone();
        rescanned.file_hash = Some("hash-v2".into());
        store.update_book(&book.id, rescanned, None).await.unwrap();

        assert!(store.get_book_by_original_hash("hash-v1").await.unwrap().is_some());
        assert!(store.get_book_by_original_hash("hash-v2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_matches_author_name() {
        let store = InMemoryStore::new();
        store.seed_author(1, "Ursula K. Le Guin");
        let mut book = Book::new("/b.mp3");
        book.title = "The Dispossessed".into();
        book.author_id = Some(crate::types::AuthorId(1));
        store.create_book(book).await.unwrap();

        let results = store.search_books("le guin", 10, 0).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
