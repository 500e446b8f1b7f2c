//! Default Catalog Store backend: an embedded ordered KV engine (`sled`).
//!
//! Grounded on `examples/bonujel-PNA-Rust-Project`'s `sled`-backed store —
//! the one example repo in the pack that builds a KV engine directly.
//! Writes that touch more than one key (e.g. `CreateBook` plus its
//! secondary indexes) are committed through a single [`sled::Batch`] so
//! readers only ever observe the pre- or post-batch state, never a partial
//! write (§4.A concurrency note).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::keys;
use super::migrations::run_migrations;
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

pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path).map_err(CoreError::from)?;
        run_migrations(&db)?;
        Ok(Self { db })
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.db.get(key).map_err(CoreError::from)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::Storage(format!("decode {key}: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    fn put_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| CoreError::Storage(format!("encode {key}: {e}")))?;
        self.db.insert(key, bytes).map_err(CoreError::from)?;
        Ok(())
    }

    fn all_books(&self) -> Result<Vec<Book>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix("book:") {
            let (_, bytes) = item.map_err(CoreError::from)?;
            let book: Book = serde_json::from_slice(&bytes)
                .map_err(|e| CoreError::Storage(format!("decode book: {e}")))?;
            out.push(book);
        }
        Ok(out)
    }

    fn author_name(&self, id: u64) -> Result<Option<String>> {
        Ok(self.get_json::<Author>(&keys::author(id))?.map(|a| a.name))
    }

    fn series_name(&self, id: u64) -> Result<Option<String>> {
        Ok(self.get_json::<Series>(&keys::series(id))?.map(|s| s.name))
    }
}

#[async_trait]
impl Store for SledStore {
    async fn get_book(&self, id: &BookId) -> Result<Book> {
        self.get_json(&keys::book(&id.0))?
            .ok_or_else(|| CoreError::NotFound(format!("book {id}")))
    }

    async fn get_book_by_file_path(&self, path: &str) -> Result<Option<Book>> {
        let Some(id): Option<String> = self.get_json(&keys::idx_path(path))? else {
            return Ok(None);
        };
        self.get_json(&keys::book(&id))
    }

    async fn get_book_by_file_hash(&self, hash: &str) -> Result<Option<Book>> {
        let Some(id): Option<String> = self.get_json(&keys::idx_hash(hash))? else {
            return Ok(None);
        };
        self.get_json(&keys::book(&id))
    }

    async fn get_book_by_original_hash(&self, hash: &str) -> Result<Option<Book>> {
        let Some(id): Option<String> = self.get_json(&keys::idx_orig(hash))? else {
            return Ok(None);
        };
        self.get_json(&keys::book(&id))
    }

    async fn get_book_by_organized_hash(&self, hash: &str) -> Result<Option<Book>> {
        let Some(id): Option<String> = self.get_json(&keys::idx_org(hash))? else {
            return Ok(None);
        };
        self.get_json(&keys::book(&id))
    }

    async fn create_book(&self, book: Book) -> Result<Book> {
        let mut batch = sled::Batch::default();
        let book_bytes = serde_json::to_vec(&book)
            .map_err(|e| CoreError::Storage(format!("encode book: {e}")))?;
        batch.insert(keys::book(&book.id.0).as_str(), book_bytes);
        batch.insert(
            keys::idx_path(&book.current_file_path).as_str(),
            serde_json::to_vec(&book.id.0).unwrap(),
        );
        if let Some(hash) = &book.file_hash {
            batch.insert(keys::idx_hash(hash).as_str(), serde_json::to_vec(&book.id.0).unwrap());
            // `idx:orig` is seeded from the hash the file had at import and is
            // never touched again in `update_book` (§4.A key layout).
            batch.insert(keys::idx_orig(hash).as_str(), serde_json::to_vec(&book.id.0).unwrap());
        }
        self.db.apply_batch(batch).map_err(CoreError::from)?;
        self.db.flush().map_err(CoreError::from)?;
        Ok(book)
    }

    async fn update_book(
        &self,
        id: &BookId,
        mut book: Book,
        guard: Option<StaleWriteGuard>,
    ) -> Result<Book> {
        let existing: Book = self
            .get_json(&keys::book(&id.0))?
            .ok_or_else(|| CoreError::NotFound(format!("book {id}")))?;

        if let Some(g) = guard {
            if g.expected_updated_at < existing.updated_at {
                return Err(CoreError::Conflict(format!(
                    "stale write: book {id} was updated more recently"
                )));
            }
        }

        book.updated_at = Utc::now();

        let mut batch = sled::Batch::default();
        if existing.current_file_path != book.current_file_path {
            batch.remove(keys::idx_path(&existing.current_file_path).as_str());
            batch.insert(
                keys::idx_path(&book.current_file_path).as_str(),
                serde_json::to_vec(&book.id.0).unwrap(),
            );
        }
        if existing.file_hash != book.file_hash {
            if let Some(old) = &existing.file_hash {
                batch.remove(keys::idx_hash(old).as_str());
            }
            if let Some(new) = &book.file_hash {
                batch.insert(keys::idx_hash(new).as_str(), serde_json::to_vec(&book.id.0).unwrap());
            }
        }
        if existing.organized_hash != book.organized_hash {
            if let Some(old) = &existing.organized_hash {
                batch.remove(keys::idx_org(old).as_str());
            }
            if let Some(new) = &book.organized_hash {
                batch.insert(keys::idx_org(new).as_str(), serde_json::to_vec(&book.id.0).unwrap());
            }
        }
        batch.insert(
            keys::book(&id.0).as_str(),
            serde_json::to_vec(&book).map_err(|e| CoreError::Storage(e.to_string()))?,
        );
        self.db.apply_batch(batch).map_err(CoreError::from)?;
        self.db.flush().map_err(CoreError::from)?;
        Ok(book)
    }

    async fn soft_delete_book(&self, id: &BookId, at: DateTime<Utc>) -> Result<()> {
        let mut book: Book = self
            .get_json(&keys::book(&id.0))?
            .ok_or_else(|| CoreError::NotFound(format!("book {id}")))?;
        book.deleted_at = Some(at);
        book.updated_at = at;
        self.put_json(&keys::book(&id.0), &book)?;
        self.db.flush().map_err(CoreError::from)?;
        Ok(())
    }

    async fn list_soft_deleted_books(&self, older_than: DateTime<Utc>) -> Result<Vec<Book>> {
        Ok(self
            .all_books()?
            .into_iter()
            .filter(|b| b.deleted_at.map(|d| d < older_than).unwrap_or(false))
            .collect())
    }

    async fn get_duplicate_books(&self) -> Result<Vec<Vec<Book>>> {
        use std::collections::HashMap;
        let mut groups: HashMap<String, Vec<Book>> = HashMap::new();
        for book in self.all_books()? {
            if book.is_deleted() {
                continue;
            }
            if let Some(hash) = &book.file_hash {
                groups.entry(hash.clone()).or_default().push(book);
            }
        }
        Ok(groups.into_values().filter(|g| g.len() > 1).collect())
    }

    async fn search_books(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let needle = query.to_lowercase();
        let mut matches = Vec::new();
        for book in self.all_books()? {
            if book.is_deleted() {
                continue;
            }
            let mut haystacks = vec![book.title.to_lowercase()];
            if let Some(aid) = book.author_id {
                if let Some(name) = self.author_name(aid.0)? {
                    haystacks.push(name.to_lowercase());
                }
            }
            if let Some(sid) = book.series_id {
                if let Some(name) = self.series_name(sid.0)? {
                    haystacks.push(name.to_lowercase());
                }
            }
            if haystacks.iter().any(|h| h.contains(&needle)) {
                matches.push(book);
            }
        }
        matches.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_books(&self, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let mut books: Vec<Book> = self.all_books()?.into_iter().filter(|b| !b.is_deleted()).collect();
        books.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(books.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_books(&self) -> Result<u64> {
        Ok(self.all_books()?.iter().filter(|b| !b.is_deleted()).count() as u64)
    }

    async fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        let all = self.all_books()?;
        let total_books = all.iter().filter(|b| !b.is_deleted()).count() as u64;
        let soft_deleted_books = all.iter().filter(|b| b.is_deleted()).count() as u64;
        let total_authors = self.db.scan_prefix("author:").count() as u64;
        let total_series = self.db.scan_prefix("series:").count() as u64;
        Ok(DashboardStats { total_books, soft_deleted_books, total_authors, total_series })
    }

    async fn get_author(&self, id: &AuthorId) -> Result<Option<Author>> {
        self.get_json(&keys::author(id.0))
    }

    async fn find_or_create_author(&self, name: &str) -> Result<Author> {
        let norm = normalize_name(name);
        if let Some(id) = self.get_json::<u64>(&keys::idx_author_name(&norm))? {
            if let Some(author) = self.get_json::<Author>(&keys::author(id))? {
                return Ok(author);
            }
        }
        let id = self.next_counter("author").await?;
        let author = Author { id: AuthorId(id), name: name.trim().to_string() };
        self.put_json(&keys::author(id), &author)?;
        self.put_json(&keys::idx_author_name(&norm), &id)?;
        Ok(author)
    }

    async fn get_series(&self, id: &SeriesId) -> Result<Option<Series>> {
        self.get_json(&keys::series(id.0))
    }

    async fn find_or_create_series(&self, name: &str, author_id: Option<AuthorId>) -> Result<Series> {
        let norm = normalize_name(name);
        let scope = author_id.map(|a| a.0).unwrap_or(0);
        if let Some(id) = self.get_json::<u64>(&keys::idx_series_name(scope, &norm))? {
            if let Some(series) = self.get_json::<Series>(&keys::series(id))? {
                return Ok(series);
            }
        }
        let id = self.next_counter("series").await?;
        let series = Series { id: SeriesId(id), author_id, name: name.trim().to_string() };
        self.put_json(&keys::series(id), &series)?;
        self.put_json(&keys::idx_series_name(scope, &norm), &id)?;
        Ok(series)
    }

    async fn get_metadata_field_states(&self, book_id: &BookId) -> Result<Vec<MetadataFieldState>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(keys::field_state_prefix(&book_id.0)) {
            let (_, bytes) = item.map_err(CoreError::from)?;
            out.push(
                serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::Storage(format!("decode field state: {e}")))?,
            );
        }
        Ok(out)
    }

    async fn upsert_metadata_field_state(&self, state: MetadataFieldState) -> Result<()> {
        self.put_json(&keys::field_state(&state.book_id.0, &state.field), &state)?;
        Ok(())
    }

    async fn list_import_paths(&self) -> Result<Vec<ImportPath>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(keys::import_path_prefix()) {
            let (_, bytes) = item.map_err(CoreError::from)?;
            out.push(
                serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::Storage(format!("decode import path: {e}")))?,
            );
        }
        Ok(out)
    }

    async fn create_import_path(&self, mut path: ImportPath) -> Result<ImportPath> {
        if path.id.0 == 0 {
            path.id = crate::types::ImportPathId(self.next_counter("import_path").await?);
        }
        self.put_json(&keys::import_path(path.id.0), &path)?;
        Ok(path)
    }

    async fn delete_import_path(&self, id: &ImportPathId) -> Result<()> {
        self.db.remove(keys::import_path(id.0)).map_err(CoreError::from)?;
        Ok(())
    }

    async fn touch_import_path_scan(&self, id: &ImportPathId, at: DateTime<Utc>) -> Result<()> {
        let mut path: ImportPath = self
            .get_json(&keys::import_path(id.0))?
            .ok_or_else(|| CoreError::NotFound(format!("import path {id}")))?;
        path.last_scan_at = Some(at);
        self.put_json(&keys::import_path(id.0), &path)?;
        Ok(())
    }

    async fn is_blocked_hash(&self, hash: &str) -> Result<Option<DoNotImportEntry>> {
        self.get_json(&keys::dni(hash))
    }

    async fn block_hash(&self, entry: DoNotImportEntry) -> Result<()> {
        self.put_json(&keys::dni(&entry.hash), &entry)
    }

    async fn get_fingerprint(&self, path: &str) -> Result<Option<LibraryFingerprint>> {
        self.get_json(&keys::fingerprint(path))
    }

    async fn put_fingerprint(&self, fp: LibraryFingerprint) -> Result<()> {
        self.put_json(&keys::fingerprint(&fp.path), &fp)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        self.get_json(&keys::setting(key))
    }

    async fn put_setting(&self, setting: Setting) -> Result<()> {
        self.put_json(&keys::setting(&setting.key), &setting)
    }

    async fn create_operation(&self, op: Operation) -> Result<Operation> {
        self.put_json(&keys::op(&op.id.to_string()), &op)?;
        Ok(op)
    }

    async fn get_operation(&self, id: &OperationId) -> Result<Operation> {
        self.get_json(&keys::op(&id.to_string()))?
            .ok_or_else(|| CoreError::NotFound(format!("operation {id}")))
    }

    async fn update_operation(&self, op: Operation) -> Result<Operation> {
        self.put_json(&keys::op(&op.id.to_string()), &op)?;
        Ok(op)
    }

    async fn list_operations_by_status(&self, status: OperationStatus) -> Result<Vec<Operation>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(keys::op_prefix()) {
            let (_, bytes) = item.map_err(CoreError::from)?;
            let op: Operation = serde_json::from_slice(&bytes)
                .map_err(|e| CoreError::Storage(format!("decode operation: {e}")))?;
            if op.status == status {
                out.push(op);
            }
        }
        Ok(out)
    }

    async fn append_operation_log(&self, entry: OperationLogEntry) -> Result<()> {
        self.put_json(&keys::oplog(&entry.operation_id.to_string(), entry.seq), &entry)
    }

    async fn list_operation_logs(&self, id: &OperationId) -> Result<Vec<OperationLogEntry>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(keys::oplog_prefix(&id.to_string())) {
            let (_, bytes) = item.map_err(CoreError::from)?;
            out.push(
                serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::Storage(format!("decode log entry: {e}")))?,
            );
        }
        Ok(out)
    }

    async fn put_operation_state(&self, id: &OperationId, state: Vec<u8>) -> Result<()> {
        self.db.insert(keys::opstate(&id.to_string()), state).map_err(CoreError::from)?;
        Ok(())
    }

    async fn get_operation_state(&self, id: &OperationId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .db
            .get(keys::opstate(&id.to_string()))
            .map_err(CoreError::from)?
            .map(|b| b.to_vec()))
    }

    async fn put_operation_params(&self, id: &OperationId, params: Vec<u8>) -> Result<()> {
        self.db.insert(keys::opparams(&id.to_string()), params).map_err(CoreError::from)?;
        Ok(())
    }

    async fn get_operation_params(&self, id: &OperationId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .db
            .get(keys::opparams(&id.to_string()))
            .map_err(CoreError::from)?
            .map(|b| b.to_vec()))
    }

    async fn next_counter(&self, name: &str) -> Result<u64> {
        let value = self
            .db
            .update_and_fetch(keys::counter(name), |old| {
                let current = old
                    .and_then(|bytes| bytes.try_into().ok())
                    .map(u64::from_be_bytes)
                    .unwrap_or(0);
                Some((current + 1).to_be_bytes().to_vec())
            })
            .map_err(CoreError::from)?
            .expect("update_and_fetch always returns Some after our closure");
        let bytes: [u8; 8] = value.as_ref().try_into().map_err(|_| {
            CoreError::Storage("corrupt counter value".into())
        })?;
        Ok(u64::from_be_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> SledStore {
        let dir = tempfile::tempdir().unwrap();
        SledStore::open(dir.keep()).unwrap()
    }

    #[tokio::test]
    async fn create_and_get_book_round_trips() {
        let store = temp_store();
        let book = Book::new("/library/a/b.mp3");
        let created = store.create_book(book.clone()).await.unwrap();
        let fetched = store.get_book(&created.id).await.unwrap();
        assert_eq!(fetched.current_file_path, "/library/a/b.mp3");
        let by_path = store.get_book_by_file_path("/library/a/b.mp3").await.unwrap();
        assert!(by_path.is_some());
    }

    #[tokio::test]
    async fn soft_deleted_books_excluded_from_list() {
        let store = temp_store();
        let book = store.create_book(Book::new("/library/x.mp3")).await.unwrap();
        store.soft_delete_book(&book.id, Utc::now()).await.unwrap();
        let books = store.list_books(100, 0).await.unwrap();
        assert!(books.is_empty());
    }

    #[tokio::test]
    async fn original_hash_index_resolves_book() {
        let store = temp_store();
        let mut book = Book::new("/library/a/c.mp3");
        book.file_hash = Some("hash-v1".into());
        let created = store.create_book(book).await.unwrap();

        let found = store.get_book_by_original_hash("hash-v1").await.unwrap();
        assert_eq!(found.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn counter_increments_monotonically() {
        let store = temp_store();
        let a = store.next_counter("author").await.unwrap();
        let b = store.next_counter("author").await.unwrap();
        assert_eq!(b, a + 1);
    }
}
