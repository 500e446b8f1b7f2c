//! Scanner (component §4.I): walks an import path, groups files into books,
//! skips unchanged content via a cheap fingerprint, and checkpoints its
//! remaining work so a crash mid-scan resumes instead of restarting.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::assembler::{self, AssembledBook};
use crate::catalog::Store;
use crate::error::{CoreError, Result};
use crate::event_hub::{Event, EventHub};
use crate::orchestration::{OperationContext, OperationHandler};
use crate::providers::Chain;
use crate::types::{Author, Book, LibraryFingerprint, LogLevel, MetadataFieldState};

const AUDIOBOOK_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "m4b", "ogg", "oga"];
const FINGERPRINT_PREFIX_BYTES: usize = 64 * 1024;

fn is_audiobook_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|ext| AUDIOBOOK_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
struct ScanCheckpoint {
    remaining_dirs: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct ScanSummary {
    pub new_books: u64,
    pub updated_books: u64,
    pub unchanged: u64,
    pub blocked: u64,
    pub errors: u64,
}

impl ScanSummary {
    fn processed(&self) -> u64 {
        self.new_books + self.updated_books + self.unchanged + self.blocked + self.errors
    }
}

enum Ingested {
    New,
    Updated,
    Unchanged,
    Blocked,
}

pub struct Scanner {
    store: Arc<dyn Store>,
    hub: Arc<EventHub>,
    chain: Option<Arc<Chain>>,
    import_path_id: u64,
}

impl Scanner {
    pub fn new(store: Arc<dyn Store>, hub: Arc<EventHub>, chain: Option<Arc<Chain>>, import_path_id: u64) -> Self {
        Self { store, hub, chain, import_path_id }
    }

    /// Walks `root` breadth-first. When `ctx` is provided, checkpoints the
    /// remaining directory queue after every directory and resumes from a
    /// prior checkpoint if one is present (§4.I Checkpointing).
    pub async fn scan(&self, root: &Path, ctx: Option<&OperationContext>) -> Result<ScanSummary> {
        let mut dirs: VecDeque<PathBuf> = match ctx {
            Some(ctx) => match self.store.get_operation_state(&ctx.operation_id).await? {
                Some(bytes) => {
                    let checkpoint: ScanCheckpoint = serde_json::from_slice(&bytes)
                        .map_err(|e| CoreError::Storage(format!("corrupt scan checkpoint: {e}")))?;
                    checkpoint.remaining_dirs.into_iter().collect()
                }
                None => VecDeque::from([root.to_path_buf()]),
            },
            None => VecDeque::from([root.to_path_buf()]),
        };

        let mut summary = ScanSummary::default();

        while let Some(dir) = dirs.front().cloned() {
            if let Some(ctx) = ctx {
                if ctx.is_canceled() {
                    // Leave `dir` in the checkpoint: it was never actually
                    // scanned, so a resumed run must still visit it.
                    self.checkpoint(ctx, &dirs).await?;
                    return Err(CoreError::Canceled);
                }
            }
            dirs.pop_front();

            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => {
                    summary.errors += 1;
                    if let Some(ctx) = ctx {
                        ctx.log(LogLevel::Warn, format!("cannot read {}: {err}", dir.display())).await?;
                    }
                    continue;
                }
            };

            let mut files = Vec::new();
            for entry in entries {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    dirs.push_back(path);
                } else if is_audiobook_file(&path) {
                    files.push(path);
                }
            }
            files.sort();

            for file in &files {
                match self.ingest_file(file).await {
                    Ok(Ingested::New) => summary.new_books += 1,
                    Ok(Ingested::Updated) => summary.updated_books += 1,
                    Ok(Ingested::Unchanged) => summary.unchanged += 1,
                    Ok(Ingested::Blocked) => summary.blocked += 1,
                    Err(err) => {
                        summary.errors += 1;
                        if let Some(ctx) = ctx {
                            ctx.log(LogLevel::Warn, format!("failed to ingest {}: {err}", file.display())).await?;
                        }
                    }
                }
            }

            if let Some(ctx) = ctx {
                self.checkpoint(ctx, &dirs).await?;
                ctx.report(summary.processed(), 0, format!("scanned {}", dir.display())).await?;
            }
        }

        if let Some(ctx) = ctx {
            self.store.put_operation_state(&ctx.operation_id, Vec::new()).await?;
        }

        Ok(summary)
    }

    async fn checkpoint(&self, ctx: &OperationContext, remaining: &VecDeque<PathBuf>) -> Result<()> {
        let checkpoint = ScanCheckpoint { remaining_dirs: remaining.iter().cloned().collect() };
        let bytes = serde_json::to_vec(&checkpoint)
            .map_err(|e| CoreError::Storage(format!("encode scan checkpoint: {e}")))?;
        ctx.checkpoint(bytes).await
    }

    async fn ingest_file(&self, path: &Path) -> Result<Ingested> {
        let path_str = path.to_string_lossy().into_owned();
        let meta = std::fs::metadata(path)?;
        let size = meta.len();
        let mtime_unix = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let crc32 = crc32_of_prefix(path)?;

        if let Some(existing_fp) = self.store.get_fingerprint(&path_str).await? {
            if existing_fp.size == size && existing_fp.mtime_unix == mtime_unix && existing_fp.crc32 == crc32 {
                return Ok(Ingested::Unchanged);
            }
        }

        let full_hash = crate::organizer::hash_file(&path_str)?;
        if self.store.is_blocked_hash(&full_hash).await?.is_some() {
            return Ok(Ingested::Blocked);
        }

        let existing_book = self.store.get_book_by_file_path(&path_str).await?;
        let locks = match &existing_book {
            Some(book) => self.store.get_metadata_field_states(&book.id).await?,
            None => Vec::new(),
        };
        let locked_fields = crate::assembler::LockedFields::new(&locks);

        let tag = crate::tags::extract_tags(path)?;
        let candidates = match &self.chain {
            Some(chain) => {
                let title = tag.title.clone().unwrap_or_default();
                chain.search_by_title(&title, tag.artist.as_deref(), tag.isbn.as_deref()).await.candidates
            }
            None => Vec::new(),
        };

        let assembled = assembler::assemble(&tag, &path_str, &candidates, &locked_fields);

        let author = self.resolve_author(&assembled).await?;
        let series = self.resolve_series(&assembled, author.as_ref()).await?;

        let mut book = existing_book.clone().unwrap_or_else(|| Book::new(path_str.clone()));
        apply_assembled(&mut book, &assembled, author.as_ref(), series.as_ref());
        book.file_hash = Some(full_hash.clone());
        book.current_file_path = path_str.clone();

        let is_new = existing_book.is_none();
        let saved = if is_new {
            self.store.create_book(book).await?
        } else {
            let guard = crate::catalog::StaleWriteGuard {
                expected_updated_at: existing_book.as_ref().unwrap().updated_at,
            };
            self.store.update_book(&book.id.clone(), book, Some(guard)).await?
        };

        self.persist_field_states(&saved, &assembled).await?;
        self.store
            .put_fingerprint(LibraryFingerprint { path: path_str.clone(), size, mtime_unix, crc32 })
            .await?;

        self.hub.publish(Event::ImportDiscovered { import_path_id: self.import_path_id, file_path: path_str });
        self.hub.publish(Event::LibraryChanged { book_id: saved.id.to_string() });

        Ok(if is_new { Ingested::New } else { Ingested::Updated })
    }

    async fn resolve_author(&self, assembled: &AssembledBook) -> Result<Option<Author>> {
        match assembled.authors.value.as_ref().and_then(|a| a.first()) {
            Some(name) if !name.trim().is_empty() => Ok(Some(self.store.find_or_create_author(name).await?)),
            _ => Ok(None),
        }
    }

    async fn resolve_series(
        &self,
        assembled: &AssembledBook,
        author: Option<&Author>,
    ) -> Result<Option<crate::types::Series>> {
        match &assembled.series.value {
            Some(name) if !name.trim().is_empty() => {
                Ok(Some(self.store.find_or_create_series(name, author.map(|a| a.id)).await?))
            }
            _ => Ok(None),
        }
    }

    async fn persist_field_states(&self, book: &Book, assembled: &AssembledBook) -> Result<()> {
        self.upsert_field_state(&book.id, "title", assembled.title.value.clone(), assembled.title.source.clone())
            .await?;
        self.upsert_field_state(
            &book.id,
            "authors",
            assembled.authors.value.clone().map(|a| a.join(", ")),
            assembled.authors.source.clone(),
        )
        .await?;
        self.upsert_field_state(&book.id, "series", assembled.series.value.clone(), assembled.series.source.clone())
            .await?;
        self.upsert_field_state(
            &book.id,
            "series_position",
            assembled.series_position.value.map(|v| v.to_string()),
            assembled.series_position.source.clone(),
        )
        .await?;
        self.upsert_field_state(
            &book.id,
            "narrator",
            assembled.narrator.value.clone(),
            assembled.narrator.source.clone(),
        )
        .await?;
        self.upsert_field_state(
            &book.id,
            "year",
            assembled.year.value.map(|v| v.to_string()),
            assembled.year.source.clone(),
        )
        .await
    }

    async fn upsert_field_state(
        &self,
        book_id: &crate::types::BookId,
        field: &str,
        value: Option<String>,
        source: Option<String>,
    ) -> Result<()> {
        let (Some(value), Some(source)) = (value, source) else {
            return Ok(());
        };
        self.store
            .upsert_metadata_field_state(MetadataFieldState {
                book_id: book_id.clone(),
                field: field.to_string(),
                source,
                fetched_value: Some(value),
                override_value: None,
                locked: false,
                updated_at: chrono::Utc::now(),
            })
            .await
    }
}

fn apply_assembled(
    book: &mut Book,
    assembled: &AssembledBook,
    author: Option<&Author>,
    series: Option<&crate::types::Series>,
) {
    if let Some(title) = &assembled.title.value {
        book.title = title.clone();
    }
    book.author_id = author.map(|a| a.id).or(book.author_id);
    book.series_id = series.map(|s| s.id).or(book.series_id);
    if let Some(pos) = assembled.series_position.value {
        book.series_position = Some(pos);
    }
    if let Some(narrator) = &assembled.narrator.value {
        book.narrator = Some(narrator.clone());
    }
    if let Some(year) = assembled.year.value {
        book.year = Some(year);
    }
    if let Some(isbn) = &assembled.isbn.value {
        if isbn.len() > 10 {
            book.isbn13 = Some(isbn.clone());
        } else {
            book.isbn10 = Some(isbn.clone());
        }
    }
    if let Some(language) = &assembled.language.value {
        book.language = Some(language.clone());
    }
    if let Some(publisher) = &assembled.publisher.value {
        book.publisher = Some(publisher.clone());
    }
}

fn crc32_of_prefix(path: &Path) -> Result<u32> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; FINGERPRINT_PREFIX_BYTES];
    let mut total = 0;
    loop {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    Ok(crc32fast::hash(&buf))
}

/// Parameters an enqueued scan operation is stored with; `params` on
/// `OperationContext` deserializes into this.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ScanParams {
    pub import_path_id: u64,
    pub root: PathBuf,
}

/// Adapts [`Scanner`] to the operation queue's handler registry (§9), so a
/// scan can be enqueued, progress-reported, cancelled, and resumed the same
/// way every other long-running operation is.
pub struct ScanHandler {
    store: Arc<dyn Store>,
    hub: Arc<EventHub>,
    chain: Option<Arc<Chain>>,
}

impl ScanHandler {
    pub fn new(store: Arc<dyn Store>, hub: Arc<EventHub>, chain: Option<Arc<Chain>>) -> Self {
        Self { store, hub, chain }
    }
}

#[async_trait::async_trait]
impl OperationHandler for ScanHandler {
    async fn run(&self, ctx: &mut OperationContext) -> Result<()> {
        let params: ScanParams = serde_json::from_slice(&ctx.params)
            .map_err(|e| CoreError::Validation(format!("bad scan params: {e}")))?;
        let scanner =
            Scanner::new(Arc::clone(&self.store), Arc::clone(&self.hub), self.chain.clone(), params.import_path_id);
        let summary = scanner.scan(&params.root, Some(&*ctx)).await?;
        ctx.report(
            summary.processed(),
            summary.processed(),
            format!(
                "scan complete: {} new, {} updated, {} unchanged, {} blocked, {} errors",
                summary.new_books, summary.updated_books, summary.unchanged, summary.blocked, summary.errors
            ),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryStore;

    fn write_mp3(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"not really audio but has an mp3 extension").unwrap();
        path
    }

    #[tokio::test]
    async fn scan_discovers_new_file_and_skips_on_rescan() {
        let root = tempfile::tempdir().unwrap();
        let author_dir = root.path().join("Some Author").join("Some Title");
        std::fs::create_dir_all(&author_dir).unwrap();
        write_mp3(&author_dir, "01 Part 1 of 1.mp3");

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let hub = Arc::new(EventHub::new());
        let scanner = Scanner::new(Arc::clone(&store), hub, None, 1);

        let first = scanner.scan(root.path(), None).await.unwrap();
        assert_eq!(first.new_books, 1);
        assert_eq!(store.count_books().await.unwrap(), 1);

        let second = scanner.scan(root.path(), None).await.unwrap();
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.new_books, 0);
    }

    #[tokio::test]
    async fn blocked_hash_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let book_dir = root.path();
        let path = write_mp3(book_dir, "blocked.mp3");
        let hash = crate::organizer::hash_file(&path.to_string_lossy()).unwrap();

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        store
            .block_hash(crate::types::DoNotImportEntry {
                hash,
                reason: "known bad rip".into(),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let hub = Arc::new(EventHub::new());
        let scanner = Scanner::new(Arc::clone(&store), hub, None, 1);
        let summary = scanner.scan(root.path(), None).await.unwrap();
        assert_eq!(summary.blocked, 1);
        assert_eq!(store.count_books().await.unwrap(), 0);
    }

    /// A scan canceled before it touches `root` must still find `root`'s
    /// file on the resumed run (§4.F Cancellation / checkpoint resume).
    #[tokio::test]
    async fn canceled_scan_resumes_and_finds_pending_directory() {
        use crate::types::OperationId;
        use tokio_util::sync::CancellationToken;

        let root = tempfile::tempdir().unwrap();
        write_mp3(root.path(), "only book.mp3");

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let hub = Arc::new(EventHub::new());
        let scanner = Scanner::new(Arc::clone(&store), hub.clone(), None, 1);
        let operation_id = OperationId::new();

        let canceled = CancellationToken::new();
        canceled.cancel();
        let ctx = OperationContext::new(operation_id, Arc::clone(&store), hub.clone(), canceled, vec![]);
        let err = scanner.scan(root.path(), Some(&ctx)).await.unwrap_err();
        assert!(matches!(err, CoreError::Canceled));
        assert_eq!(store.count_books().await.unwrap(), 0);

        let ctx = OperationContext::new(operation_id, Arc::clone(&store), hub, CancellationToken::new(), vec![]);
        let summary = scanner.scan(root.path(), Some(&ctx)).await.unwrap();
        assert_eq!(summary.new_books, 1);
        assert_eq!(store.count_books().await.unwrap(), 1);
    }
}
