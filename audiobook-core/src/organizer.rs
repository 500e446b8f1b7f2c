//! File Organizer (component §4.H): templated path rendering, atomic
//! move/copy, backup/rollback, duplicate and do-not-import guards.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::catalog::{StaleWriteGuard, Store};
use crate::error::{CoreError, Result};
use crate::orchestration::{OperationContext, OperationHandler};
use crate::types::{Book, DoNotImportEntry, LogLevel};

const MAX_SEGMENT_CODEPOINTS: usize = 200;
const PAGE_SIZE: usize = 200;

#[derive(Clone, Debug)]
pub struct OrganizeTemplate {
    pub pattern: String,
}

impl OrganizeTemplate {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into() }
    }

    /// Renders `{author}`, `{series}`, `{series_position:02d}`, `{title}`,
    /// `{narrator}`, `{year}`, `{format}` against `book`, sanitizing each
    /// segment independently (§4.H Template language). Returns an error if
    /// any placeholder survives rendering. `author_name`/`series_name` are
    /// resolved by the caller since `Book` only carries numeric ids.
    pub fn render(&self, book: &Book, author_name: Option<&str>, series_name: Option<&str>) -> Result<PathBuf> {
        let format = book
            .current_file_path
            .rsplit('.')
            .next()
            .unwrap_or("unknown")
            .to_string();

        let rendered = self
            .pattern
            .replace("{author}", &sanitize_segment(author_name.map(str::to_string), "Unknown Author"))
            .replace("{series}", &sanitize_segment(series_name.map(str::to_string), "Unknown Series"))
            .replace(
                "{series_position:02d}",
                &book.series_position.map(|p| format!("{:02}", p as u32)).unwrap_or_default(),
            )
            .replace("{title}", &sanitize_segment(Some(book.title.clone()).filter(|t| !t.is_empty()), "Unknown Title"))
            .replace("{narrator}", &sanitize_segment(book.narrator.clone(), "Unknown Narrator"))
            .replace("{year}", &book.year.map(|y| y.to_string()).unwrap_or_default())
            .replace("{format}", &format);

        if PLACEHOLDER.is_match(&rendered) {
            return Err(CoreError::Template(format!("unresolved placeholder in {rendered}")));
        }

        Ok(PathBuf::from(rendered))
    }
}

static PLACEHOLDER: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"\{[a-z_]+\}").unwrap());

/// Strips path separators, collapses whitespace, trims OS-reserved
/// characters, caps at 200 code points, falls back when empty (§4.H).
fn sanitize_segment(value: Option<String>, fallback: &str) -> String {
    let raw = match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => return fallback.to_string(),
    };

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped: String = collapsed
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let trimmed = stripped.trim();

    if trimmed.is_empty() {
        return fallback.to_string();
    }

    trimmed.chars().take(MAX_SEGMENT_CODEPOINTS).collect()
}

pub enum OrganizeOutcome {
    NoOp,
    Organized { new_path: PathBuf },
    AlreadyOrganized { new_path: PathBuf },
    DuplicateOfBook(String),
    Blocked { reason: String },
    DryRun { would_be_path: PathBuf },
}

/// At most one organize operation targets a given canonical path at a time
/// (§4.H Concurrency: a path-level advisory lock held for the duration of
/// the whole sequence).
#[derive(Default)]
pub struct PathLocks {
    held: Mutex<HashSet<PathBuf>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, path: &Path) -> Result<PathGuard<'_>> {
        let mut held = self.held.lock();
        if held.contains(path) {
            return Err(CoreError::LockHeld(path.to_path_buf()));
        }
        held.insert(path.to_path_buf());
        Ok(PathGuard { locks: self, path: path.to_path_buf() })
    }
}

struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: PathBuf,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.path);
    }
}

pub struct Organizer {
    store: Arc<dyn Store>,
    library_root: PathBuf,
    template: OrganizeTemplate,
    locks: PathLocks,
}

impl Organizer {
    pub fn new(store: Arc<dyn Store>, library_root: PathBuf, template: OrganizeTemplate) -> Self {
        Self { store, library_root, template, locks: PathLocks::new() }
    }

    pub async fn organize(&self, book: &Book, dry_run: bool) -> Result<OrganizeOutcome> {
        if let Some(entry) = self.check_do_not_import(book).await? {
            return Ok(OrganizeOutcome::Blocked { reason: entry.reason });
        }

        let author_name = match book.author_id {
            Some(id) => self.store.get_author(&id).await?.map(|a| a.name),
            None => None,
        };
        let series_name = match book.series_id {
            Some(id) => self.store.get_series(&id).await?.map(|s| s.name),
            None => None,
        };
        let relative = self.template.render(book, author_name.as_deref(), series_name.as_deref())?;
        let target = self.library_root.join(&relative);

        if target == Path::new(&book.current_file_path) {
            return Ok(OrganizeOutcome::NoOp);
        }

        if dry_run {
            return Ok(OrganizeOutcome::DryRun { would_be_path: target });
        }

        let _guard = self.locks.acquire(&target)?;

        if let Some(existing) = self.store.get_book_by_file_hash(&hash_file(&book.current_file_path)?).await? {
            if !existing.is_deleted() && existing.id != book.id {
                return Ok(OrganizeOutcome::DuplicateOfBook(existing.id.to_string()));
            }
        }

        let source_hash = hash_file(&book.current_file_path)?;

        if target.exists() {
            let target_hash = hash_file(&target.to_string_lossy())?;
            if target_hash == source_hash {
                self.record_already_organized(book, &target, &source_hash).await?;
                return Ok(OrganizeOutcome::AlreadyOrganized { new_path: target });
            }
            return self.organize_with_disambiguator(book, &target, 2).await;
        }

        self.move_into_place(book, &target, &source_hash).await?;
        Ok(OrganizeOutcome::Organized { new_path: target })
    }

    async fn organize_with_disambiguator(
        &self,
        book: &Book,
        base_target: &Path,
        attempt: u32,
    ) -> Result<OrganizeOutcome> {
        if attempt > 100 {
            return Err(CoreError::Conflict("too many disambiguation attempts".into()));
        }
        let stem = base_target.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let ext = base_target.extension().map(|e| e.to_string_lossy().into_owned());
        let candidate_name = match &ext {
            Some(ext) => format!("{stem} ({attempt}).{ext}"),
            None => format!("{stem} ({attempt})"),
        };
        let candidate = base_target.with_file_name(candidate_name);

        if candidate.exists() {
            return Box::pin(self.organize_with_disambiguator(book, base_target, attempt + 1)).await;
        }

        let source_hash = hash_file(&book.current_file_path)?;
        self.move_into_place(book, &candidate, &source_hash).await?;
        Ok(OrganizeOutcome::Organized { new_path: candidate })
    }

    async fn move_into_place(&self, book: &Book, target: &Path, source_hash: &str) -> Result<()> {
        let source = PathBuf::from(&book.current_file_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let backup = target.with_extension("organize.bak");
        std::fs::copy(&source, &backup)?;

        let verify_hash = hash_file(&backup.to_string_lossy())?;
        if verify_hash != source_hash {
            let _ = std::fs::remove_file(&backup);
            return Err(CoreError::Storage("backup verification hash mismatch".into()));
        }

        let rename_result = std::fs::rename(&source, target);
        let moved = match rename_result {
            Ok(()) => true,
            Err(_) => {
                // Cross-filesystem rename: copy-then-fsync-then-unlink-source.
                std::fs::copy(&source, target)?;
                let file = std::fs::File::open(target)?;
                file.sync_all()?;
                std::fs::remove_file(&source)?;
                true
            }
        };

        if !moved {
            let _ = std::fs::remove_file(&backup);
            return Err(CoreError::Storage("move failed".into()));
        }

        let mut updated = book.clone();
        updated.current_file_path = target.to_string_lossy().into_owned();
        updated.organized_hash = Some(source_hash.to_string());
        let guard = StaleWriteGuard { expected_updated_at: book.updated_at };
        if let Err(err) = self.store.update_book(&book.id, updated, Some(guard)).await {
            // Roll back the move and restore from backup on any post-move failure.
            let _ = std::fs::rename(target, &source);
            let _ = std::fs::copy(&backup, &source);
            let _ = std::fs::remove_file(&backup);
            return Err(err);
        }

        let _ = std::fs::remove_file(&backup);
        Ok(())
    }

    /// The file already sits at `target` with matching content; still brings
    /// the catalog's `current_file_path`/`organized_hash` in line with it
    /// (§4.H: organize always leaves the Book pointing at where its file
    /// actually is, even when no file move was needed).
    async fn record_already_organized(&self, book: &Book, target: &Path, source_hash: &str) -> Result<()> {
        if book.current_file_path == target.to_string_lossy() && book.organized_hash.as_deref() == Some(source_hash) {
            return Ok(());
        }
        let mut updated = book.clone();
        updated.current_file_path = target.to_string_lossy().into_owned();
        updated.organized_hash = Some(source_hash.to_string());
        let guard = StaleWriteGuard { expected_updated_at: book.updated_at };
        self.store.update_book(&book.id, updated, Some(guard)).await?;
        Ok(())
    }

    async fn check_do_not_import(&self, book: &Book) -> Result<Option<DoNotImportEntry>> {
        let hash = hash_file(&book.current_file_path)?;
        self.store.is_blocked_hash(&hash).await
    }
}

/// SHA-256 of the full file contents; used for duplicate detection and
/// backup verification (distinct from the scanner's cheap
/// crc32-of-first-64KiB fingerprint).
pub(crate) fn hash_file(path: &str) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// Parameters an enqueued organize operation is stored with; `params` on
/// `OperationContext` deserializes into this.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct OrganizeParams {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
struct OrganizeCheckpoint {
    offset: usize,
}

/// Adapts [`Organizer`] to the operation queue's handler registry (§9),
/// mirroring [`crate::scanner::ScanHandler`]: paginates `list_books` and
/// checkpoints the running offset after every book so a crash or cancel
/// between a target copy and its source unlink leaves a resumable
/// `Interrupted` operation rather than silently dropping the run (§8 S5).
pub struct OrganizeHandler {
    store: Arc<dyn Store>,
    library_root: PathBuf,
    template: OrganizeTemplate,
}

impl OrganizeHandler {
    pub fn new(store: Arc<dyn Store>, library_root: PathBuf, template: OrganizeTemplate) -> Self {
        Self { store, library_root, template }
    }

    async fn checkpoint(&self, ctx: &OperationContext, offset: usize) -> Result<()> {
        let bytes = serde_json::to_vec(&OrganizeCheckpoint { offset })
            .map_err(|e| CoreError::Storage(format!("encode organize checkpoint: {e}")))?;
        ctx.checkpoint(bytes).await
    }
}

#[async_trait::async_trait]
impl OperationHandler for OrganizeHandler {
    async fn run(&self, ctx: &mut OperationContext) -> Result<()> {
        let params: OrganizeParams = if ctx.params.is_empty() {
            OrganizeParams::default()
        } else {
            serde_json::from_slice(&ctx.params)
                .map_err(|e| CoreError::Validation(format!("bad organize params: {e}")))?
        };

        let organizer = Organizer::new(Arc::clone(&self.store), self.library_root.clone(), self.template.clone());

        let mut offset = match self.store.get_operation_state(&ctx.operation_id).await? {
            Some(bytes) if !bytes.is_empty() => {
                let checkpoint: OrganizeCheckpoint = serde_json::from_slice(&bytes)
                    .map_err(|e| CoreError::Storage(format!("corrupt organize checkpoint: {e}")))?;
                checkpoint.offset
            }
            _ => 0,
        };

        let total = self.store.count_books().await?;
        let mut done = offset as u64;
        let mut organized = 0u64;
        let mut skipped = 0u64;

        loop {
            if ctx.is_canceled() {
                self.checkpoint(ctx, offset).await?;
                return Err(CoreError::Canceled);
            }

            let page = self.store.list_books(PAGE_SIZE, offset).await?;
            if page.is_empty() {
                break;
            }

            for book in page {
                if ctx.is_canceled() {
                    self.checkpoint(ctx, offset).await?;
                    return Err(CoreError::Canceled);
                }

                match organizer.organize(&book, params.dry_run).await? {
                    OrganizeOutcome::Organized { new_path } | OrganizeOutcome::DryRun { would_be_path: new_path } => {
                        organized += 1;
                        ctx.log(LogLevel::Info, format!("organized {} -> {}", book.current_file_path, new_path.display()))
                            .await?;
                    }
                    OrganizeOutcome::Blocked { reason } => {
                        skipped += 1;
                        ctx.log(LogLevel::Warn, format!("{} blocked: {reason}", book.current_file_path)).await?;
                    }
                    OrganizeOutcome::DuplicateOfBook(id) => {
                        skipped += 1;
                        ctx.log(LogLevel::Warn, format!("{} duplicates book {id}", book.current_file_path)).await?;
                    }
                    OrganizeOutcome::AlreadyOrganized { .. } | OrganizeOutcome::NoOp => {
                        skipped += 1;
                    }
                }

                offset += 1;
                done += 1;
                self.checkpoint(ctx, offset).await?;
                ctx.report(done, total, format!("organized {done}/{total} books")).await?;
            }
        }

        self.store.put_operation_state(&ctx.operation_id, Vec::new()).await?;
        ctx.report(done, total, format!("organize complete: {organized} organized, {skipped} skipped")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryStore;

    #[tokio::test]
    async fn organizes_file_into_author_title_path() {
        let dir = tempfile::tempdir().unwrap();
        let source_dir = dir.path().join("inbox");
        std::fs::create_dir_all(&source_dir).unwrap();
        let source = source_dir.join("book.mp3");
        std::fs::write(&source, b"audio bytes").unwrap();

        let store = Arc::new(InMemoryStore::new());
        let author = store.find_or_create_author("Ursula K. Le Guin").await.unwrap();

        let mut book = Book::new(source.to_string_lossy().into_owned());
        book.title = "The Dispossessed".to_string();
        book.author_id = Some(author.id);
        let book = store.create_book(book).await.unwrap();

        let template = OrganizeTemplate::new("{author}/{title}.{format}");
        let organizer = Organizer::new(store.clone() as Arc<dyn Store>, dir.path().join("library"), template);

        let outcome = organizer.organize(&book, false).await.unwrap();
        match outcome {
            OrganizeOutcome::Organized { new_path } => {
                assert!(new_path.ends_with("Ursula K. Le Guin/The Dispossessed.mp3"));
                assert!(new_path.exists());
                assert!(!source.exists());
            }
            _ => panic!("expected Organized outcome"),
        }
    }

    #[test]
    fn sanitize_falls_back_on_empty_author() {
        assert_eq!(sanitize_segment(None, "Unknown Author"), "Unknown Author");
    }

    #[test]
    fn sanitize_strips_reserved_characters() {
        assert_eq!(sanitize_segment(Some("A/B: C?".into()), "x"), "AB C");
    }

    #[test]
    fn template_rejects_unresolved_placeholder() {
        let template = OrganizeTemplate::new("{author}/{nonexistent_token}/{title}");
        let book = Book::new("/tmp/a.mp3");
        let result = template.render(&book, Some("Author"), None);
        assert!(result.is_err());
    }

    /// A concurrent write between organize()'s file move and its catalog
    /// update must roll the move back rather than leave the file relocated
    /// with a stale catalog entry (§4.H Concurrency/rollback).
    #[tokio::test]
    async fn move_failure_rolls_back_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let source_dir = dir.path().join("inbox");
        std::fs::create_dir_all(&source_dir).unwrap();
        let source = source_dir.join("book.mp3");
        std::fs::write(&source, b"original bytes").unwrap();

        let store = Arc::new(InMemoryStore::new());
        let mut book = Book::new(source.to_string_lossy().into_owned());
        book.title = "Stale Conflict".to_string();
        let stale_book = store.create_book(book).await.unwrap();

        // Bump the catalog's updated_at out from under `stale_book` so the
        // guard built from it is out of date by the time organize() writes.
        let mut bumped = stale_book.clone();
        bumped.narrator = Some("Someone Else".into());
        store.update_book(&stale_book.id, bumped, None).await.unwrap();

        let template = OrganizeTemplate::new("{title}.{format}");
        let organizer = Organizer::new(store.clone() as Arc<dyn Store>, dir.path().join("library"), template);

        let result = organizer.organize(&stale_book, false).await;
        assert!(matches!(result, Err(CoreError::Conflict(_))));

        assert!(source.exists(), "source should be restored after rollback");
        assert_eq!(std::fs::read(&source).unwrap(), b"original bytes");
        let target = dir.path().join("library").join("Stale Conflict.mp3");
        assert!(!target.exists(), "target should not remain after rollback");
    }

    /// When the file is already at its rendered target path, organize()
    /// must still bring the catalog's `current_file_path`/`organized_hash`
    /// in line with disk instead of silently treating the run as a no-op
    /// (§4.H "update the Book's organized_path").
    #[tokio::test]
    async fn already_organized_updates_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let library = dir.path().join("library");
        std::fs::create_dir_all(&library).unwrap();
        let target = library.join("Preshelved.mp3");
        std::fs::write(&target, b"audio bytes").unwrap();

        let source = dir.path().join("inbox").join("elsewhere.mp3");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"audio bytes").unwrap();

        let store = Arc::new(InMemoryStore::new());
        let mut book = Book::new(source.to_string_lossy().into_owned());
        book.title = "Preshelved".to_string();
        let book = store.create_book(book).await.unwrap();

        let template = OrganizeTemplate::new("{title}.{format}");
        let organizer = Organizer::new(store.clone() as Arc<dyn Store>, library, template);

        let outcome = organizer.organize(&book, false).await.unwrap();
        assert!(matches!(outcome, OrganizeOutcome::AlreadyOrganized { .. }));

        let reloaded = store.get_book(&book.id).await.unwrap();
        assert_eq!(reloaded.current_file_path, target.to_string_lossy());
        assert!(reloaded.organized_hash.is_some());
    }

    #[tokio::test]
    async fn organize_handler_processes_queue_operation() {
        use crate::event_hub::EventHub;
        use crate::types::OperationId;
        use tokio_util::sync::CancellationToken;

        let dir = tempfile::tempdir().unwrap();
        let source_dir = dir.path().join("inbox");
        std::fs::create_dir_all(&source_dir).unwrap();
        let source = source_dir.join("book.mp3");
        std::fs::write(&source, b"audio bytes").unwrap();

        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let mut book = Book::new(source.to_string_lossy().into_owned());
        book.title = "Handler Book".to_string();
        store.create_book(book).await.unwrap();

        let template = OrganizeTemplate::new("{title}.{format}");
        let handler = OrganizeHandler::new(Arc::clone(&store), dir.path().join("library"), template);

        let hub = Arc::new(EventHub::new());
        let mut ctx = OperationContext::new(
            OperationId::new(),
            Arc::clone(&store),
            hub,
            CancellationToken::new(),
            Vec::new(),
        );
        handler.run(&mut ctx).await.unwrap();

        let target = dir.path().join("library").join("Handler Book.mp3");
        assert!(target.exists());
        assert!(store.get_operation_state(&ctx.operation_id).await.unwrap().unwrap_or_default().is_empty());
    }
}
