//! Optional relational Catalog Store backend, selected with `--db-type sqlite`
//! (§4.A "optional relational backend"). Grounded on
//! `examples/Lowband21-ferrex/ferrex-core/src/database` — the teacher's
//! `sqlx`-based persistence layer — generalized from Postgres to the
//! `sqlx::Sqlite` driver since the spec calls for a file-based relational
//! option rather than a standalone server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use super::Store;
use crate::error::{CoreError, Result};
use crate::types::{
    Author, AuthorId, Book, BookId, DashboardStats, DoNotImportEntry, ImportPath, ImportPathId,
    LibraryFingerprint, MetadataFieldState, Operation, OperationId, OperationLogEntry,
    OperationPriority, OperationStatus, OperationType, Series, SeriesId, Setting,
};

use super::StaleWriteGuard;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS authors (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS series (
                id INTEGER PRIMARY KEY,
                author_id INTEGER,
                name TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author_id INTEGER,
                series_id INTEGER,
                series_position REAL,
                narrator TEXT,
                language TEXT,
                publisher TEXT,
                year INTEGER,
                duration_seconds INTEGER,
                bitrate INTEGER,
                codec TEXT,
                channels INTEGER,
                sample_rate INTEGER,
                bit_depth INTEGER,
                isbn10 TEXT,
                isbn13 TEXT,
                description TEXT,
                cover_path TEXT,
                import_path_id INTEGER,
                current_file_path TEXT NOT NULL,
                original_file_path TEXT NOT NULL,
                file_hash TEXT,
                original_hash TEXT,
                organized_hash TEXT,
                version_group_id TEXT,
                version_label TEXT,
                is_primary_version INTEGER NOT NULL,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_books_path ON books(current_file_path);
            CREATE INDEX IF NOT EXISTS idx_books_hash ON books(file_hash);
            CREATE INDEX IF NOT EXISTS idx_books_orig ON books(original_hash);
            CREATE INDEX IF NOT EXISTS idx_books_orghash ON books(organized_hash);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS field_states (
                book_id TEXT NOT NULL,
                field TEXT NOT NULL,
                source TEXT NOT NULL,
                fetched_value TEXT,
                override_value TEXT,
                locked INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (book_id, field)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS import_paths (
                id INTEGER PRIMARY KEY,
                absolute_path TEXT NOT NULL,
                display_name TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                last_scan_at TEXT,
                book_count INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS do_not_import (
                hash TEXT PRIMARY KEY,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fingerprints (
                path TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                mtime_unix INTEGER NOT NULL,
                crc32 INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                type_tag TEXT NOT NULL,
                is_secret INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS operations (
                id TEXT PRIMARY KEY,
                op_type TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INTEGER NOT NULL,
                progress INTEGER NOT NULL,
                total INTEGER NOT NULL,
                message TEXT NOT NULL,
                folder_scope TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                error_message TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS operation_logs (
                operation_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                detail TEXT,
                at TEXT NOT NULL,
                PRIMARY KEY (operation_id, seq)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS operation_state (
                operation_id TEXT PRIMARY KEY,
                state BLOB NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS operation_params (
                operation_id TEXT PRIMARY KEY,
                params BLOB NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_book(row: &sqlx::sqlite::SqliteRow) -> Result<Book> {
        Ok(Book {
            id: BookId(row.try_get("id")?),
            title: row.try_get("title")?,
            author_id: row.try_get::<Option<i64>, _>("author_id")?.map(|v| AuthorId(v as u64)),
            series_id: row.try_get::<Option<i64>, _>("series_id")?.map(|v| SeriesId(v as u64)),
            series_position: row.try_get("series_position")?,
            narrator: row.try_get("narrator")?,
            language: row.try_get("language")?,
            publisher: row.try_get("publisher")?,
            year: row.try_get("year")?,
            duration_seconds: row.try_get::<Option<i64>, _>("duration_seconds")?.map(|v| v as u64),
            bitrate: row.try_get::<Option<i64>, _>("bitrate")?.map(|v| v as u32),
            codec: row.try_get("codec")?,
            channels: row.try_get::<Option<i64>, _>("channels")?.map(|v| v as u8),
            sample_rate: row.try_get::<Option<i64>, _>("sample_rate")?.map(|v| v as u32),
            bit_depth: row.try_get::<Option<i64>, _>("bit_depth")?.map(|v| v as u8),
            isbn10: row.try_get("isbn10")?,
            isbn13: row.try_get("isbn13")?,
            description: row.try_get("description")?,
            cover_path: row.try_get("cover_path")?,
            import_path_id: row
                .try_get::<Option<i64>, _>("import_path_id")?
                .map(|v| ImportPathId(v as u64)),
            current_file_path: row.try_get("current_file_path")?,
            original_file_path: row.try_get("original_file_path")?,
            file_hash: row.try_get("file_hash")?,
            organized_hash: row.try_get("organized_hash")?,
            version_group_id: row.try_get("version_group_id")?,
            version_label: row.try_get("version_label")?,
            is_primary_version: row.try_get::<i64, _>("is_primary_version")? != 0,
            deleted_at: row
                .try_get::<Option<String>, _>("deleted_at")?
                .map(|s| parse_dt(&s))
                .transpose()?,
            created_at: parse_dt(&row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_dt(&row.try_get::<String, _>("updated_at")?)?,
        })
    }
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Storage(format!("bad timestamp {s}: {e}")))
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_book(&self, id: &BookId) -> Result<Book> {
        let row = sqlx::query("SELECT * FROM books WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("book {id}")))?;
        Self::row_to_book(&row)
    }

    async fn get_book_by_file_path(&self, path: &str) -> Result<Option<Book>> {
        let row = sqlx::query("SELECT * FROM books WHERE current_file_path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_book).transpose()
    }

    async fn get_book_by_file_hash(&self, hash: &str) -> Result<Option<Book>> {
        let row = sqlx::query("SELECT * FROM books WHERE file_hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_book).transpose()
    }

    async fn get_book_by_original_hash(&self, hash: &str) -> Result<Option<Book>> {
        let row = sqlx::query("SELECT * FROM books WHERE original_hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_book).transpose()
    }

    async fn get_book_by_organized_hash(&self, hash: &str) -> Result<Option<Book>> {
        let row = sqlx::query("SELECT * FROM books WHERE organized_hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_book).transpose()
    }

    async fn create_book(&self, book: Book) -> Result<Book> {
        sqlx::query(
            r#"
            INSERT INTO books (
                id, title, author_id, series_id, series_position, narrator, language,
                publisher, year, duration_seconds, bitrate, codec, channels, sample_rate,
                bit_depth, isbn10, isbn13, description, cover_path, import_path_id,
                current_file_path, original_file_path, file_hash, original_hash, organized_hash,
                version_group_id, version_label, is_primary_version, deleted_at,
                created_at, updated_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            "#,
        )
        .bind(&book.id.0)
        .bind(&book.title)
        .bind(book.author_id.map(|v| v.0 as i64))
        .bind(book.series_id.map(|v| v.0 as i64))
        .bind(book.series_position)
        .bind(&book.narrator)
        .bind(&book.language)
        .bind(&book.publisher)
        .bind(book.year)
        .bind(book.duration_seconds.map(|v| v as i64))
        .bind(book.bitrate.map(|v| v as i64))
        .bind(&book.codec)
        .bind(book.channels.map(|v| v as i64))
        .bind(book.sample_rate.map(|v| v as i64))
        .bind(book.bit_depth.map(|v| v as i64))
        .bind(&book.isbn10)
        .bind(&book.isbn13)
        .bind(&book.description)
        .bind(&book.cover_path)
        .bind(book.import_path_id.map(|v| v.0 as i64))
        .bind(&book.current_file_path)
        .bind(&book.original_file_path)
        .bind(&book.file_hash)
        // Seeded from file_hash at creation and never updated thereafter.
        .bind(&book.file_hash)
        .bind(&book.organized_hash)
        .bind(&book.version_group_id)
        .bind(&book.version_label)
        .bind(book.is_primary_version as i64)
        .bind(book.deleted_at.map(|d| d.to_rfc3339()))
        .bind(book.created_at.to_rfc3339())
        .bind(book.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(book)
    }

    async fn update_book(
        &self,
        id: &BookId,
        mut book: Book,
        guard: Option<StaleWriteGuard>,
    ) -> Result<Book> {
        let existing = self.get_book(id).await?;
        if let Some(g) = guard {
            if g.expected_updated_at < existing.updated_at {
                return Err(CoreError::Conflict(format!(
                    "stale write: book {id} was updated more recently"
                )));
            }
        }
        book.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE books SET
                title = ?, author_id = ?, series_id = ?, series_position = ?, narrator = ?,
                language = ?, publisher = ?, year = ?, duration_seconds = ?, bitrate = ?,
                codec = ?, channels = ?, sample_rate = ?, bit_depth = ?, isbn10 = ?,
                isbn13 = ?, description = ?, cover_path = ?, import_path_id = ?,
                current_file_path = ?, original_file_path = ?, file_hash = ?,
                organized_hash = ?, version_group_id = ?, version_label = ?,
                is_primary_version = ?, deleted_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&book.title)
        .bind(book.author_id.map(|v| v.0 as i64))
        .bind(book.series_id.map(|v| v.0 as i64))
        .bind(book.series_position)
        .bind(&book.narrator)
        .bind(&book.language)
        .bind(&book.publisher)
        .bind(book.year)
        .bind(book.duration_seconds.map(|v| v as i64))
        .bind(book.bitrate.map(|v| v as i64))
        .bind(&book.codec)
        .bind(book.channels.map(|v| v as i64))
        .bind(book.sample_rate.map(|v| v as i64))
        .bind(book.bit_depth.map(|v| v as i64))
        .bind(&book.isbn10)
        .bind(&book.isbn13)
        .bind(&book.description)
        .bind(&book.cover_path)
        .bind(book.import_path_id.map(|v| v.0 as i64))
        .bind(&book.current_file_path)
        .bind(&book.original_file_path)
        .bind(&book.file_hash)
        .bind(&book.organized_hash)
        .bind(&book.version_group_id)
        .bind(&book.version_label)
        .bind(book.is_primary_version as i64)
        .bind(book.deleted_at.map(|d| d.to_rfc3339()))
        .bind(book.updated_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;
        Ok(book)
    }

    async fn soft_delete_book(&self, id: &BookId, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE books SET deleted_at = ?, updated_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(at.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("book {id}")));
        }
        Ok(())
    }

    async fn list_soft_deleted_books(&self, older_than: DateTime<Utc>) -> Result<Vec<Book>> {
        let rows = sqlx::query("SELECT * FROM books WHERE deleted_at IS NOT NULL AND deleted_at < ?")
            .bind(older_than.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_book).collect()
    }

    async fn get_duplicate_books(&self) -> Result<Vec<Vec<Book>>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM books WHERE deleted_at IS NULL AND file_hash IN (
                SELECT file_hash FROM books
                WHERE deleted_at IS NULL AND file_hash IS NOT NULL
                GROUP BY file_hash HAVING COUNT(*) > 1
            )
            ORDER BY file_hash
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut groups: Vec<Vec<Book>> = Vec::new();
        for row in &rows {
            let book = Self::row_to_book(row)?;
            match groups.last_mut() {
                Some(group) if group[0].file_hash == book.file_hash => group.push(book),
                _ => groups.push(vec![book]),
            }
        }
        Ok(groups)
    }

    async fn search_books(&self, query: &str, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let rows = sqlx::query(
            r#"
            SELECT b.* FROM books b
            LEFT JOIN authors a ON a.id = b.author_id
            LEFT JOIN series s ON s.id = b.series_id
            WHERE b.deleted_at IS NULL AND (
                lower(b.title) LIKE ? OR lower(a.name) LIKE ? OR lower(s.name) LIKE ?
            )
            ORDER BY b.title
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_book).collect()
    }

    async fn list_books(&self, limit: usize, offset: usize) -> Result<Vec<Book>> {
        let rows = sqlx::query("SELECT * FROM books WHERE deleted_at IS NULL ORDER BY title LIMIT ? OFFSET ?")
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_book).collect()
    }

    async fn count_books(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) as c FROM books WHERE deleted_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("c")? as u64)
    }

    async fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        let total_books = self.count_books().await?;
        let soft_deleted_books = sqlx::query("SELECT COUNT(*) as c FROM books WHERE deleted_at IS NOT NULL")
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("c")? as u64;
        let total_authors = sqlx::query("SELECT COUNT(*) as c FROM authors")
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("c")? as u64;
        let total_series = sqlx::query("SELECT COUNT(*) as c FROM series")
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("c")? as u64;
        Ok(DashboardStats { total_books, soft_deleted_books, total_authors, total_series })
    }

    async fn get_author(&self, id: &AuthorId) -> Result<Option<Author>> {
        let row = sqlx::query("SELECT * FROM authors WHERE id = ?")
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Author { id: AuthorId(row.try_get::<i64, _>("id")? as u64), name: row.try_get("name")? })
        })
        .transpose()
    }

    async fn find_or_create_author(&self, name: &str) -> Result<Author> {
        let row = sqlx::query("SELECT * FROM authors WHERE lower(name) = lower(?)")
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = row {
            return Ok(Author { id: AuthorId(row.try_get::<i64, _>("id")? as u64), name: row.try_get("name")? });
        }
        let id = self.next_counter("author").await?;
        let name = name.trim().to_string();
        sqlx::query("INSERT INTO authors (id, name) VALUES (?, ?)")
            .bind(id as i64)
            .bind(&name)
            .execute(&self.pool)
            .await?;
        Ok(Author { id: AuthorId(id), name })
    }

    async fn get_series(&self, id: &SeriesId) -> Result<Option<Series>> {
        let row = sqlx::query("SELECT * FROM series WHERE id = ?")
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Series {
                id: SeriesId(row.try_get::<i64, _>("id")? as u64),
                author_id: row.try_get::<Option<i64>, _>("author_id")?.map(|v| AuthorId(v as u64)),
                name: row.try_get("name")?,
            })
        })
        .transpose()
    }

    async fn find_or_create_series(&self, name: &str, author_id: Option<AuthorId>) -> Result<Series> {
        let row = sqlx::query(
            "SELECT * FROM series WHERE lower(name) = lower(?) AND author_id IS ?",
        )
        .bind(name.trim())
        .bind(author_id.map(|a| a.0 as i64))
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row {
            return Ok(Series {
                id: SeriesId(row.try_get::<i64, _>("id")? as u64),
                author_id: row.try_get::<Option<i64>, _>("author_id")?.map(|v| AuthorId(v as u64)),
                name: row.try_get("name")?,
            });
        }
        let id = self.next_counter("series").await?;
        let name = name.trim().to_string();
        sqlx::query("INSERT INTO series (id, author_id, name) VALUES (?, ?, ?)")
            .bind(id as i64)
            .bind(author_id.map(|a| a.0 as i64))
            .bind(&name)
            .execute(&self.pool)
            .await?;
        Ok(Series { id: SeriesId(id), author_id, name })
    }

    async fn get_metadata_field_states(&self, book_id: &BookId) -> Result<Vec<MetadataFieldState>> {
        let rows = sqlx::query("SELECT * FROM field_states WHERE book_id = ?")
            .bind(&book_id.0)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                Ok(MetadataFieldState {
                    book_id: BookId(row.try_get("book_id")?),
                    field: row.try_get("field")?,
                    source: row.try_get("source")?,
                    fetched_value: row.try_get("fetched_value")?,
                    override_value: row.try_get("override_value")?,
                    locked: row.try_get::<i64, _>("locked")? != 0,
                    updated_at: parse_dt(&row.try_get::<String, _>("updated_at")?)?,
                })
            })
            .collect()
    }

    async fn upsert_metadata_field_state(&self, state: MetadataFieldState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO field_states (book_id, field, source, fetched_value, override_value, locked, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(book_id, field) DO UPDATE SET
                source = excluded.source,
                fetched_value = excluded.fetched_value,
                override_value = excluded.override_value,
                locked = excluded.locked,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.book_id.0)
        .bind(&state.field)
        .bind(&state.source)
        .bind(&state.fetched_value)
        .bind(&state.override_value)
        .bind(state.locked as i64)
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_import_paths(&self) -> Result<Vec<ImportPath>> {
        let rows = sqlx::query("SELECT * FROM import_paths").fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                Ok(ImportPath {
                    id: ImportPathId(row.try_get::<i64, _>("id")? as u64),
                    absolute_path: row.try_get("absolute_path")?,
                    display_name: row.try_get("display_name")?,
                    enabled: row.try_get::<i64, _>("enabled")? != 0,
                    last_scan_at: row
                        .try_get::<Option<String>, _>("last_scan_at")?
                        .map(|s| parse_dt(&s))
                        .transpose()?,
                    book_count: row.try_get::<i64, _>("book_count")? as u64,
                })
            })
            .collect()
    }

    async fn create_import_path(&self, mut path: ImportPath) -> Result<ImportPath> {
        if path.id.0 == 0 {
            path.id = ImportPathId(self.next_counter("import_path").await?);
        }
        sqlx::query(
            "INSERT INTO import_paths (id, absolute_path, display_name, enabled, last_scan_at, book_count) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(path.id.0 as i64)
        .bind(&path.absolute_path)
        .bind(&path.display_name)
        .bind(path.enabled as i64)
        .bind(path.last_scan_at.map(|d| d.to_rfc3339()))
        .bind(path.book_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(path)
    }

    async fn delete_import_path(&self, id: &ImportPathId) -> Result<()> {
        sqlx::query("DELETE FROM import_paths WHERE id = ?")
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_import_path_scan(&self, id: &ImportPathId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE import_paths SET last_scan_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_blocked_hash(&self, hash: &str) -> Result<Option<DoNotImportEntry>> {
        let row = sqlx::query("SELECT * FROM do_not_import WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(DoNotImportEntry {
                hash: row.try_get("hash")?,
                reason: row.try_get("reason")?,
                created_at: parse_dt(&row.try_get::<String, _>("created_at")?)?,
            })
        })
        .transpose()
    }

    async fn block_hash(&self, entry: DoNotImportEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO do_not_import (hash, reason, created_at) VALUES (?, ?, ?) ON CONFLICT(hash) DO UPDATE SET reason = excluded.reason",
        )
        .bind(&entry.hash)
        .bind(&entry.reason)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_fingerprint(&self, path: &str) -> Result<Option<LibraryFingerprint>> {
        let row = sqlx::query("SELECT * FROM fingerprints WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(LibraryFingerprint {
                path: row.try_get("path")?,
                size: row.try_get::<i64, _>("size")? as u64,
                mtime_unix: row.try_get("mtime_unix")?,
                crc32: row.try_get::<i64, _>("crc32")? as u32,
            })
        })
        .transpose()
    }

    async fn put_fingerprint(&self, fp: LibraryFingerprint) -> Result<()> {
        sqlx::query(
            "INSERT INTO fingerprints (path, size, mtime_unix, crc32) VALUES (?, ?, ?, ?) ON CONFLICT(path) DO UPDATE SET size = excluded.size, mtime_unix = excluded.mtime_unix, crc32 = excluded.crc32",
        )
        .bind(&fp.path)
        .bind(fp.size as i64)
        .bind(fp.mtime_unix)
        .bind(fp.crc32 as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<Setting>> {
        let row = sqlx::query("SELECT * FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Setting {
                key: row.try_get("key")?,
                value: row.try_get("value")?,
                type_tag: row.try_get("type_tag")?,
                is_secret: row.try_get::<i64, _>("is_secret")? != 0,
            })
        })
        .transpose()
    }

    async fn put_setting(&self, setting: Setting) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value, type_tag, is_secret) VALUES (?, ?, ?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value, type_tag = excluded.type_tag, is_secret = excluded.is_secret",
        )
        .bind(&setting.key)
        .bind(&setting.value)
        .bind(&setting.type_tag)
        .bind(setting.is_secret as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_operation(&self, op: Operation) -> Result<Operation> {
        sqlx::query(
            r#"
            INSERT INTO operations (id, op_type, status, priority, progress, total, message, folder_scope, created_at, started_at, completed_at, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(op.id.to_string())
        .bind(op.op_type.to_string())
        .bind(format!("{:?}", op.status).to_lowercase())
        .bind(op.priority.0)
        .bind(op.progress as i64)
        .bind(op.total as i64)
        .bind(&op.message)
        .bind(&op.folder_scope)
        .bind(op.created_at.to_rfc3339())
        .bind(op.started_at.map(|d| d.to_rfc3339()))
        .bind(op.completed_at.map(|d| d.to_rfc3339()))
        .bind(&op.error_message)
        .execute(&self.pool)
        .await?;
        Ok(op)
    }

    async fn get_operation(&self, id: &OperationId) -> Result<Operation> {
        let row = sqlx::query("SELECT * FROM operations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("operation {id}")))?;
        row_to_operation(&row)
    }

    async fn update_operation(&self, op: Operation) -> Result<Operation> {
        sqlx::query(
            r#"
            UPDATE operations SET status = ?, priority = ?, progress = ?, total = ?, message = ?,
                started_at = ?, completed_at = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(format!("{:?}", op.status).to_lowercase())
        .bind(op.priority.0)
        .bind(op.progress as i64)
        .bind(op.total as i64)
        .bind(&op.message)
        .bind(op.started_at.map(|d| d.to_rfc3339()))
        .bind(op.completed_at.map(|d| d.to_rfc3339()))
        .bind(&op.error_message)
        .bind(op.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(op)
    }

    async fn list_operations_by_status(&self, status: OperationStatus) -> Result<Vec<Operation>> {
        let rows = sqlx::query("SELECT * FROM operations WHERE status = ?")
            .bind(format!("{:?}", status).to_lowercase())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_operation).collect()
    }

    async fn append_operation_log(&self, entry: OperationLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO operation_logs (operation_id, seq, level, message, detail, at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.operation_id.to_string())
        .bind(entry.seq as i64)
        .bind(format!("{:?}", entry.level).to_lowercase())
        .bind(entry.message)
        .bind(entry.detail.map(|v| v.to_string()))
        .bind(entry.at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_operation_logs(&self, id: &OperationId) -> Result<Vec<OperationLogEntry>> {
        let rows = sqlx::query("SELECT * FROM operation_logs WHERE operation_id = ? ORDER BY seq")
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let level_str: String = row.try_get("level")?;
                Ok(OperationLogEntry {
                    operation_id: *id,
                    seq: row.try_get::<i64, _>("seq")? as u64,
                    level: match level_str.as_str() {
                        "debug" => crate::types::LogLevel::Debug,
                        "warn" => crate::types::LogLevel::Warn,
                        "error" => crate::types::LogLevel::Error,
                        _ => crate::types::LogLevel::Info,
                    },
                    message: row.try_get("message")?,
                    detail: row
                        .try_get::<Option<String>, _>("detail")?
                        .and_then(|s| serde_json::from_str(&s).ok()),
                    at: parse_dt(&row.try_get::<String, _>("at")?)?,
                })
            })
            .collect()
    }

    async fn put_operation_state(&self, id: &OperationId, state: Vec<u8>) -> Result<()> {
        sqlx::query(
            "INSERT INTO operation_state (operation_id, state) VALUES (?, ?) ON CONFLICT(operation_id) DO UPDATE SET state = excluded.state",
        )
        .bind(id.to_string())
        .bind(state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_operation_state(&self, id: &OperationId) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT state FROM operation_state WHERE operation_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get::<Vec<u8>, _>("state").map_err(CoreError::from))
            .transpose()
    }

    async fn put_operation_params(&self, id: &OperationId, params: Vec<u8>) -> Result<()> {
        sqlx::query(
            "INSERT INTO operation_params (operation_id, params) VALUES (?, ?) ON CONFLICT(operation_id) DO UPDATE SET params = excluded.params",
        )
        .bind(id.to_string())
        .bind(params)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_operation_params(&self, id: &OperationId) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT params FROM operation_params WHERE operation_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get::<Vec<u8>, _>("params").map_err(CoreError::from))
            .transpose()
    }

    async fn next_counter(&self, name: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO counters (name, value) VALUES (?, 1) ON CONFLICT(name) DO UPDATE SET value = value + 1",
        )
        .bind(name)
        .execute(&mut *tx)
        .await?;
        let row = sqlx::query("SELECT value FROM counters WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;
        let value = row.try_get::<i64, _>("value")? as u64;
        tx.commit().await?;
        Ok(value)
    }
}

fn row_to_operation(row: &sqlx::sqlite::SqliteRow) -> Result<Operation> {
    let op_type_str: String = row.try_get("op_type")?;
    let status_str: String = row.try_get("status")?;
    Ok(Operation {
        id: OperationId(
            uuid::Uuid::parse_str(&row.try_get::<String, _>("id")?)
                .map_err(|e| CoreError::Storage(format!("bad operation id: {e}")))?,
        ),
        op_type: match op_type_str.as_str() {
            "scan" => OperationType::Scan,
            "organize" => OperationType::Organize,
            "fetch-metadata" => OperationType::FetchMetadata,
            "import" => OperationType::Import,
            "bulk-fetch" => OperationType::BulkFetch,
            other => return Err(CoreError::Storage(format!("unknown op_type: {other}"))),
        },
        status: match status_str.as_str() {
            "pending" => OperationStatus::Pending,
            "running" => OperationStatus::Running,
            "completed" => OperationStatus::Completed,
            "failed" => OperationStatus::Failed,
            "canceled" => OperationStatus::Canceled,
            "interrupted" => OperationStatus::Interrupted,
            other => return Err(CoreError::Storage(format!("unknown status: {other}"))),
        },
        priority: OperationPriority(row.try_get("priority")?),
        progress: row.try_get::<i64, _>("progress")? as u64,
        total: row.try_get::<i64, _>("total")? as u64,
        message: row.try_get("message")?,
        folder_scope: row.try_get("folder_scope")?,
        created_at: parse_dt(&row.try_get::<String, _>("created_at")?)?,
        started_at: row
            .try_get::<Option<String>, _>("started_at")?
            .map(|s| parse_dt(&s))
            .transpose()?,
        completed_at: row
            .try_get::<Option<String>, _>("completed_at")?
            .map(|s| parse_dt(&s))
            .transpose()?,
        error_message: row.try_get("error_message")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch_book() {
        let store = temp_store().await;
        let book = Book::new("/library/a.flac");
        let created = store.create_book(book).await.unwrap();
        let fetched = store.get_book(&created.id).await.unwrap();
        assert_eq!(fetched.current_file_path, "/library/a.flac");
    }

    #[tokio::test]
    async fn duplicate_detection_groups_by_hash() {
        let store = temp_store().await;
        let mut a = Book::new("/library/a.mp3");
        a.file_hash = Some("same".into());
        let mut b = Book::new("/library/b.mp3");
        b.file_hash = Some("same".into());
        store.create_book(a).await.unwrap();
        store.create_book(b).await.unwrap();
        let dupes = store.get_duplicate_books().await.unwrap();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].len(), 2);
    }
}
