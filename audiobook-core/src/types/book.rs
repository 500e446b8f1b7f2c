//! Core catalog entities (data model §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AuthorId, BookId, ImportPathId, SeriesId, WorkId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author_id: Option<AuthorId>,
    pub series_id: Option<SeriesId>,
    pub series_position: Option<f32>,
    pub narrator: Option<String>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
    pub duration_seconds: Option<u64>,
    pub bitrate: Option<u32>,
    pub codec: Option<String>,
    pub channels: Option<u8>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u8>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub description: Option<String>,
    pub cover_path: Option<String>,
    pub import_path_id: Option<ImportPathId>,
    pub current_file_path: String,
    pub original_file_path: String,
    /// Content hash of the file as first discovered at import time.
    pub file_hash: Option<String>,
    /// Content hash computed after a successful organize run.
    pub organized_hash: Option<String>,
    pub version_group_id: Option<String>,
    pub version_label: Option<String>,
    pub is_primary_version: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn new(current_file_path: impl Into<String>) -> Self {
        let now = Utc::now();
        let path = current_file_path.into();
        Self {
            id: BookId::new(),
            title: String::new(),
            author_id: None,
            series_id: None,
            series_position: None,
            narrator: None,
            language: None,
            publisher: None,
            year: None,
            duration_seconds: None,
            bitrate: None,
            codec: None,
            channels: None,
            sample_rate: None,
            bit_depth: None,
            isbn10: None,
            isbn13: None,
            description: None,
            cover_path: None,
            import_path_id: None,
            original_file_path: path.clone(),
            current_file_path: path,
            file_hash: None,
            organized_hash: None,
            version_group_id: None,
            version_label: None,
            is_primary_version: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesId,
    pub author_id: Option<AuthorId>,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Work {
    pub id: WorkId,
    pub title: String,
    pub author_id: Option<AuthorId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookSegment {
    pub parent_book_id: BookId,
    pub file_path: String,
    pub ordinal: u32,
    pub duration_seconds: Option<u64>,
    pub size_bytes: u64,
    pub fingerprint: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportPath {
    pub id: ImportPathId,
    pub absolute_path: String,
    pub display_name: String,
    pub enabled: bool,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub book_count: u64,
}

/// Provenance/lock tracking for one field of one Book (data model §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataFieldState {
    pub book_id: BookId,
    pub field: String,
    pub source: String,
    pub fetched_value: Option<String>,
    pub override_value: Option<String>,
    pub locked: bool,
    pub updated_at: DateTime<Utc>,
}

impl MetadataFieldState {
    /// The value that should win on the next assembly pass.
    pub fn effective_value(&self) -> Option<&str> {
        self.override_value
            .as_deref()
            .or(self.fetched_value.as_deref())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoNotImportEntry {
    pub hash: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryFingerprint {
    pub path: String,
    pub size: u64,
    pub mtime_unix: i64,
    pub crc32: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: String,
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub type_tag: String,
    pub is_secret: bool,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_books: u64,
    pub soft_deleted_books: u64,
    pub total_authors: u64,
    pub total_series: u64,
}
