//! Tag Reader (component §4.B): per-format native-crate extraction with a
//! filename-fallback path, never a CLI-tool shellout.

mod flac;
mod mp3;
mod mp4;
mod ogg;

use std::path::Path;

use serde::Serialize;

use crate::error::{CoreError, Result};

#[derive(Clone, Debug, Default, Serialize)]
pub struct TagRecord {
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub composer: Option<String>,
    pub performer: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub comment: Option<String>,
    pub narrator: Option<String>,
    pub isbn: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<f32>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    /// Set when container reads failed and only the filename stem could be
    /// used as a title candidate (§4.B contract).
    pub used_filename_fallback: bool,
}

impl TagRecord {
    fn filename_fallback(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            title: Some(stem),
            used_filename_fallback: true,
            ..Default::default()
        }
    }
}

/// Dispatches on file extension; directories and unreadable files degrade to
/// the filename-fallback record rather than returning an error (§8 boundary
/// behaviour: "Tag reader on a directory returns a record with
/// UsedFilenameFallback=true, never an error").
pub fn extract_tags(path: &Path) -> Result<TagRecord> {
    if path.is_dir() {
        return Ok(TagRecord::filename_fallback(path));
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let result = match ext.as_str() {
        "mp3" => mp3::read(path),
        "flac" => flac::read(path),
        "m4a" | "m4b" => mp4::read(path),
        "ogg" | "oga" => ogg::read(path),
        _ => Err(CoreError::Validation(format!("unsupported audio extension: {ext}"))),
    };

    match result {
        Ok(record) => Ok(record),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "tag read failed, falling back to filename");
            Ok(TagRecord::filename_fallback(path))
        }
    }
}

/// Scoped backup-and-restore around an in-place tag write. The backup is
/// always released: deleted on success, used to restore on failure, and
/// removed afterwards unless `keep_backup` is set (§4.B write path).
pub fn with_backup<F>(path: &Path, keep_backup: bool, write: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().and_then(|e| e.to_str()).unwrap_or("tag")
    ));
    std::fs::copy(path, &backup_path)?;

    match write() {
        Ok(()) => {
            if !keep_backup {
                let _ = std::fs::remove_file(&backup_path);
            }
            Ok(())
        }
        Err(err) => {
            std::fs::copy(&backup_path, path)?;
            let _ = std::fs::remove_file(&backup_path);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_input_falls_back_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let record = extract_tags(dir.path()).unwrap();
        assert!(record.used_filename_fallback);
    }

    #[test]
    fn unreadable_file_falls_back_to_filename_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("01 Part 1 of 67.mp3");
        std::fs::write(&path, b"not actually an mp3").unwrap();
        let record = extract_tags(&path).unwrap();
        assert!(record.used_filename_fallback);
        assert_eq!(record.title.as_deref(), Some("01 Part 1 of 67"));
    }
}
