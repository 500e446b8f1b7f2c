use std::path::Path;

use super::TagRecord;
use crate::error::{CoreError, Result};

pub fn read(path: &Path) -> Result<TagRecord> {
    let tag = metaflac::Tag::read_from_path(path).map_err(|e| CoreError::Storage(e.to_string()))?;
    let comments = tag
        .vorbis_comments()
        .ok_or_else(|| CoreError::Validation("no VORBIS_COMMENT block".into()))?;

    let first = |key: &str| comments.get(key).and_then(|v| v.first()).cloned();

    Ok(TagRecord {
        title: first("TITLE"),
        album: first("ALBUM"),
        artist: first("ARTIST"),
        album_artist: first("ALBUMARTIST"),
        composer: first("COMPOSER"),
        performer: first("PERFORMER"),
        genre: first("GENRE"),
        year: first("DATE").and_then(|d| d.get(0..4).and_then(|y| y.parse().ok())),
        comment: first("COMMENT"),
        narrator: first("NARRATOR"),
        isbn: first("ISBN"),
        series: first("SERIES"),
        series_index: first("SERIES-PART").or_else(|| first("SERIESPART")).and_then(|v| v.parse().ok()),
        language: first("LANGUAGE"),
        publisher: first("PUBLISHER").or_else(|| first("LABEL")),
        used_filename_fallback: false,
    })
}
