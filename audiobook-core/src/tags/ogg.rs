use std::fs::File;
use std::path::Path;

use lewton::inside_ogg::OggStreamReader;

use super::TagRecord;
use crate::error::{CoreError, Result};

pub fn read(path: &Path) -> Result<TagRecord> {
    let file = File::open(path)?;
    let reader =
        OggStreamReader::new(file).map_err(|e| CoreError::Storage(format!("ogg decode: {e}")))?;

    let comments: std::collections::HashMap<String, String> = reader
        .comment_hdr
        .comment_list
        .into_iter()
        .map(|(k, v)| (k.to_uppercase(), v))
        .collect();

    let get = |key: &str| comments.get(key).cloned();

    Ok(TagRecord {
        title: get("TITLE"),
        album: get("ALBUM"),
        artist: get("ARTIST"),
        album_artist: get("ALBUMARTIST"),
        composer: get("COMPOSER"),
        performer: get("PERFORMER"),
        genre: get("GENRE"),
        year: get("DATE").and_then(|d| d.get(0..4).and_then(|y| y.parse().ok())),
        comment: get("COMMENT"),
        narrator: get("NARRATOR"),
        isbn: get("ISBN"),
        series: get("SERIES"),
        series_index: get("SERIES-PART").and_then(|v| v.parse().ok()),
        language: get("LANGUAGE"),
        publisher: get("PUBLISHER"),
        used_filename_fallback: false,
    })
}
