use std::path::Path;

use mp4ameta::FreeformIdent;

use super::TagRecord;
use crate::error::{CoreError, Result};

const MEAN: &str = "com.apple.iTunes";

pub fn read(path: &Path) -> Result<TagRecord> {
    let tag = mp4ameta::Tag::read_from_path(path).map_err(|e| CoreError::Storage(e.to_string()))?;

    let freeform = |name: &'static str| -> Option<String> {
        tag.strings_of(&FreeformIdent::new(MEAN, name)).next().map(str::to_string)
    };

    Ok(TagRecord {
        title: tag.title().map(str::to_string),
        album: tag.album().map(str::to_string),
        artist: tag.artist().map(str::to_string),
        album_artist: tag.album_artist().map(str::to_string),
        composer: tag.composer().map(str::to_string),
        performer: None,
        genre: tag.genre().map(str::to_string),
        year: tag.year().and_then(|y| y.get(0..4).and_then(|s| s.parse().ok())),
        comment: None,
        narrator: freeform("NARRATOR"),
        isbn: freeform("ISBN"),
        series: freeform("SERIES") .or_else(|| freeform("MVNM")),
        series_index: freeform("SERIES-PART").and_then(|v| v.parse().ok()),
        language: freeform("LANGUAGE"),
        publisher: freeform("PUBLISHER"),
        used_filename_fallback: false,
    })
}
