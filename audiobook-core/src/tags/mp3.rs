use std::path::Path;

use super::TagRecord;
use crate::error::{CoreError, Result};

pub fn read(path: &Path) -> Result<TagRecord> {
    let tag = id3::Tag::read_from_path(path).map_err(|e| CoreError::Storage(e.to_string()))?;

    let mut record = TagRecord {
        title: tag.title().map(str::to_string),
        album: tag.album().map(str::to_string),
        artist: tag.artist().map(str::to_string),
        album_artist: tag.album_artist().map(str::to_string),
        genre: tag.genre().map(str::to_string),
        year: tag.year(),
        ..Default::default()
    };

    if let Some(frame) = tag.get("TCOM") {
        record.composer = frame.content().text().map(str::to_string);
    }

    for comment in tag.comments() {
        if record.comment.is_none() {
            record.comment = Some(comment.text.clone());
        }
        extract_from_comment_text(&comment.text, &mut record);
    }

    for ext in tag.extended_texts() {
        match ext.description.to_uppercase().as_str() {
            "NARRATOR" => record.narrator = Some(ext.value.clone()),
            "ISBN" => record.isbn = Some(ext.value.clone()),
            "SERIES" => record.series = Some(ext.value.clone()),
            "SERIES-PART" | "SERIESPART" | "SERIES_INDEX" => {
                record.series_index = ext.value.parse().ok();
            }
            "LANGUAGE" => record.language = Some(ext.value.clone()),
            "PUBLISHER" => record.publisher = Some(ext.value.clone()),
            _ => {}
        }
    }

    Ok(record)
}

/// `PERFORMER`/`Narrator:`/`Read by:` patterns embedded in a free-text
/// comment frame, as consulted by the assembler's narrator priority chain.
fn extract_from_comment_text(text: &str, record: &mut TagRecord) {
    let lower = text.to_lowercase();
    for marker in ["narrator:", "read by:"] {
        if let Some(idx) = lower.find(marker) {
            let value = text[idx + marker.len()..].trim().to_string();
            if !value.is_empty() && record.narrator.is_none() {
                record.narrator = Some(value);
            }
        }
    }
}
