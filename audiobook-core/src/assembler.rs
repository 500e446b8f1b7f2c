//! Metadata Assembler (component §4.E): priority-resolves tag/folder/
//! provider inputs into a single record with per-field provenance.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::folder_parser::{self, FolderMetadata};
use crate::providers::Candidate;
use crate::tags::TagRecord;
use crate::types::MetadataFieldState;

#[derive(Clone, Debug, Default)]
pub struct AssembledField<T> {
    pub value: Option<T>,
    pub source: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct AssembledBook {
    pub title: AssembledField<String>,
    pub authors: AssembledField<Vec<String>>,
    pub series: AssembledField<String>,
    pub series_position: AssembledField<f32>,
    pub narrator: AssembledField<String>,
    pub year: AssembledField<i32>,
    pub isbn: AssembledField<String>,
    pub language: AssembledField<String>,
    pub publisher: AssembledField<String>,
}

static VOLUME_ROMAN_OR_ARABIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:book|volume|vol\.?)\s+(?P<num>[ivxlcdm]+|\d+(?:\.\d+)?)\b").unwrap()
});

/// Locked fields from a prior assembly pass that must survive untouched.
pub struct LockedFields<'a> {
    states: HashMap<&'a str, &'a MetadataFieldState>,
}

impl<'a> LockedFields<'a> {
    pub fn new(states: &'a [MetadataFieldState]) -> Self {
        Self { states: states.iter().map(|s| (s.field.as_str(), s)).collect() }
    }

    fn is_locked(&self, field: &str) -> bool {
        self.states.get(field).map(|s| s.locked).unwrap_or(false)
    }

    fn override_value(&self, field: &str) -> Option<&str> {
        self.states.get(field).and_then(|s| s.override_value.as_deref())
    }
}

/// Assembles a record from tag, folder and (optional) provider inputs,
/// honouring field locks (§4.E lock semantics: `locked=true` blocks every
/// automated source; an explicit override still applies).
pub fn assemble(
    tag: &TagRecord,
    folder_path: &str,
    candidates: &[Candidate],
    locks: &LockedFields,
) -> AssembledBook {
    let folder = folder_parser::parse(folder_path);
    let mut book = AssembledBook::default();

    assemble_title(tag, &folder, folder_path, &folder_is_generic_filename(folder_path), &mut book, locks);
    assemble_authors(tag, &folder, &mut book, locks);
    assemble_series(tag, &folder, &mut book, locks);
    let title_snapshot = book.title.value.clone();
    assemble_series_position(tag, &folder, title_snapshot.as_deref(), &mut book.series_position, locks);
    assemble_narrator(tag, &folder, &mut book, locks);
    assemble_year(tag, &mut book, locks);
    assemble_direct_tag_fields(tag, &mut book, locks);

    if let Some(top) = candidates.first() {
        apply_provider_candidate(top, &mut book, locks);
    }

    book
}

fn folder_is_generic_filename(path: &str) -> bool {
    let stem = std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    folder_parser::is_generic_part_filename(&stem)
}

fn set_field<T: Clone>(field: &mut AssembledField<T>, locks: &LockedFields, key: &str, value: T, source: &str) {
    if locks.is_locked(key) {
        return;
    }
    field.value = Some(value);
    field.source = Some(source.to_string());
}

fn assemble_title(
    tag: &TagRecord,
    folder: &FolderMetadata,
    file_path: &str,
    filename_is_generic: &bool,
    book: &mut AssembledBook,
    locks: &LockedFields,
) {
    if let Some(over) = locks.override_value("title") {
        book.title = AssembledField { value: Some(over.to_string()), source: Some("override".into()) };
        return;
    }
    if let Some(title) = &tag.title {
        if !folder_parser::is_generic_part_filename(title) {
            set_field(&mut book.title, locks, "title", title.clone(), "tag.Title");
            return;
        }
    }
    if let Some(title) = &folder.title {
        set_field(&mut book.title, locks, "title", title.clone(), "folder.Title");
        return;
    }
    if !*filename_is_generic {
        let stem = std::path::Path::new(file_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        set_field(&mut book.title, locks, "title", stem, "filename stem");
    }
}

fn assemble_authors(tag: &TagRecord, folder: &FolderMetadata, book: &mut AssembledBook, locks: &LockedFields) {
    if let Some(over) = locks.override_value("authors") {
        book.authors = AssembledField {
            value: Some(over.split(',').map(|s| s.trim().to_string()).collect()),
            source: Some("override".into()),
        };
        return;
    }
    if let Some(composer) = &tag.composer {
        set_field(&mut book.authors, locks, "authors", vec![composer.clone()], "tag.Composer");
        return;
    }
    if let Some(album_artist) = &tag.album_artist {
        set_field(&mut book.authors, locks, "authors", vec![album_artist.clone()], "tag.AlbumArtist");
        return;
    }
    if let Some(artist) = &tag.artist {
        set_field(&mut book.authors, locks, "authors", vec![artist.clone()], "tag.Artist");
        return;
    }
    if !folder.authors.is_empty() {
        set_field(&mut book.authors, locks, "authors", folder.authors.clone(), "folder.Authors");
    }
}

fn assemble_series(tag: &TagRecord, folder: &FolderMetadata, book: &mut AssembledBook, locks: &LockedFields) {
    if let Some(over) = locks.override_value("series") {
        book.series = AssembledField { value: Some(over.to_string()), source: Some("override".into()) };
        return;
    }
    if let Some(series) = &tag.series {
        set_field(&mut book.series, locks, "series", series.clone(), "tag.Series");
        return;
    }
    if let (Some(album), Some(folder_series)) = (&tag.album, &folder.series) {
        if album == folder_series {
            set_field(&mut book.series, locks, "series", album.clone(), "folder.Series(album-confirmed)");
            return;
        }
    }
    if let Some(series) = &folder.series {
        set_field(&mut book.series, locks, "series", series.clone(), "folder.Series");
    }
}

fn assemble_series_position(
    tag: &TagRecord,
    folder: &FolderMetadata,
    title_snapshot: Option<&str>,
    field: &mut AssembledField<f32>,
    locks: &LockedFields,
) {
    if let Some(over) = locks.override_value("series_position") {
        field.value = over.parse().ok();
        field.source = Some("override".into());
        return;
    }
    if let Some(idx) = tag.series_index {
        set_field(field, locks, "series_position", idx, "tag.SeriesIndex");
        return;
    }
    if let Some(pos) = folder.series_position {
        set_field(field, locks, "series_position", pos, "folder position");
        return;
    }
    let haystack = [title_snapshot, tag.album.as_deref(), tag.comment.as_deref()];
    for text in haystack.into_iter().flatten() {
        if let Some(caps) = VOLUME_ROMAN_OR_ARABIC.captures(text) {
            if let Some(num) = parse_volume_number(&caps["num"]) {
                set_field(field, locks, "series_position", num, "volume number detected in title/album/comment");
                return;
            }
        }
    }
}

fn parse_volume_number(raw: &str) -> Option<f32> {
    if let Ok(n) = raw.parse::<f32>() {
        return Some(n);
    }
    roman_to_u32(raw).map(|n| n as f32)
}

fn roman_to_u32(s: &str) -> Option<u32> {
    let values = |c: char| -> Option<u32> {
        match c.to_ascii_uppercase() {
            'I' => Some(1),
            'V' => Some(5),
            'X' => Some(10),
            'L' => Some(50),
            'C' => Some(100),
            'D' => Some(500),
            'M' => Some(1000),
            _ => None,
        }
    };
    let digits: Vec<u32> = s.chars().map(values).collect::<Option<Vec<_>>>()?;
    if digits.is_empty() {
        return None;
    }
    let mut total = 0i64;
    for i in 0..digits.len() {
        let current = digits[i] as i64;
        let next = digits.get(i + 1).copied().unwrap_or(0) as i64;
        if current < next {
            total -= current;
        } else {
            total += current;
        }
    }
    u32::try_from(total).ok()
}

fn assemble_narrator(tag: &TagRecord, folder: &FolderMetadata, book: &mut AssembledBook, locks: &LockedFields) {
    if let Some(over) = locks.override_value("narrator") {
        book.narrator = AssembledField { value: Some(over.to_string()), source: Some("override".into()) };
        return;
    }
    if let Some(narrator) = &tag.narrator {
        set_field(&mut book.narrator, locks, "narrator", narrator.clone(), "tag.Narrator");
        return;
    }
    if let Some(performer) = &tag.performer {
        set_field(&mut book.narrator, locks, "narrator", performer.clone(), "tag.Performer");
        return;
    }
    if let Some(narrator) = &folder.narrator {
        set_field(&mut book.narrator, locks, "narrator", narrator.clone(), "folder.Narrator");
        return;
    }
    if let Some(comment) = &tag.comment {
        for marker in ["Narrator:", "Read by:"] {
            if let Some(idx) = comment.to_lowercase().find(&marker.to_lowercase()) {
                let value = comment[idx + marker.len()..].trim().to_string();
                if !value.is_empty() {
                    set_field(&mut book.narrator, locks, "narrator", value, "comment-field extraction");
                    return;
                }
            }
        }
    }
}

fn assemble_year(tag: &TagRecord, book: &mut AssembledBook, locks: &LockedFields) {
    if let Some(over) = locks.override_value("year") {
        book.year = AssembledField { value: over.parse().ok(), source: Some("override".into()) };
        return;
    }
    if let Some(year) = tag.year {
        set_field(&mut book.year, locks, "year", year, "tag.Year");
    }
}

fn assemble_direct_tag_fields(tag: &TagRecord, book: &mut AssembledBook, locks: &LockedFields) {
    if let Some(isbn) = &tag.isbn {
        set_field(&mut book.isbn, locks, "isbn", isbn.clone(), "tag.ISBN");
    }
    if let Some(language) = &tag.language {
        set_field(&mut book.language, locks, "language", language.clone(), "tag.Language");
    }
    if let Some(publisher) = &tag.publisher {
        set_field(&mut book.publisher, locks, "publisher", publisher.clone(), "tag.Publisher");
    }
}

fn apply_provider_candidate(candidate: &Candidate, book: &mut AssembledBook, locks: &LockedFields) {
    let source = format!("provider:{}", candidate.provider);
    if book.title.value.is_none() {
        if let Some(title) = &candidate.title {
            set_field(&mut book.title, locks, "title", title.clone(), &source);
        }
    }
    if book.authors.value.is_none() && !candidate.authors.is_empty() {
        set_field(&mut book.authors, locks, "authors", candidate.authors.clone(), &source);
    }
    if let Some(narrator) = &candidate.narrator {
        set_field(&mut book.narrator, locks, "narrator", narrator.clone(), &source);
    }
    if book.series.value.is_none() {
        if let Some(series) = &candidate.series {
            set_field(&mut book.series, locks, "series", series.clone(), &source);
        }
    }
    if book.year.value.is_none() {
        if let Some(year) = candidate.year {
            set_field(&mut book.year, locks, "year", year, &source);
        }
    }
    if book.isbn.value.is_none() {
        if let Some(isbn) = candidate.isbn13.clone().or_else(|| candidate.isbn10.clone()) {
            set_field(&mut book.isbn, locks, "isbn", isbn, &source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn locked_title_survives_provider_candidate() {
        let tag = TagRecord::default();
        let locked_state = MetadataFieldState {
            book_id: crate::types::BookId::new(),
            field: "title".into(),
            source: "override".into(),
            fetched_value: None,
            override_value: Some("My Custom Title".into()),
            locked: true,
            updated_at: Utc::now(),
        };
        let locks = LockedFields::new(std::slice::from_ref(&locked_state));
        let candidate = Candidate { title: Some("Provider Title".into()), ..Default::default() };

        let assembled = assemble(&tag, "/lib/Author/Title/file.mp3", &[candidate], &locks);
        assert_eq!(assembled.title.value.as_deref(), Some("My Custom Title"));
        assert_eq!(assembled.title.source.as_deref(), Some("override"));
    }

    #[test]
    fn series_position_accepts_roman_numerals() {
        let mut tag = TagRecord::default();
        tag.album = Some("Some Series Book IV".into());
        let locks = LockedFields::new(&[]);
        let assembled = assemble(&tag, "/lib/x/y.mp3", &[], &locks);
        assert_eq!(assembled.series_position.value, Some(4.0));
    }
}
