//! Directory/filename parsing into candidate metadata fields (component §4.C).
//!
//! Built on `regex` + `once_cell`, the same pairing `ferrex-core` uses for
//! its own path-derived heuristics.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Confidence {
    None,
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Default)]
pub struct FolderMetadata {
    pub title: Option<String>,
    pub title_confidence: Option<Confidence>,
    pub authors: Vec<String>,
    pub authors_confidence: Option<Confidence>,
    pub series: Option<String>,
    pub series_confidence: Option<Confidence>,
    pub series_position: Option<f32>,
    pub series_position_confidence: Option<Confidence>,
    pub narrator: Option<String>,
    pub narrator_confidence: Option<Confidence>,
}

static INNERMOST_NARRATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<rest>.+?)\s*-\s*(?:read by|narrated by|narrator:)\s*(?P<narrator>.+)$")
        .unwrap()
});

static INNERMOST_TITLE_AUTHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<title>.+?)\s*-\s*(?P<author>.+)$").unwrap());

static SERIES_WITH_POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\((?P<series>.+?)\s+(?P<position>\d+(?:\.\d+)?)\)\s*(?P<title>.+)$").unwrap());

static SERIES_NO_POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\((?P<series>.+?)\)\s*(?P<title>.+)$").unwrap());

static GENERIC_PART_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d+\s+part\s+\d+\s+of\s+\d+").unwrap());

static LEADING_TRACK_NUMBER_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}$").unwrap());

/// Walks up to four directory levels above `file_path`, innermost first,
/// applying the ordered patterns from §4.C.
pub fn parse(file_path: &str) -> FolderMetadata {
    let path = std::path::Path::new(file_path);
    let mut segments: Vec<String> = path
        .ancestors()
        .skip(1)
        .filter_map(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .take(4)
        .collect();

    let mut meta = FolderMetadata::default();

    if segments.is_empty() {
        return meta;
    }

    let innermost = segments.remove(0);
    apply_innermost(&innermost, &mut meta);

    if let Some(second) = segments.first() {
        apply_series_segment(second, &mut meta);
    }

    for outer in segments.iter().skip(1) {
        if meta.authors.is_empty() {
            apply_author_segment(outer, &mut meta);
        }
    }

    meta
}

fn apply_innermost(segment: &str, meta: &mut FolderMetadata) {
    if let Some(caps) = INNERMOST_NARRATOR.captures(segment) {
        let narrator = caps["narrator"].trim().to_string();
        meta.narrator = Some(narrator);
        meta.narrator_confidence = Some(Confidence::High);

        let rest = caps["rest"].trim();
        apply_title_author(rest, meta);
    } else {
        apply_title_author(segment, meta);
    }
}

fn apply_title_author(segment: &str, meta: &mut FolderMetadata) {
    if let Some(caps) = SERIES_WITH_POSITION.captures(segment) {
        meta.series = Some(caps["series"].trim().to_string());
        meta.series_confidence = Some(Confidence::High);
        meta.series_position = caps["position"].parse().ok();
        meta.series_position_confidence = Some(Confidence::High);
        apply_title_author(caps["title"].trim(), meta);
        return;
    }

    if let Some(caps) = INNERMOST_TITLE_AUTHOR.captures(segment) {
        meta.title = Some(caps["title"].trim().to_string());
        meta.title_confidence = Some(Confidence::Medium);
        apply_author_segment(caps["author"].trim(), meta);
    } else {
        meta.title = Some(segment.trim().to_string());
        meta.title_confidence = Some(Confidence::Low);
    }
}

fn apply_series_segment(segment: &str, meta: &mut FolderMetadata) {
    if let Some(caps) = SERIES_WITH_POSITION.captures(segment) {
        if meta.series.is_none() {
            meta.series = Some(caps["series"].trim().to_string());
            meta.series_confidence = Some(Confidence::High);
            meta.series_position = caps["position"].parse().ok();
            meta.series_position_confidence = Some(Confidence::High);
        }
        if meta.title.is_none() {
            meta.title = Some(caps["title"].trim().to_string());
            meta.title_confidence = Some(Confidence::Medium);
        }
    } else if let Some(caps) = SERIES_NO_POSITION.captures(segment) {
        if meta.series.is_none() {
            meta.series = Some(caps["series"].trim().to_string());
            meta.series_confidence = Some(Confidence::Medium);
        }
    }
}

fn apply_author_segment(segment: &str, meta: &mut FolderMetadata) {
    let authors: Vec<String> = segment
        .split(['&', ';'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if !authors.is_empty() {
        meta.authors = authors;
        meta.authors_confidence = Some(Confidence::High);
    }
}

/// Generic filenames (`01 Part 1 of 67`, bare track numbers) carry no title
/// signal and must be suppressed in favour of folder-derived titles.
pub fn is_generic_part_filename(stem: &str) -> bool {
    GENERIC_PART_FILENAME.is_match(stem) || LEADING_TRACK_NUMBER_ONLY.is_match(stem.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_structured_long_earth_path() {
        let path = "/lib/Terry Pratchett & Stephen Baxter/(Long Earth 05) The Long Cosmos/(Long Earth 05) The Long Cosmos - Terry Pratchett & Stephen Baxter - read by Michael Fenton Stevens/01.mp3";
        let meta = parse(path);
        assert_eq!(meta.title.as_deref(), Some("The Long Cosmos"));
        assert_eq!(
            meta.authors,
            vec!["Terry Pratchett".to_string(), "Stephen Baxter".to_string()]
        );
        assert_eq!(meta.series.as_deref(), Some("Long Earth"));
        assert_eq!(meta.series_position, Some(5.0));
        assert_eq!(meta.narrator.as_deref(), Some("Michael Fenton Stevens"));
    }

    #[test]
    fn generic_part_filename_detected() {
        assert!(is_generic_part_filename("01 Part 1 of 67"));
        assert!(is_generic_part_filename("003"));
        assert!(!is_generic_part_filename("The Long Cosmos"));
    }

    #[test]
    fn series_position_accepts_decimal() {
        let meta = parse("/lib/Author/(Series 5.1) Title/file.mp3");
        assert_eq!(meta.series_position, Some(5.1));
    }
}
