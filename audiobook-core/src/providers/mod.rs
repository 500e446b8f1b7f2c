//! Provider Clients & Chain (component §4.D).

mod audnexus;
mod chain;
mod googlebooks;
mod openlibrary;
mod rate_limit;
mod userlibrary;

pub use chain::{Chain, ChainOutcome};
pub use rate_limit::SlidingWindowLimiter;

pub use audnexus::AudnexusProvider;
pub use googlebooks::GoogleBooksProvider;
pub use openlibrary::OpenLibraryProvider;
pub use userlibrary::UserLibraryGraphProvider;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("provider {provider}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self { provider: provider.into(), message: message.to_string() }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Candidate {
    pub provider: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub narrator: Option<String>,
    pub series: Option<String>,
    pub series_position: Option<f32>,
    pub year: Option<i32>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub cover_url: Option<String>,
    pub score: f32,
}

/// A pluggable bibliographic source (§9 "Provider plugin set" — a value
/// satisfying this capability set, not a union type switched on kind).
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search_by_title(&self, title: &str) -> Result<Vec<Candidate>, ProviderError>;

    async fn search_by_title_and_author(
        &self,
        title: &str,
        author: &str,
    ) -> Result<Vec<Candidate>, ProviderError>;

    async fn lookup_by_isbn(&self, _isbn: &str) -> Result<Vec<Candidate>, ProviderError> {
        Ok(Vec::new())
    }

    async fn lookup_by_asin(&self, _asin: &str) -> Result<Vec<Candidate>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Blends normalized Levenshtein on title, a case-insensitive author match,
/// and an ISBN-equality boost into a `[0,1]` similarity score (§4.D
/// Scoring).
pub fn score_candidate(
    candidate: &Candidate,
    query_title: &str,
    query_author: Option<&str>,
    query_isbn: Option<&str>,
) -> f32 {
    let title_score = match &candidate.title {
        Some(t) => strsim::normalized_levenshtein(&t.to_lowercase(), &query_title.to_lowercase()) as f32,
        None => 0.0,
    };

    let author_score = match query_author {
        Some(query) => {
            let query = query.to_lowercase();
            if candidate.authors.iter().any(|a| a.to_lowercase() == query) {
                1.0
            } else {
                0.0
            }
        }
        None => 0.0,
    };

    let isbn_boost = match query_isbn {
        Some(query) => {
            let matches = candidate.isbn10.as_deref() == Some(query)
                || candidate.isbn13.as_deref() == Some(query);
            if matches {
                0.25
            } else {
                0.0
            }
        }
        None => 0.0,
    };

    (title_score * 0.6 + author_score * 0.25 + isbn_boost).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_title_and_author_scores_high() {
        let candidate = Candidate {
            title: Some("The Long Cosmos".into()),
            authors: vec!["Terry Pratchett".into()],
            ..Default::default()
        };
        let score = score_candidate(&candidate, "The Long Cosmos", Some("Terry Pratchett"), None);
        assert!(score > 0.8, "expected high score, got {score}");
    }

    #[test]
    fn isbn_match_boosts_score() {
        let candidate = Candidate {
            title: Some("Completely Different".into()),
            isbn13: Some("9780552167202".into()),
            ..Default::default()
        };
        let with_isbn = score_candidate(&candidate, "Wrong Title", None, Some("9780552167202"));
        let without_isbn = score_candidate(&candidate, "Wrong Title", None, None);
        assert!(with_isbn > without_isbn);
    }
}
