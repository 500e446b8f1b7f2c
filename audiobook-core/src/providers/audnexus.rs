use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Candidate, MetadataSource, ProviderError};

const DEFAULT_BASE_URL: &str = "https://api.audnex.us";

/// Audio catalog provider. Has no title-search endpoint (§4.D): title-only
/// queries return empty, narrator comes through ASIN/author lookups, and
/// its narrator field always wins the chain's short-circuit rule.
pub struct AudnexusProvider {
    client: reqwest::Client,
    base_url: String,
}

impl AudnexusProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client builds"),
            base_url: base_url.into(),
        }
    }

    pub fn from_env() -> Self {
        let base = std::env::var("AUDNEXUS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base)
    }
}

#[derive(Deserialize)]
struct Book {
    title: Option<String>,
    authors: Option<Vec<NamedEntity>>,
    narrators: Option<Vec<NamedEntity>>,
    #[serde(rename = "seriesPrimary")]
    series_primary: Option<SeriesInfo>,
    #[serde(rename = "releaseDate")]
    release_date: Option<String>,
    isbn: Option<String>,
}

#[derive(Deserialize)]
struct NamedEntity {
    name: String,
}

#[derive(Deserialize)]
struct SeriesInfo {
    name: Option<String>,
    position: Option<String>,
}

impl Book {
    fn into_candidate(self) -> Candidate {
        Candidate {
            provider: "audnexus".into(),
            title: self.title,
            authors: self.authors.unwrap_or_default().into_iter().map(|a| a.name).collect(),
            narrator: self.narrators.and_then(|n| n.into_iter().next()).map(|n| n.name),
            series: self.series_primary.as_ref().and_then(|s| s.name.clone()),
            series_position: self
                .series_primary
                .and_then(|s| s.position)
                .and_then(|p| p.parse().ok()),
            year: self.release_date.as_deref().and_then(|d| d.get(0..4)).and_then(|y| y.parse().ok()),
            isbn13: self.isbn,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MetadataSource for AudnexusProvider {
    fn name(&self) -> &'static str {
        "audnexus"
    }

    async fn search_by_title(&self, _title: &str) -> Result<Vec<Candidate>, ProviderError> {
        Ok(Vec::new())
    }

    async fn search_by_title_and_author(
        &self,
        _title: &str,
        author: &str,
    ) -> Result<Vec<Candidate>, ProviderError> {
        let url = format!("{}/authors", self.base_url);
        let resp = self
            .client
            .get(url)
            .query(&[("name", author)])
            .send()
            .await
            .map_err(|e| ProviderError::new("audnexus", e))?
            .json::<Vec<Book>>()
            .await
            .map_err(|e| ProviderError::new("audnexus", e))?;
        Ok(resp.into_iter().map(Book::into_candidate).collect())
    }

    async fn lookup_by_asin(&self, asin: &str) -> Result<Vec<Candidate>, ProviderError> {
        let url = format!("{}/books/{asin}", self.base_url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::new("audnexus", e))?
            .json::<Book>()
            .await
            .map_err(|e| ProviderError::new("audnexus", e))?;
        Ok(vec![resp.into_candidate()])
    }
}
