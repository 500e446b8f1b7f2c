use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Candidate, MetadataSource, ProviderError};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/books/v1";
const DOCUMENT_LIMIT: &str = "5";

/// Book search engine provider: public, no-auth, capped at 5 documents per
/// query (§4.D Provider taxonomy).
pub struct GoogleBooksProvider {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleBooksProvider {
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
        let base = std::env::var("GOOGLE_BOOKS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base)
    }

    async fn query(&self, q: &str) -> Result<Vec<Candidate>, ProviderError> {
        let url = format!("{}/volumes", self.base_url);
        let resp = self
            .client
            .get(url)
            .query(&[("q", q), ("maxResults", DOCUMENT_LIMIT)])
            .send()
            .await
            .map_err(|e| ProviderError::new("googlebooks", e))?
            .json::<VolumesResponse>()
            .await
            .map_err(|e| ProviderError::new("googlebooks", e))?;
        Ok(resp.items.unwrap_or_default().into_iter().map(Item::into_candidate).collect())
    }
}

#[derive(Deserialize)]
struct VolumesResponse {
    items: Option<Vec<Item>>,
}

#[derive(Deserialize)]
struct Item {
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
}

#[derive(Deserialize)]
struct VolumeInfo {
    title: Option<String>,
    authors: Option<Vec<String>>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
    publisher: Option<String>,
    language: Option<String>,
    #[serde(rename = "industryIdentifiers")]
    industry_identifiers: Option<Vec<IndustryIdentifier>>,
}

#[derive(Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

impl Item {
    fn into_candidate(self) -> Candidate {
        let info = self.volume_info;
        let mut isbn10 = None;
        let mut isbn13 = None;
        for id in info.industry_identifiers.unwrap_or_default() {
            match id.kind.as_str() {
                "ISBN_10" => isbn10 = Some(id.identifier),
                "ISBN_13" => isbn13 = Some(id.identifier),
                _ => {}
            }
        }
        // publisher/language ride along on tag-derived fields in this
        // domain; Google Books' copies aren't surfaced on the candidate.
        let _ = (info.publisher, info.language);
        Candidate {
            provider: "googlebooks".into(),
            title: info.title,
            authors: info.authors.unwrap_or_default(),
            year: info.published_date.as_deref().and_then(|d| d.get(0..4)).and_then(|y| y.parse().ok()),
            isbn10,
            isbn13,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MetadataSource for GoogleBooksProvider {
    fn name(&self) -> &'static str {
        "googlebooks"
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<Candidate>, ProviderError> {
        self.query(&format!("intitle:{title}")).await
    }

    async fn search_by_title_and_author(
        &self,
        title: &str,
        author: &str,
    ) -> Result<Vec<Candidate>, ProviderError> {
        self.query(&format!("intitle:{title}+inauthor:{author}")).await
    }

    async fn lookup_by_isbn(&self, isbn: &str) -> Result<Vec<Candidate>, ProviderError> {
        self.query(&format!("isbn:{isbn}")).await
    }
}
