use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Candidate, MetadataSource, ProviderError};

const DEFAULT_BASE_URL: &str = "https://openlibrary.org";

/// Open encyclopedia provider. Consults an optional local dump index before
/// falling back to the network (§4.D Provider taxonomy).
pub struct OpenLibraryProvider {
    client: reqwest::Client,
    base_url: String,
    local_dump: Option<HashMap<String, Candidate>>,
}

impl OpenLibraryProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client builds"),
            base_url: base_url.into(),
            local_dump: None,
        }
    }

    pub fn from_env() -> Self {
        let base = std::env::var("OPENLIBRARY_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base)
    }

    /// Loads a local title-keyed dump so lookups can skip the network
    /// entirely on a hit (§4.D "Optionally consults a local dump index").
    pub fn with_local_dump(mut self, by_title_lower: HashMap<String, Candidate>) -> Self {
        self.local_dump = Some(by_title_lower);
        self
    }

    fn dump_hit(&self, title: &str) -> Option<Candidate> {
        self.local_dump.as_ref()?.get(&title.to_lowercase()).cloned()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    docs: Vec<Doc>,
}

#[derive(Deserialize)]
struct Doc {
    title: Option<String>,
    author_name: Option<Vec<String>>,
    first_publish_year: Option<i32>,
    isbn: Option<Vec<String>>,
    cover_i: Option<i64>,
}

impl Doc {
    fn into_candidate(self) -> Candidate {
        let (isbn10, isbn13) = split_isbns(self.isbn.unwrap_or_default());
        Candidate {
            provider: "openlibrary".into(),
            title: self.title,
            authors: self.author_name.unwrap_or_default(),
            year: self.first_publish_year,
            isbn10,
            isbn13,
            cover_url: self
                .cover_i
                .map(|id| format!("https://covers.openlibrary.org/b/id/{id}-L.jpg")),
            ..Default::default()
        }
    }
}

fn split_isbns(isbns: Vec<String>) -> (Option<String>, Option<String>) {
    let isbn10 = isbns.iter().find(|i| i.len() == 10).cloned();
    let isbn13 = isbns.iter().find(|i| i.len() == 13).cloned();
    (isbn10, isbn13)
}

#[async_trait]
impl MetadataSource for OpenLibraryProvider {
    fn name(&self) -> &'static str {
        "openlibrary"
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<Candidate>, ProviderError> {
        if let Some(hit) = self.dump_hit(title) {
            return Ok(vec![hit]);
        }
        let url = format!("{}/search.json", self.base_url);
        let resp = self
            .client
            .get(url)
            .query(&[("title", title), ("limit", "10")])
            .send()
            .await
            .map_err(|e| ProviderError::new("openlibrary", e))?
            .json::<SearchResponse>()
            .await
            .map_err(|e| ProviderError::new("openlibrary", e))?;
        Ok(resp.docs.into_iter().map(Doc::into_candidate).collect())
    }

    async fn search_by_title_and_author(
        &self,
        title: &str,
        author: &str,
    ) -> Result<Vec<Candidate>, ProviderError> {
        if let Some(hit) = self.dump_hit(title) {
            return Ok(vec![hit]);
        }
        let url = format!("{}/search.json", self.base_url);
        let resp = self
            .client
            .get(url)
            .query(&[("title", title), ("author", author), ("limit", "10")])
            .send()
            .await
            .map_err(|e| ProviderError::new("openlibrary", e))?
            .json::<SearchResponse>()
            .await
            .map_err(|e| ProviderError::new("openlibrary", e))?;
        Ok(resp.docs.into_iter().map(Doc::into_candidate).collect())
    }

    async fn lookup_by_isbn(&self, isbn: &str) -> Result<Vec<Candidate>, ProviderError> {
        let url = format!("{}/search.json", self.base_url);
        let resp = self
            .client
            .get(url)
            .query(&[("isbn", isbn)])
            .send()
            .await
            .map_err(|e| ProviderError::new("openlibrary", e))?
            .json::<SearchResponse>()
            .await
            .map_err(|e| ProviderError::new("openlibrary", e))?;
        Ok(resp.docs.into_iter().map(Doc::into_candidate).collect())
    }
}
