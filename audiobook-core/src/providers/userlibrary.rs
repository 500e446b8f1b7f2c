use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Candidate, MetadataSource, ProviderError, SlidingWindowLimiter};

/// User-library-graph provider. Bearer-token authenticated, rate-limited to
/// 60 requests per rolling minute (§4.D Provider taxonomy). Single-string
/// query only — title and title+author collapse to the same call.
pub struct UserLibraryGraphProvider {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
    limiter: SlidingWindowLimiter,
    /// When the caller is an interactive endpoint rather than an Operation
    /// worker, a full quota skips the provider instead of waiting.
    wait_on_quota: bool,
}

impl UserLibraryGraphProvider {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>, wait_on_quota: bool) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client builds"),
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
            limiter: SlidingWindowLimiter::new(60, Duration::from_secs(60)),
            wait_on_quota,
        }
    }

    async fn query(&self, q: &str) -> Result<Vec<Candidate>, ProviderError> {
        if self.wait_on_quota {
            self.limiter.acquire().await;
        } else if !self.limiter.try_acquire().await {
            return Err(ProviderError::new("userlibrary", "rate limit exhausted"));
        }

        let url = format!("{}/search", self.base_url);
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(&[("q", q)])
            .send()
            .await
            .map_err(|e| ProviderError::new("userlibrary", e))?
            .json::<SearchResponse>()
            .await
            .map_err(|e| ProviderError::new("userlibrary", e))?;
        Ok(resp.results.into_iter().map(Entry::into_candidate).collect())
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<Entry>,
}

#[derive(Deserialize)]
struct Entry {
    title: Option<String>,
    author: Option<String>,
    narrator: Option<String>,
}

impl Entry {
    fn into_candidate(self) -> Candidate {
        Candidate {
            provider: "userlibrary".into(),
            title: self.title,
            authors: self.author.into_iter().collect(),
            narrator: self.narrator,
            ..Default::default()
        }
    }
}

#[async_trait]
impl MetadataSource for UserLibraryGraphProvider {
    fn name(&self) -> &'static str {
        "userlibrary"
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<Candidate>, ProviderError> {
        self.query(title).await
    }

    async fn search_by_title_and_author(
        &self,
        title: &str,
        author: &str,
    ) -> Result<Vec<Candidate>, ProviderError> {
        self.query(&format!("{title} {author}")).await
    }
}
