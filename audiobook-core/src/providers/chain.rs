use super::{score_candidate, Candidate, MetadataSource, ProviderError};

/// Result of running the chain: scored, sorted candidates plus whatever
/// non-fatal provider errors occurred along the way (§4.D failure
/// semantics — transport/decode errors attach the provider name and do not
/// abort the chain).
pub struct ChainOutcome {
    pub candidates: Vec<Candidate>,
    pub errors: Vec<ProviderError>,
}

/// An ordered list of [`MetadataSource`]s configured at startup (§9
/// "Provider plugin set").
pub struct Chain {
    providers: Vec<Box<dyn MetadataSource>>,
}

impl Chain {
    pub fn new(providers: Vec<Box<dyn MetadataSource>>) -> Self {
        Self { providers }
    }

    pub async fn search_by_title(&self, title: &str, author: Option<&str>, isbn: Option<&str>) -> ChainOutcome {
        let mut candidates = Vec::new();
        let mut errors = Vec::new();

        for provider in &self.providers {
            let result = match author {
                Some(author) => provider.search_by_title_and_author(title, author).await,
                None => provider.search_by_title(title).await,
            };
            match result {
                Ok(found) => candidates.extend(found),
                Err(err) => {
                    tracing::warn!(provider = provider.name(), error = %err, "provider search failed");
                    errors.push(err);
                }
            }
        }

        for candidate in &mut candidates {
            candidate.score = score_candidate(candidate, title, author, isbn);
        }
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        // Audio-catalog narrator short-circuits: if it produced any
        // candidate with a narrator, prefer that value on every result
        // (§4.D "short-circuits only when configured per field").
        if let Some(authoritative_narrator) = candidates
            .iter()
            .find(|c| c.provider == "audnexus" && c.narrator.is_some())
            .and_then(|c| c.narrator.clone())
        {
            for candidate in &mut candidates {
                candidate.narrator = Some(authoritative_narrator.clone());
            }
        }

        ChainOutcome { candidates, errors }
    }

    pub async fn lookup_by_isbn(&self, isbn: &str) -> ChainOutcome {
        let mut candidates = Vec::new();
        let mut errors = Vec::new();
        for provider in &self.providers {
            match provider.lookup_by_isbn(isbn).await {
                Ok(found) => candidates.extend(found),
                Err(err) => errors.push(err),
            }
        }
        ChainOutcome { candidates, errors }
    }

    pub async fn lookup_by_asin(&self, asin: &str) -> ChainOutcome {
        let mut candidates = Vec::new();
        let mut errors = Vec::new();
        for provider in &self.providers {
            match provider.lookup_by_asin(asin).await {
                Ok(found) => candidates.extend(found),
                Err(err) => errors.push(err),
            }
        }
        ChainOutcome { candidates, errors }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct AlwaysEmpty;

    #[async_trait]
    impl MetadataSource for AlwaysEmpty {
        fn name(&self) -> &'static str {
            "always-empty"
        }

        async fn search_by_title(&self, _title: &str) -> Result<Vec<Candidate>, ProviderError> {
            Ok(Vec::new())
        }

        async fn search_by_title_and_author(
            &self,
            _title: &str,
            _author: &str,
        ) -> Result<Vec<Candidate>, ProviderError> {
            Ok(Vec::new())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl MetadataSource for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }

        async fn search_by_title(&self, _title: &str) -> Result<Vec<Candidate>, ProviderError> {
            Err(ProviderError::new("always-fails", "offline"))
        }

        async fn search_by_title_and_author(
            &self,
            _title: &str,
            _author: &str,
        ) -> Result<Vec<Candidate>, ProviderError> {
            Err(ProviderError::new("always-fails", "offline"))
        }
    }

    #[tokio::test]
    async fn all_providers_offline_returns_empty_not_hang() {
        let chain = Chain::new(vec![Box::new(AlwaysFails), Box::new(AlwaysEmpty)]);
        let outcome = chain.search_by_title("Anything", None, None).await;
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }
}
