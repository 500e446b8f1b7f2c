//! Bulk metadata re-fetch (`OperationType::BulkFetch`, §6 "Metadata": `POST
//! /metadata/bulk-fetch`): walks every non-deleted Book, re-queries the
//! provider chain, and applies whatever fields aren't locked — the same
//! per-field locking discipline `Scanner::apply_assembled` /
//! `upsert_field_state` use, generalized from "new book at import time" to
//! "existing book, already-cataloged".

use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::{StaleWriteGuard, Store};
use crate::error::Result;
use crate::event_hub::{Event, EventHub};
use crate::orchestration::{OperationContext, OperationHandler};
use crate::providers::{Candidate, Chain};
use crate::types::{Book, LogLevel, MetadataFieldState};

const PAGE_SIZE: usize = 200;

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct BulkFetchParams {}

pub struct BulkFetchHandler {
    store: Arc<dyn Store>,
    hub: Arc<EventHub>,
    chain: Arc<Chain>,
}

impl BulkFetchHandler {
    pub fn new(store: Arc<dyn Store>, hub: Arc<EventHub>, chain: Arc<Chain>) -> Self {
        Self { store, hub, chain }
    }
}

#[async_trait::async_trait]
impl OperationHandler for BulkFetchHandler {
    async fn run(&self, ctx: &mut OperationContext) -> Result<()> {
        let total = self.store.count_books().await?;
        let mut done = 0u64;
        let mut updated_books = 0u64;
        let mut offset = 0usize;

        loop {
            if ctx.is_canceled() {
                return Err(crate::error::CoreError::Canceled);
            }

            let page = self.store.list_books(PAGE_SIZE, offset).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();

            for book in page {
                if ctx.is_canceled() {
                    return Err(crate::error::CoreError::Canceled);
                }
                if book.is_deleted() {
                    done += 1;
                    continue;
                }

                let applied = self.refetch_one(&book).await?;
                if !applied.is_empty() {
                    updated_books += 1;
                    ctx.log_detail(
                        LogLevel::Info,
                        format!("updated book {}", book.id),
                        serde_json::json!({ "applied_fields": applied }),
                    )
                    .await?;
                }

                done += 1;
                ctx.report(done, total, format!("re-fetched {done}/{total} books")).await?;
            }
        }

        ctx.report(done, total, format!("bulk fetch complete: {updated_books} books updated")).await
    }
}

impl BulkFetchHandler {
    async fn refetch_one(&self, book: &Book) -> Result<Vec<String>> {
        let outcome = self.chain.search_by_title(&book.title, None, book.isbn13.as_deref()).await;
        let Some(candidate) = outcome.candidates.first() else {
            return Ok(Vec::new());
        };

        let existing_states = self.store.get_metadata_field_states(&book.id).await?;
        let locked: HashSet<&str> = existing_states.iter().filter(|s| s.locked).map(|s| s.field.as_str()).collect();

        let mut book = book.clone();
        let mut applied = Vec::new();
        let now = chrono::Utc::now();

        for field in ["title", "narrator", "series_position", "year", "isbn", "authors", "series"] {
            if locked.contains(field) {
                continue;
            }
            let changed = self.apply_field(&mut book, field, candidate).await?;
            if changed {
                applied.push(field.to_string());
                self.store
                    .upsert_metadata_field_state(MetadataFieldState {
                        book_id: book.id.clone(),
                        field: field.to_string(),
                        source: candidate.provider.clone(),
                        fetched_value: candidate_field_value(candidate, field),
                        override_value: None,
                        locked: false,
                        updated_at: now,
                    })
                    .await?;
            }
        }

        if applied.is_empty() {
            return Ok(applied);
        }

        let guard = StaleWriteGuard { expected_updated_at: book.updated_at };
        book.updated_at = now;
        let saved = self.store.update_book(&book.id.clone(), book, Some(guard)).await?;
        self.hub.publish(Event::LibraryChanged { book_id: saved.id.to_string() });
        Ok(applied)
    }

    async fn apply_field(&self, book: &mut Book, field: &str, candidate: &Candidate) -> Result<bool> {
        Ok(match field {
            "title" => match &candidate.title {
                Some(v) if *v != book.title => {
                    book.title = v.clone();
                    true
                }
                _ => false,
            },
            "narrator" => replace_if_different(&mut book.narrator, &candidate.narrator),
            "year" => replace_if_different(&mut book.year, &candidate.year),
            "series_position" => replace_if_different(&mut book.series_position, &candidate.series_position),
            "isbn" => {
                let isbn13_changed = replace_if_different(&mut book.isbn13, &candidate.isbn13);
                let isbn10_changed = replace_if_different(&mut book.isbn10, &candidate.isbn10);
                isbn13_changed || isbn10_changed
            }
            "authors" => match candidate.authors.first() {
                Some(name) => {
                    let author = self.store.find_or_create_author(name).await?;
                    if book.author_id != Some(author.id) {
                        book.author_id = Some(author.id);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            },
            "series" => match &candidate.series {
                Some(name) => {
                    let series = self.store.find_or_create_series(name, book.author_id).await?;
                    if book.series_id != Some(series.id) {
                        book.series_id = Some(series.id);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            },
            _ => false,
        })
    }
}

fn replace_if_different<T: Clone + PartialEq>(target: &mut Option<T>, candidate: &Option<T>) -> bool {
    match candidate {
        Some(v) if target.as_ref() != Some(v) => {
            *target = Some(v.clone());
            true
        }
        _ => false,
    }
}

fn candidate_field_value(candidate: &Candidate, field: &str) -> Option<String> {
    match field {
        "title" => candidate.title.clone(),
        "narrator" => candidate.narrator.clone(),
        "series" => candidate.series.clone(),
        "series_position" => candidate.series_position.map(|p| p.to_string()),
        "year" => candidate.year.map(|y| y.to_string()),
        "isbn" => candidate.isbn13.clone().or_else(|| candidate.isbn10.clone()),
        "authors" => candidate.authors.first().cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryStore;
    use crate::providers::MetadataSource;
    use crate::types::OperationId;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct StubProvider;

    #[async_trait]
    impl MetadataSource for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn search_by_title(&self, _title: &str) -> std::result::Result<Vec<Candidate>, crate::providers::ProviderError> {
            Ok(vec![Candidate {
                provider: "stub".into(),
                title: Some("New Title".into()),
                narrator: Some("New Narrator".into()),
                score: 1.0,
                ..Default::default()
            }])
        }

        async fn search_by_title_and_author(
            &self,
            title: &str,
            _author: &str,
        ) -> std::result::Result<Vec<Candidate>, crate::providers::ProviderError> {
            self.search_by_title(title).await
        }
    }

    #[tokio::test]
    async fn locked_title_survives_bulk_fetch_unlocked_narrator_changes() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let hub = Arc::new(EventHub::new());
        let chain = Arc::new(Chain::new(vec![Box::new(StubProvider)]));

        let mut book = Book::new("/lib/book.mp3");
        book.title = "Locked Title".into();
        let book = store.create_book(book).await.unwrap();
        store
            .upsert_metadata_field_state(MetadataFieldState {
                book_id: book.id.clone(),
                field: "title".into(),
                source: "override".into(),
                fetched_value: None,
                override_value: Some("Locked Title".into()),
                locked: true,
                updated_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let handler = BulkFetchHandler::new(Arc::clone(&store), hub.clone(), chain);
        let mut ctx = OperationContext::new(OperationId::new(), Arc::clone(&store), hub, CancellationToken::new(), vec![]);
        handler.run(&mut ctx).await.unwrap();

        let reloaded = store.get_book(&book.id).await.unwrap();
        assert_eq!(reloaded.title, "Locked Title");
        assert_eq!(reloaded.narrator.as_deref(), Some("New Narrator"));
    }
}
