//! Sequential second phase that runs after the aggregator has finished.
//!
//! A query-parameterized source reads a topic out of another source's result
//! and uses it as its query, falling back to a fixed query when the topic is
//! missing or the topic query fails.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::source::{FetchContext, FetchResult, SourceData, SourceError};

pub const DEFAULT_TOPIC_SOURCE: &str = "Readwise";
pub const DEFAULT_FALLBACK_QUERY: &str = "nature";

/// A source whose fetch is driven by a caller-supplied query.
#[async_trait]
pub trait QuerySource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_query(&self, ctx: &FetchContext, query: &str)
        -> Result<SourceData, SourceError>;
}

pub struct Enrichment {
    source: Arc<dyn QuerySource>,
    topic_source: String,
    fallback_query: String,
}

impl Enrichment {
    pub fn new(
        source: Arc<dyn QuerySource>,
        topic_source: impl Into<String>,
        fallback_query: impl Into<String>,
    ) -> Self {
        Self {
            source,
            topic_source: topic_source.into(),
            fallback_query: fallback_query.into(),
        }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn topic_source(&self) -> &str {
        &self.topic_source
    }

    /// Fetch once with the best available query and append the outcome.
    ///
    /// Always returns `results` with exactly one extra entry at the end, even
    /// when both the topic query and the fallback fail.
    pub async fn apply(&self, ctx: &FetchContext, mut results: Vec<FetchResult>) -> Vec<FetchResult> {
        let outcome = match find_topic(&results, &self.topic_source) {
            Some(topic) => {
                info!(source = self.name(), topic = %topic, "Querying with topic");
                match ctx.run(self.source.fetch_query(ctx, &topic)).await {
                    Ok(data) => Ok(data),
                    Err(e) => {
                        warn!(source = self.name(), topic = %topic, error = %e, "Topic query failed, using fallback");
                        self.fetch_fallback(ctx).await
                    }
                }
            }
            None => {
                debug!(source = self.name(), topic_source = %self.topic_source, "No topic available");
                self.fetch_fallback(ctx).await
            }
        };

        if let Err(e) = &outcome {
            warn!(source = self.name(), error = %e, "Enrichment failed");
        }

        results.push(FetchResult::new(self.name(), outcome));
        results
    }

    async fn fetch_fallback(&self, ctx: &FetchContext) -> Result<SourceData, SourceError> {
        ctx.run(self.source.fetch_query(ctx, &self.fallback_query))
            .await
    }
}

/// Book title of the first highlight from the named source, if it succeeded.
pub fn find_topic(results: &[FetchResult], topic_source: &str) -> Option<String> {
    results
        .iter()
        .filter(|r| r.name == topic_source)
        .find_map(|r| match r.data()? {
            SourceData::Highlights(highlights) => highlights
                .first()
                .map(|h| h.book_title.trim())
                .filter(|title| !title.is_empty())
                .map(str::to_string),
            _ => None,
        })
}
