use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::source::{FetchContext, FetchResult, Source, SourceError};

/// Runs every registered source concurrently for one digest run.
pub struct Aggregator {
    sources: Vec<Arc<dyn Source>>,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn fetch_all(&self, ctx: &FetchContext) -> Vec<FetchResult> {
        fetch_all(ctx, &self.sources).await
    }
}

/// Spawn one task per input and wait for all of them.
///
/// Output slot `i` always holds the outcome of input `i`, whatever order the
/// tasks finish in. A panicking task is reported as [`SourceError::Task`] in
/// its own slot and does not disturb the others.
pub async fn fan_out<I, F, Fut, T>(inputs: I, task: F) -> Vec<Result<T, SourceError>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, SourceError>> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = inputs.into_iter().map(task).map(tokio::spawn).collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap_or_else(|e| Err(SourceError::Task(e.to_string()))))
        .collect()
}

/// Fetch every source under the shared deadline in `ctx`.
///
/// Returns exactly one [`FetchResult`] per source, in registration order.
pub async fn fetch_all(ctx: &FetchContext, sources: &[Arc<dyn Source>]) -> Vec<FetchResult> {
    let ctx = *ctx;

    let outcomes = fan_out(sources.iter().cloned(), move |source| async move {
        info!(source = source.name(), "Fetching");
        let outcome = ctx.run(source.fetch(&ctx)).await;
        match &outcome {
            Ok(_) => info!(source = source.name(), "Fetched successfully"),
            Err(e) => warn!(source = source.name(), error = %e, "Fetch failed"),
        }
        outcome
    })
    .await;

    sources
        .iter()
        .zip(outcomes)
        .map(|(source, outcome)| FetchResult::new(source.name(), outcome))
        .collect()
}
