use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::sources::hackernews::HnPost;
use crate::sources::nitter::NitterPost;
use crate::sources::readwise::Highlight;
use crate::sources::reddit::RedditPost;
use crate::sources::unsplash::UnsplashImage;
use crate::sources::weather::WeatherData;

/// Stand-in deadline for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Shared deadline for one digest run. Copied into every concurrent fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext {
    deadline: Instant,
}

impl FetchContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            deadline: now
                .checked_add(timeout)
                .unwrap_or_else(|| now + FAR_FUTURE),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Drive `fut` until it completes or the deadline fires, whichever is first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        match tokio::time::timeout_at(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::DeadlineExceeded),
        }
    }
}

/// Anything the aggregator can fetch content from.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, ctx: &FetchContext) -> Result<SourceData, SourceError>;
}

/// Payload of a successful fetch, one case per known source kind.
///
/// The aggregator and the merges pass this through untouched; only the
/// renderer and the enrichment stage look inside.
#[derive(Debug, Clone)]
pub enum SourceData {
    Weather(WeatherData),
    Highlights(Vec<Highlight>),
    HackerNews(Vec<HnPost>),
    Reddit(Vec<RedditPost>),
    Opinion(Vec<NitterPost>),
    Image(UnsplashImage),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned status {status}")]
    Status { service: &'static str, status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Task failed: {0}")]
    Task(String),
}

/// Outcome of one source for one run.
#[derive(Debug)]
pub struct FetchResult {
    pub name: String,
    pub outcome: Result<SourceData, SourceError>,
}

impl FetchResult {
    pub fn new(name: impl Into<String>, outcome: Result<SourceData, SourceError>) -> Self {
        Self {
            name: name.into(),
            outcome,
        }
    }

    pub fn data(&self) -> Option<&SourceData> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&SourceError> {
        self.outcome.as_ref().err()
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
