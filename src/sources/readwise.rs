use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;

use crate::source::{FetchContext, Source, SourceData, SourceError};

pub const READWISE_API_URL: &str = "https://readwise.io/api/v2/highlights/";

/// A single highlight with the book it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Highlight {
    pub text: String,
    pub book_title: String,
    pub book_author: String,
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HighlightsResponse {
    #[serde(default)]
    results: Vec<RawHighlight>,
}

#[derive(Debug, Deserialize)]
struct RawHighlight {
    #[serde(default)]
    text: String,
    #[serde(default)]
    book: Option<RawBook>,
}

#[derive(Debug, Deserialize, Default)]
struct RawBook {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
}

impl From<RawHighlight> for Highlight {
    fn from(raw: RawHighlight) -> Self {
        let book = raw.book.unwrap_or_default();
        Self {
            text: raw.text,
            book_title: book.title.unwrap_or_default(),
            book_author: book.author.unwrap_or_default(),
            source_url: book.source_url.filter(|url| !url.is_empty()),
        }
    }
}

/// Picks one random highlight from the most recent page.
pub struct Readwise {
    client: Client,
    api_token: String,
    base_url: String,
}

impl Readwise {
    pub fn new(client: Client, api_token: impl Into<String>) -> Self {
        Self::with_base_url(client, api_token, READWISE_API_URL)
    }

    pub fn with_base_url(
        client: Client,
        api_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_token: api_token.into(),
            base_url: base_url.into(),
        }
    }
}

fn pick_index(len: usize) -> usize {
    rand::rng().random_range(0..len)
}

#[async_trait]
impl Source for Readwise {
    fn name(&self) -> &str {
        "Readwise"
    }

    async fn fetch(&self, _ctx: &FetchContext) -> Result<SourceData, SourceError> {
        if self.api_token.is_empty() {
            return Err(SourceError::NotConfigured("Readwise API token"));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("page_size", "100")])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.api_token),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                service: "Readwise API",
                status: status.as_u16(),
            });
        }

        let body: HighlightsResponse = response.json().await?;
        if body.results.is_empty() {
            return Ok(SourceData::Highlights(Vec::new()));
        }

        let mut results = body.results;
        let picked = results.swap_remove(pick_index(results.len()));
        Ok(SourceData::Highlights(vec![picked.into()]))
    }
}
