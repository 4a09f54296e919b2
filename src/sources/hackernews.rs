use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::source::{FetchContext, Source, SourceData, SourceError};

pub const HN_SEARCH_URL: &str = "https://hn.algolia.com/api/v1/search";

const FRONT_PAGE_SIZE: &str = "30";
const KEEP_TOP: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HnPost {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub points: i64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub num_comments: i64,
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub story_text: Option<String>,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl HnPost {
    pub fn comments_url(&self) -> String {
        format!("https://news.ycombinator.com/item?id={}", self.object_id)
    }

    /// Outbound link, or the discussion itself for text posts.
    pub fn link(&self) -> String {
        match &self.url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => self.comments_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<HnPost>,
}

/// Top front-page stories by points.
pub struct HackerNews {
    client: Client,
    base_url: String,
}

impl HackerNews {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, HN_SEARCH_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Source for HackerNews {
    fn name(&self) -> &str {
        "Hacker News"
    }

    async fn fetch(&self, _ctx: &FetchContext) -> Result<SourceData, SourceError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("tags", "front_page"), ("hitsPerPage", FRONT_PAGE_SIZE)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                service: "HN API",
                status: status.as_u16(),
            });
        }

        let body: SearchResponse = response.json().await?;
        let mut posts = body.hits;
        posts.sort_by(|a, b| b.points.cmp(&a.points));
        posts.truncate(KEEP_TOP);

        Ok(SourceData::HackerNews(posts))
    }
}
