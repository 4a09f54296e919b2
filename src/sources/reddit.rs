use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::aggregator::fan_out;
use crate::merge::{MergeInput, RankedItem, SCORE_FLOOR};
use crate::source::{FetchContext, Source, SourceData, SourceError};

pub const REDDIT_URL: &str = "https://www.reddit.com";

// Reddit rejects requests with generic client user agents.
const REDDIT_USER_AGENT: &str = "burrow/1.0 (daily digest)";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RedditPost {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub subreddit: String,
}

impl RedditPost {
    pub fn full_permalink(&self) -> String {
        format!("{}{}", REDDIT_URL, self.permalink)
    }

    pub fn is_self_post(&self) -> bool {
        !self.selftext.trim().is_empty()
    }
}

impl RankedItem for RedditPost {
    type Rank = i64;

    fn group_key(&self) -> &str {
        &self.subreddit
    }

    fn rank_value(&self) -> i64 {
        self.score
    }

    fn dedup_key(&self) -> &str {
        &self.permalink
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RedditPost,
}

/// Daily top posts across several subreddits, merged so each one shows up.
pub struct Reddit {
    client: Client,
    subreddits: Vec<String>,
    base_url: String,
}

impl Reddit {
    pub fn new(client: Client, subreddits: Vec<String>) -> Self {
        Self::with_base_url(client, subreddits, REDDIT_URL)
    }

    pub fn with_base_url(
        client: Client,
        subreddits: Vec<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            subreddits,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn subreddits(&self) -> &[String] {
        &self.subreddits
    }
}

async fn fetch_subreddit(
    client: &Client,
    base_url: &str,
    subreddit: &str,
) -> Result<Vec<RedditPost>, SourceError> {
    let url = format!("{}/r/{}/top/.json", base_url, subreddit);
    let response = client
        .get(&url)
        .query(&[("t", "day"), ("limit", "5")])
        .header(reqwest::header::USER_AGENT, REDDIT_USER_AGENT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            service: "Reddit API",
            status: status.as_u16(),
        });
    }

    let listing: Listing = response.json().await?;
    let posts = listing
        .data
        .children
        .into_iter()
        .map(|child| {
            let mut post = child.data;
            if post.subreddit.is_empty() {
                post.subreddit = subreddit.to_string();
            }
            post
        })
        .collect();

    Ok(posts)
}

#[async_trait]
impl Source for Reddit {
    fn name(&self) -> &str {
        "Reddit"
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<SourceData, SourceError> {
        let ctx = *ctx;
        let outcomes = fan_out(self.subreddits.clone(), |subreddit| {
            let client = self.client.clone();
            let base_url = self.base_url.clone();
            async move { ctx.run(fetch_subreddit(&client, &base_url, &subreddit)).await }
        })
        .await;

        let mut input = MergeInput::new();
        let mut first_error = None;
        for (subreddit, outcome) in self.subreddits.iter().zip(outcomes) {
            match outcome {
                Ok(posts) => {
                    debug!(subreddit = %subreddit, count = posts.len(), "Fetched subreddit");
                    input.push_group(subreddit.clone(), posts);
                }
                Err(e) => {
                    warn!(subreddit = %subreddit, error = %e, "Skipping subreddit");
                    first_error.get_or_insert(e);
                }
            }
        }

        if input.order().is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(SourceData::Reddit(input.merge_by_score(SCORE_FLOOR)))
    }
}
