use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use feed_rs::parser;
use reqwest::Client;
use tracing::{debug, warn};

use crate::aggregator::fan_out;
use crate::merge::{recency_window, MergeInput, RankedItem, TimedItem, RECENCY_LIMIT};
use crate::normalize::{avatar_url, extract_images, parse_feed_date, strip_repost_marker, PostKind};
use crate::source::{FetchContext, Source, SourceData, SourceError};

const NITTER_USER_AGENT: &str = "Mozilla/5.0 (compatible; Burrow/1.0)";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NitterPost {
    pub username: String,
    pub text: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub avatar_url: String,
    pub kind: PostKind,
}

impl RankedItem for NitterPost {
    type Rank = Option<DateTime<Utc>>;

    fn group_key(&self) -> &str {
        &self.username
    }

    fn rank_value(&self) -> Self::Rank {
        self.published
    }

    fn dedup_key(&self) -> &str {
        &self.link
    }
}

impl TimedItem for NitterPost {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.published
    }
}

/// Recent posts from a list of accounts on a Nitter instance.
pub struct Nitter {
    client: Client,
    instance: String,
    usernames: Vec<String>,
    limit: usize,
    window: Duration,
}

impl Nitter {
    /// A `limit` of zero falls back to [`RECENCY_LIMIT`].
    pub fn new(client: Client, instance: &str, usernames: Vec<String>, limit: usize) -> Self {
        Self {
            client,
            instance: instance.trim_end_matches('/').to_string(),
            usernames: usernames
                .into_iter()
                .map(|u| u.trim_start_matches('@').to_string())
                .collect(),
            limit: if limit == 0 { RECENCY_LIMIT } else { limit },
            window: recency_window(),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

async fn fetch_user_feed(
    client: &Client,
    instance: &str,
    username: &str,
) -> Result<Vec<NitterPost>, SourceError> {
    let url = format!("{}/{}/rss", instance, username);
    let response = client
        .get(&url)
        .header(reqwest::header::USER_AGENT, NITTER_USER_AGENT)
        .header(
            reqwest::header::ACCEPT,
            "application/rss+xml, application/xml, text/xml",
        )
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            service: "Nitter",
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().await?;
    parse_user_feed(username, &bytes)
}

/// Turn one account's RSS document into normalized posts.
pub fn parse_user_feed(username: &str, xml: &[u8]) -> Result<Vec<NitterPost>, SourceError> {
    let raw_dates = extract_pub_dates(xml);
    let feed = parser::parse(xml)
        .map_err(|e| SourceError::Parse(format!("feed for @{}: {}", username, e)))?;

    let posts = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let description = entry.summary.map(|s| s.content).unwrap_or_default();
            let (text, kind) = strip_repost_marker(&title);

            let published = raw_dates
                .get(&link)
                .and_then(|raw| parse_feed_date(raw))
                .or(entry.published)
                .filter(|dt| dt.timestamp() > 0);

            NitterPost {
                username: username.to_string(),
                text,
                link,
                published,
                images: extract_images(&description),
                avatar_url: avatar_url(username),
                kind,
            }
        })
        .collect();

    Ok(posts)
}

/// Map each item's `<link>` to its raw `<pubDate>` text.
pub fn extract_pub_dates(xml_bytes: &[u8]) -> HashMap<String, String> {
    let mut dates = HashMap::new();
    let xml = match std::str::from_utf8(xml_bytes) {
        Ok(s) => s,
        Err(_) => return dates,
    };

    for item_block in xml.split("<item>").skip(1) {
        let item_end = item_block.find("</item>").unwrap_or(item_block.len());
        let item = &item_block[..item_end];

        if let (Some(link), Some(date)) = (
            extract_xml_element(item, "link"),
            extract_xml_element(item, "pubDate"),
        ) {
            dates.insert(link, date);
        }
    }

    dates
}

pub fn extract_xml_element(xml: &str, tag: &str) -> Option<String> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);

    let start = xml.find(&start_tag)? + start_tag.len();
    let end = xml[start..].find(&end_tag)? + start;

    Some(xml[start..end].trim().to_string())
}

#[async_trait]
impl Source for Nitter {
    fn name(&self) -> &str {
        "Opinion"
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<SourceData, SourceError> {
        if self.instance.is_empty() || self.usernames.is_empty() {
            return Err(SourceError::NotConfigured("Nitter"));
        }

        let ctx = *ctx;
        let outcomes = fan_out(self.usernames.clone(), |username| {
            let client = self.client.clone();
            let instance = self.instance.clone();
            async move { ctx.run(fetch_user_feed(&client, &instance, &username)).await }
        })
        .await;

        let mut input = MergeInput::new();
        let mut first_error = None;
        for (username, outcome) in self.usernames.iter().zip(outcomes) {
            match outcome {
                Ok(posts) => {
                    debug!(user = %username, count = posts.len(), "Fetched feed");
                    input.push_group(username.clone(), posts);
                }
                Err(e) => {
                    warn!(user = %username, error = %e, "Skipping feed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if input.order().is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        Ok(SourceData::Opinion(input.merge_by_recency(
            self.window,
            self.limit,
            Utc::now(),
        )))
    }
}
