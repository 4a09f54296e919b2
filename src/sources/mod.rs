//! HTTP clients for every content source.

pub mod hackernews;
pub mod nitter;
pub mod readwise;
pub mod reddit;
pub mod unsplash;
pub mod weather;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;

use crate::config::SourceConfig;
use crate::enrich::Enrichment;
use crate::source::Source;

use self::hackernews::HackerNews;
use self::nitter::Nitter;
use self::readwise::Readwise;
use self::reddit::Reddit;
use self::unsplash::Unsplash;
use self::weather::Weather;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn http_client() -> anyhow::Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent("burrow/1.0")
        .build()
        .context("Failed to create HTTP client")
}

/// Aggregated sources in config order, plus the enrichment stage if any.
pub struct SourceSet {
    pub sources: Vec<Arc<dyn Source>>,
    pub enrichment: Option<Enrichment>,
}

pub fn build_sources(configs: &[SourceConfig], client: &Client) -> SourceSet {
    let mut sources: Vec<Arc<dyn Source>> = Vec::new();
    let mut enrichment = None;

    for config in configs {
        match config {
            SourceConfig::Weather {
                name,
                latitude,
                longitude,
            } => sources.push(Arc::new(Weather::new(
                client.clone(),
                *latitude,
                *longitude,
                name.clone(),
            ))),
            SourceConfig::Readwise { api_token } => {
                sources.push(Arc::new(Readwise::new(client.clone(), api_token.clone())))
            }
            SourceConfig::HackerNews => sources.push(Arc::new(HackerNews::new(client.clone()))),
            SourceConfig::Reddit { .. } => sources.push(Arc::new(Reddit::new(
                client.clone(),
                config.subreddit_list(),
            ))),
            SourceConfig::Nitter {
                instance,
                usernames,
                limit,
            } => sources.push(Arc::new(Nitter::new(
                client.clone(),
                instance,
                usernames.clone(),
                *limit,
            ))),
            SourceConfig::Unsplash {
                access_key,
                query,
                topic_source,
            } => {
                enrichment = Some(Enrichment::new(
                    Arc::new(Unsplash::new(client.clone(), access_key.clone())),
                    topic_source.clone(),
                    query.clone(),
                ));
            }
        }
    }

    SourceSet {
        sources,
        enrichment,
    }
}
