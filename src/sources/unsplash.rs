use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::enrich::QuerySource;
use crate::source::{FetchContext, SourceData, SourceError};

pub const UNSPLASH_API_URL: &str = "https://api.unsplash.com";

const UTM_SUFFIX: &str = "?utm_source=burrow&utm_medium=referral";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnsplashImage {
    pub url: String,
    pub alt_description: String,
    pub photographer_name: String,
    pub photographer_url: String,
    pub query: String,
}

#[derive(Debug, Deserialize)]
struct RandomPhoto {
    urls: PhotoUrls,
    #[serde(default)]
    alt_description: Option<String>,
    user: Photographer,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

#[derive(Debug, Deserialize)]
struct Photographer {
    #[serde(default)]
    name: String,
    links: PhotographerLinks,
}

#[derive(Debug, Deserialize)]
struct PhotographerLinks {
    html: String,
}

/// Random landscape photo for a search query.
pub struct Unsplash {
    client: Client,
    access_key: String,
    base_url: String,
}

impl Unsplash {
    pub fn new(client: Client, access_key: impl Into<String>) -> Self {
        Self::with_base_url(client, access_key, UNSPLASH_API_URL)
    }

    pub fn with_base_url(
        client: Client,
        access_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            access_key: access_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl QuerySource for Unsplash {
    fn name(&self) -> &str {
        "Unsplash"
    }

    async fn fetch_query(
        &self,
        _ctx: &FetchContext,
        query: &str,
    ) -> Result<SourceData, SourceError> {
        if self.access_key.is_empty() {
            return Err(SourceError::NotConfigured("Unsplash access key"));
        }

        let response = self
            .client
            .get(format!("{}/photos/random", self.base_url))
            .query(&[
                ("query", query),
                ("orientation", "landscape"),
                ("content_filter", "high"),
            ])
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Client-ID {}", self.access_key),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                service: "Unsplash API",
                status: status.as_u16(),
            });
        }

        let photo: RandomPhoto = response.json().await?;
        Ok(SourceData::Image(UnsplashImage {
            url: photo.urls.regular,
            alt_description: photo.alt_description.unwrap_or_default(),
            photographer_name: photo.user.name,
            photographer_url: format!("{}{}", photo.user.links.html, UTM_SUFFIX),
            query: query.to_string(),
        }))
    }
}
