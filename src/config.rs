use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::enrich::{DEFAULT_FALLBACK_QUERY, DEFAULT_TOPIC_SOURCE};

/// One day. A run that needs longer would overlap the next one.
pub const MAX_FETCH_TIMEOUT_SECS: u64 = 86_400;

static ENV_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Local time of the daily run, `HH:MM`
    #[serde(default = "default_send_at")]
    pub send_at: String,
    /// Shared deadline for one run, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_send_at() -> String {
    "07:00".to_string()
}

fn default_fetch_timeout() -> u64 {
    120
}

fn default_database_url() -> String {
    "sqlite:burrow.db?mode=rwc".to_string()
}

fn default_query() -> String {
    DEFAULT_FALLBACK_QUERY.to_string()
}

fn default_topic_source() -> String {
    DEFAULT_TOPIC_SOURCE.to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EmailConfig {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub resend_api_key: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Weather {
        #[serde(default)]
        name: String,
        latitude: f64,
        longitude: f64,
    },
    Readwise {
        #[serde(default)]
        api_token: String,
    },
    HackerNews,
    Reddit {
        #[serde(default)]
        subreddits: Vec<String>,
        #[serde(default)]
        subreddit: Option<String>,
    },
    Nitter {
        instance: String,
        #[serde(default)]
        usernames: Vec<String>,
        #[serde(default)]
        limit: usize,
    },
    Unsplash {
        #[serde(default)]
        access_key: String,
        #[serde(default = "default_query")]
        query: String,
        #[serde(default = "default_topic_source")]
        topic_source: String,
    },
}

impl SourceConfig {
    /// `subreddits` followed by `subreddit`, without duplicates.
    pub fn subreddit_list(&self) -> Vec<String> {
        let SourceConfig::Reddit {
            subreddits,
            subreddit,
        } = self
        else {
            return Vec::new();
        };

        let mut list: Vec<String> = Vec::new();
        for name in subreddits.iter().chain(subreddit.iter()) {
            let name = name.trim().trim_start_matches("r/").to_string();
            if !name.is_empty() && !list.contains(&name) {
                list.push(name);
            }
        }
        list
    }
}

/// Replace `${VAR}` and `${VAR:-default}` with environment values.
///
/// Unset variables without a default are left as written.
pub fn expand_env_vars(content: &str) -> String {
    ENV_VAR
        .replace_all(content, |caps: &Captures| {
            let expr = &caps[1];
            let (name, default) = match expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (expr, None),
            };
            match (std::env::var(name), default) {
                (Ok(value), _) => value,
                (Err(_), Some(default)) => default.to_string(),
                (Err(_), None) => caps[0].to_string(),
            }
        })
        .into_owned()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_str(&expand_env_vars(&content))
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content).context("parsing config file")?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.send_time()?;

        if !(1..=MAX_FETCH_TIMEOUT_SECS).contains(&self.fetch_timeout_secs) {
            bail!(
                "fetch_timeout_secs must be between 1 and {}, got {}",
                MAX_FETCH_TIMEOUT_SECS,
                self.fetch_timeout_secs
            );
        }

        let unsplash_count = self
            .sources
            .iter()
            .filter(|s| matches!(s, SourceConfig::Unsplash { .. }))
            .count();
        if unsplash_count > 1 {
            bail!("at most one unsplash source may be configured, found {}", unsplash_count);
        }

        for source in &self.sources {
            match source {
                SourceConfig::Reddit { .. } if source.subreddit_list().is_empty() => {
                    bail!("reddit source needs at least one subreddit")
                }
                SourceConfig::Nitter { usernames, .. } if usernames.is_empty() => {
                    bail!("nitter source needs at least one username")
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn send_time(&self) -> anyhow::Result<NaiveTime> {
        NaiveTime::parse_from_str(self.send_at.trim(), "%H:%M")
            .with_context(|| format!("invalid send_at {:?}, expected HH:MM", self.send_at))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
