//! One digest run end to end, and the daily schedule that drives it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use reqwest::Client;
use tracing::{error, info};

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::db::Database;
use crate::enrich::Enrichment;
use crate::mailer::Mailer;
use crate::render::{self, RenderedEmail, Renderer};
use crate::source::{FetchContext, FetchResult};
use crate::sources::build_sources;

pub struct Digest {
    aggregator: Aggregator,
    enrichment: Option<Enrichment>,
    renderer: Renderer,
    timeout: Duration,
}

impl Digest {
    pub fn new(aggregator: Aggregator, enrichment: Option<Enrichment>, timeout: Duration) -> Self {
        Self {
            aggregator,
            enrichment,
            renderer: Renderer::new(),
            timeout,
        }
    }

    pub fn from_config(config: &Config, client: &Client) -> Self {
        let set = build_sources(&config.sources, client);
        Self::new(
            Aggregator::new(set.sources),
            set.enrichment,
            config.fetch_timeout(),
        )
    }

    pub fn source_names(&self) -> Vec<String> {
        let mut names = self.aggregator.names();
        if let Some(enrichment) = &self.enrichment {
            names.push(enrichment.name().to_string());
        }
        names
    }

    /// Parallel phase, then enrichment, under one shared deadline.
    pub async fn collect(&self) -> Vec<FetchResult> {
        let ctx = FetchContext::with_timeout(self.timeout);
        let results = self.aggregator.fetch_all(&ctx).await;

        match &self.enrichment {
            Some(enrichment) => enrichment.apply(&ctx, results).await,
            None => results,
        }
    }

    pub async fn compose(&self, edition: i64) -> anyhow::Result<(Vec<FetchResult>, RenderedEmail)> {
        let results = self.collect().await;
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        info!(edition, sources = results.len(), failed, "Collected sources");

        let email = self
            .renderer
            .render(&results, edition, Local::now().date_naive())
            .context("rendering digest")?;
        Ok((results, email))
    }
}

/// Compose, send and record the next edition. Returns its number.
pub async fn run_once(digest: &Digest, mailer: &Mailer, db: &Database) -> anyhow::Result<i64> {
    let edition = db.next_edition().await?;
    info!(edition, "Starting digest generation");

    let (results, email) = digest.compose(edition).await?;
    let subject = render::subject(edition, Local::now().date_naive());
    mailer.send(&subject, &email).await?;

    db.record_edition(edition, &results)
        .await
        .context("recording edition")?;

    info!(edition, "Digest sent");
    Ok(edition)
}

/// Next moment strictly after `now` whose local time is `at`.
///
/// Days on which `at` does not exist locally are skipped; when the wall
/// clock repeats, the earlier instant wins.
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let today = now.date_naive();
    let tz = now.timezone();

    for offset in 0..=2 {
        let candidate = today
            .checked_add_days(Days::new(offset))
            .and_then(|day| tz.from_local_datetime(&day.and_time(at)).earliest());
        if let Some(candidate) = candidate {
            if candidate > *now {
                return candidate;
            }
        }
    }

    now.clone() + chrono::Duration::days(1)
}

/// Run forever, once a day at `at` local time. Failed runs are logged and
/// the loop continues with the next day.
pub async fn run_daily(digest: Arc<Digest>, mailer: Arc<Mailer>, db: Arc<Database>, at: NaiveTime) {
    loop {
        let now = Local::now();
        let next = next_run_after(&now, at);
        info!(next_run = %next.format("%Y-%m-%d %H:%M %Z"), "Waiting for next run");

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;

        match run_once(&digest, &mailer, &db).await {
            Ok(edition) => info!(edition, "Scheduled digest complete"),
            Err(e) => error!("Scheduled digest failed: {:#}", e),
        }
    }
}
