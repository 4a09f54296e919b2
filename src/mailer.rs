use anyhow::{bail, Context};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EmailConfig;
use crate::render::RenderedEmail;

pub const RESEND_API_URL: &str = "https://api.resend.com";

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// Delivers rendered digests through the Resend HTTP API.
///
/// Emails go out without attachments; the header image is linked by URL.
pub struct Mailer {
    client: Client,
    from: String,
    to: String,
    api_key: String,
    base_url: String,
}

impl Mailer {
    pub fn new(client: Client, email: &EmailConfig) -> Self {
        Self::with_base_url(client, email, RESEND_API_URL)
    }

    pub fn with_base_url(client: Client, email: &EmailConfig, base_url: impl Into<String>) -> Self {
        Self {
            client,
            from: email.from.clone(),
            to: email.to.clone(),
            api_key: email.resend_api_key.clone(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send one email and return the provider's message id.
    pub async fn send(&self, subject: &str, email: &RenderedEmail) -> anyhow::Result<String> {
        if self.api_key.is_empty() {
            bail!("Resend API key not configured");
        }
        if self.to.is_empty() {
            bail!("no recipient configured");
        }

        let request = SendEmailRequest {
            from: &self.from,
            to: vec![&self.to],
            subject,
            html: &email.html,
            text: &email.text,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("sending email via Resend")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Resend API returned status {}: {}", status.as_u16(), body.trim());
        }

        let sent: SendEmailResponse = response
            .json()
            .await
            .context("decoding Resend response")?;
        info!(id = %sent.id, to = %self.to, "Email sent");
        Ok(sent.id)
    }
}
