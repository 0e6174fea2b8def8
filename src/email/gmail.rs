use anyhow::{bail, Context};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use mail_parser::MessageParser;
use serde::Deserialize;

use super::clean::clean_body;
use super::message::RawMessage;

const GMAIL_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const MAX_RESULTS_PER_PAGE: u32 = 100;
const MAX_PAGES: u32 = 10;
const GET_CONCURRENCY: usize = 5;

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(rename = "internalDate")]
    internal_date: Option<String>,
    /// RFC 2822 payload, web-safe base64.
    raw: Option<String>,
}

/// Structured-query transport: the server filters by date via the Gmail
/// search syntax, so no local date filtering is needed.
pub struct GmailTransport {
    http_client: reqwest::Client,
    access_token: String,
}

impl GmailTransport {
    pub fn new(http_client: reqwest::Client, access_token: String) -> Self {
        Self {
            http_client,
            access_token,
        }
    }

    pub async fn list_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<RawMessage>> {
        let ids = self.list_message_ids(cutoff).await?;
        tracing::debug!(count = ids.len(), "Gmail query returned message ids");

        stream::iter(ids)
            .map(|id| self.get_message(id))
            .buffered(GET_CONCURRENCY)
            .try_collect()
            .await
    }

    async fn list_message_ids(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
        let query = format!("after:{}", cutoff.timestamp());
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut params = vec![
                ("q".to_string(), query.clone()),
                ("maxResults".to_string(), MAX_RESULTS_PER_PAGE.to_string()),
            ];
            if let Some(token) = page_token.take() {
                params.push(("pageToken".to_string(), token));
            }

            let resp = self
                .http_client
                .get(format!("{GMAIL_ENDPOINT}/messages"))
                .query(&params)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .context("Gmail message list request failed")?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!("Gmail message list returned {status}: {body}");
            }

            let data: MessageListResponse = resp
                .json()
                .await
                .context("Could not parse Gmail message list response")?;

            ids.extend(data.messages.into_iter().map(|m| m.id));

            match data.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
            if page == MAX_PAGES - 1 {
                tracing::warn!("Gmail list hit page bound, window may be incomplete");
            }
        }

        Ok(ids)
    }

    async fn get_message(&self, id: String) -> anyhow::Result<RawMessage> {
        let resp = self
            .http_client
            .get(format!("{GMAIL_ENDPOINT}/messages/{id}"))
            .query(&[("format", "raw")])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("Gmail message get request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            bail!("Gmail message get for {id} returned {status}");
        }

        let msg: GmailMessage = resp
            .json()
            .await
            .context("Could not parse Gmail message response")?;

        parse_gmail_message(msg)
    }
}

fn parse_gmail_message(msg: GmailMessage) -> anyhow::Result<RawMessage> {
    let raw = msg
        .raw
        .as_deref()
        .context(format!("Gmail message {} has no raw payload", msg.id))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(raw.trim_end_matches('='))
        .context("Gmail raw payload is not valid base64")?;

    let parsed = MessageParser::default()
        .parse(&decoded)
        .context(format!("Could not parse RFC 2822 payload of {}", msg.id))?;

    let sender = parsed
        .from()
        .and_then(|f| f.first().and_then(|a| a.address().map(|s| s.to_string())))
        .unwrap_or_else(|| "unknown".to_string());
    let subject = parsed
        .subject()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "(No Subject)".to_string());
    let body = parsed
        .body_text(0)
        .map(|b| clean_body(&b))
        .unwrap_or_default();

    // internalDate is epoch millis; fall back to the Date header.
    let received_at = msg
        .internal_date
        .as_deref()
        .and_then(|d| d.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .or_else(|| {
            parsed
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        })
        .context(format!("Gmail message {} has no usable date", msg.id))?;

    Ok(RawMessage {
        id: msg.id,
        sender,
        subject,
        received_at,
        body,
    })
}
