use anyhow::Context;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use native_tls::TlsConnector;

use super::clean::clean_body;
use super::message::RawMessage;

/// Simple protocol transport. IMAP SEARCH only filters at day
/// granularity, so results include messages from before the exact
/// cutoff instant; the caller filters those out. Uses BODY.PEEK so the
/// mailbox is never mutated (no \Seen flag set).
#[derive(Clone)]
pub struct ImapTransport {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl ImapTransport {
    pub fn new(host: String, port: u16, username: String, password: String) -> Self {
        Self {
            host,
            port,
            username,
            password,
        }
    }

    /// The `imap` crate is blocking, so the session runs on the
    /// blocking pool.
    pub async fn list_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<RawMessage>> {
        let transport = self.clone();
        tokio::task::spawn_blocking(move || transport.list_since_blocking(cutoff))
            .await
            .context("IMAP fetch task panicked")?
    }

    fn list_since_blocking(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<RawMessage>> {
        let tls = TlsConnector::builder()
            .build()
            .context("Could not build TLS connector")?;
        let client = imap::connect((self.host.as_str(), self.port), self.host.as_str(), &tls)
            .context("Could not connect to IMAP server")?;

        let mut session = client
            .login(&self.username, &self.password)
            .map_err(|(e, _)| anyhow::anyhow!("IMAP login failed: {e}"))?;

        let result = self.fetch_window(&mut session, cutoff);
        // Best effort, the fetch result matters more than the logout.
        let _ = session.logout();
        result
    }

    fn fetch_window(
        &self,
        session: &mut imap::Session<native_tls::TlsStream<std::net::TcpStream>>,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RawMessage>> {
        session.select("INBOX").context("Could not select INBOX")?;

        // SINCE matches on the internal date's day.
        let query = format!("SINCE {}", cutoff.format("%d-%b-%Y"));
        let uids = session
            .uid_search(&query)
            .context("IMAP UID SEARCH failed")?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable();
        let uid_set = uid_list
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let fetches = session
            .uid_fetch(uid_set, "(UID INTERNALDATE BODY.PEEK[])")
            .context("IMAP UID FETCH failed")?;

        let mut messages = Vec::new();
        for fetch in fetches.iter() {
            let Some(body) = fetch.body() else {
                tracing::warn!(uid = fetch.uid, "IMAP fetch returned no body, skipping");
                continue;
            };
            match parse_imap_message(fetch.uid, fetch.internal_date(), body) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    tracing::warn!(uid = fetch.uid, "Could not parse IMAP message: {e:#}");
                }
            }
        }

        Ok(messages)
    }
}

fn parse_imap_message(
    uid: Option<u32>,
    internal_date: Option<DateTime<chrono::FixedOffset>>,
    raw: &[u8],
) -> anyhow::Result<RawMessage> {
    let parsed = MessageParser::default()
        .parse(raw)
        .context("Could not parse RFC 2822 payload")?;

    // Message-ID is the stable identifier; UID only as a fallback.
    let id = parsed
        .message_id()
        .map(|m| m.to_string())
        .or_else(|| uid.map(|u| format!("uid-{u}")))
        .context("IMAP message has neither Message-ID nor UID")?;

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

    let received_at = internal_date
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| {
            parsed
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        })
        .context("IMAP message has no usable date")?;

    Ok(RawMessage {
        id,
        sender,
        subject,
        received_at,
        body,
    })
}
