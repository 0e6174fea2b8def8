use chrono::{DateTime, Duration, Utc};
use tokio::time::sleep;

use crate::error::{DigestError, DigestResult};

use super::gmail::GmailTransport;
use super::imap::ImapTransport;
use super::message::{dedup_by_id, sort_deterministic, truncate_to_most_recent, RawMessage};

/// Underlying mailbox transport, fixed at construction. Gmail filters
/// server-side with an `after:` query; IMAP searches at day granularity
/// and relies on the source's exact client-side cutoff filter.
pub enum Transport {
    Gmail(GmailTransport),
    Imap(ImapTransport),
    #[cfg(test)]
    Scripted(std::sync::Mutex<std::collections::VecDeque<anyhow::Result<Vec<RawMessage>>>>),
}

impl Transport {
    async fn list_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<RawMessage>> {
        match self {
            Transport::Gmail(t) => t.list_since(cutoff).await,
            Transport::Imap(t) => t.list_since(cutoff).await,
            #[cfg(test)]
            Transport::Scripted(responses) => responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new())),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Transport::Gmail(_) => "gmail",
            Transport::Imap(_) => "imap",
            #[cfg(test)]
            Transport::Scripted(_) => "scripted",
        }
    }
}

/// Result of one fetch: deduplicated, time-ordered messages plus the
/// number dropped by the per-digest cap.
#[derive(Debug)]
pub struct FetchResult {
    pub messages: Vec<RawMessage>,
    pub truncated: usize,
}

pub struct MessageSource {
    transport: Transport,
    max_messages: usize,
    attempts: u32,
}

impl MessageSource {
    pub fn new(transport: Transport, max_messages: usize, attempts: u32) -> Self {
        Self {
            transport,
            max_messages,
            attempts: attempts.max(1),
        }
    }

    /// Fetch all messages received in the last `cutoff_hours`, retrying
    /// transient transport failures before giving up with
    /// `SourceUnavailable`. Read-only with respect to the mailbox.
    pub async fn fetch(&self, cutoff_hours: u32) -> DigestResult<FetchResult> {
        let cutoff = Utc::now() - Duration::hours(cutoff_hours as i64);
        tracing::info!(
            transport = self.transport.name(),
            %cutoff,
            "Fetching messages"
        );

        let raw = self.list_with_retries(cutoff).await?;

        let mut messages = dedup_by_id(raw);
        // Day-granularity transports can return messages older than the
        // exact cutoff instant.
        messages.retain(|m| m.received_at >= cutoff);
        sort_deterministic(&mut messages);
        let truncated = truncate_to_most_recent(&mut messages, self.max_messages);

        if truncated > 0 {
            tracing::warn!(
                truncated,
                cap = self.max_messages,
                "Fetch exceeded digest cap, keeping most recent"
            );
        }
        tracing::info!(count = messages.len(), "Fetch complete");

        Ok(FetchResult { messages, truncated })
    }

    async fn list_with_retries(&self, cutoff: DateTime<Utc>) -> DigestResult<Vec<RawMessage>> {
        let mut last_err = None;
        for attempt in 1..=self.attempts {
            match self.transport.list_since(cutoff).await {
                Ok(messages) => return Ok(messages),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.attempts,
                        "Mailbox fetch failed: {e:#}"
                    );
                    last_err = Some(e);
                    if attempt < self.attempts {
                        sleep(std::time::Duration::from_secs(attempt as u64)).await;
                    }
                }
            }
        }
        Err(DigestError::SourceUnavailable(
            last_err.unwrap_or_else(|| anyhow::anyhow!("no fetch attempt made")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::message::test_message;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn scripted(responses: Vec<anyhow::Result<Vec<RawMessage>>>) -> Transport {
        Transport::Scripted(Mutex::new(VecDeque::from(responses)))
    }

    #[tokio::test]
    async fn test_fetch_dedups_and_orders() {
        let transport = scripted(vec![Ok(vec![
            test_message("b", 1),
            test_message("a", 3),
            test_message("b", 1),
            test_message("c", 2),
        ])]);
        let source = MessageSource::new(transport, 50, 1);

        let result = source.fetch(12).await.unwrap();
        let ids: Vec<_> = result.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(result.truncated, 0);
    }

    #[tokio::test]
    async fn test_fetch_filters_older_than_cutoff() {
        let transport = scripted(vec![Ok(vec![test_message("old", 30), test_message("new", 2)])]);
        let source = MessageSource::new(transport, 50, 1);

        let result = source.fetch(12).await.unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].id, "new");
    }

    #[tokio::test]
    async fn test_fetch_applies_cap_keeping_most_recent() {
        let many: Vec<_> = (0..73).map(|i| test_message(&format!("m{i:02}"), 0)).collect();
        let mut many = many;
        for (i, m) in many.iter_mut().enumerate() {
            m.received_at = Utc::now() - Duration::minutes(73 - i as i64);
        }
        let transport = scripted(vec![Ok(many)]);
        let source = MessageSource::new(transport, 50, 1);

        let result = source.fetch(12).await.unwrap();
        assert_eq!(result.messages.len(), 50);
        assert_eq!(result.truncated, 23);
        // Oldest 23 were dropped.
        assert_eq!(result.messages[0].id, "m23");
    }

    #[tokio::test]
    async fn test_fetch_retries_then_succeeds() {
        let transport = scripted(vec![
            Err(anyhow!("connection reset")),
            Ok(vec![test_message("a", 1)]),
        ]);
        let source = MessageSource::new(transport, 50, 3);

        let result = source.fetch(12).await.unwrap();
        assert_eq!(result.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_exhausted_retries_is_source_unavailable() {
        let transport = scripted(vec![Err(anyhow!("auth failed")), Err(anyhow!("auth failed"))]);
        let source = MessageSource::new(transport, 50, 2);

        let err = source.fetch(12).await.unwrap_err();
        assert!(matches!(err, DigestError::SourceUnavailable(_)));
    }
}
