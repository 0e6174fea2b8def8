use anyhow::{anyhow, Context};
use futures::{stream, StreamExt};
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

use crate::config::{ApiConfig, LimitsConfig};
use crate::digest::report::{EmailSummary, Priority};
use crate::email::message::RawMessage;
use crate::limiter::PromptLimiter;

use super::{
    parse_summary_answer, summary_user_prompt, ChatApiResponseOrError, ParsedSummary, SYSTEM_PROMPT,
};

/// Turns raw messages into structured summaries via the chat-completions
/// endpoint. Per-message failures degrade in place, so a batch always
/// yields exactly one summary per input message.
pub struct Summarizer {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    limiter: PromptLimiter,
    attempts: u32,
    concurrency: usize,
    request_timeout: Duration,
}

impl Summarizer {
    pub fn new(
        http_client: reqwest::Client,
        api: &ApiConfig,
        limits: &LimitsConfig,
        limiter: PromptLimiter,
    ) -> Self {
        Self {
            http_client,
            endpoint: api.endpoint.clone(),
            api_key: api.key.clone(),
            model: api.model.clone(),
            temperature: api.temperature,
            limiter,
            attempts: limits.summary_attempts.max(1),
            concurrency: limits.summary_concurrency.max(1),
            request_timeout: Duration::from_secs(limits.request_timeout_secs),
        }
    }

    /// Summarize a batch with bounded fan-out. `buffered` polls the
    /// calls concurrently but yields results in submission order, so
    /// the output matches the fetch order of `messages`.
    pub async fn summarize_batch(&self, messages: &[RawMessage]) -> Vec<EmailSummary> {
        stream::iter(messages)
            .map(|msg| self.summarize(msg))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Summarize one message. Never fails: retry exhaustion and
    /// unparseable answers both produce the degraded summary.
    pub async fn summarize(&self, message: &RawMessage) -> EmailSummary {
        for attempt in 1..=self.attempts {
            self.limiter.acquire_one().await;

            match self.send_summary_prompt(message).await {
                Ok(content) => {
                    return match parse_summary_answer(&content) {
                        Some(parsed) => summary_from_parsed(message, parsed),
                        None => {
                            tracing::warn!(
                                message_id = %message.id,
                                "Unparseable summarization answer, using degraded summary: {content}"
                            );
                            degraded_summary(message)
                        }
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        message_id = %message.id,
                        attempt,
                        max_attempts = self.attempts,
                        "Summarization call failed: {e:#}"
                    );
                    if attempt < self.attempts {
                        tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                    }
                }
            }
        }

        tracing::warn!(
            message_id = %message.id,
            "Summarization retries exhausted, using degraded summary"
        );
        degraded_summary(message)
    }

    async fn send_summary_prompt(&self, message: &RawMessage) -> anyhow::Result<String> {
        let user_content = summary_user_prompt(&message.sender, &message.subject, &message.body);

        let resp = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&json!({
                "model": &self.model,
                "temperature": self.temperature,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": user_content }
                ],
                "response_format": { "type": "json_object" }
            }))
            .send()
            .await
            .context("Summarization request failed")?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            self.limiter.trigger_backoff();
            return Err(anyhow!("summarization service rate limited the request"));
        }

        let raw = resp
            .json::<serde_json::Value>()
            .await
            .context("Summarization response was not JSON")?;

        let parsed = serde_json::from_value::<ChatApiResponseOrError>(raw.clone())
            .context(format!("Could not parse chat response: {raw}"))?;

        let parsed = match parsed {
            ChatApiResponseOrError::Error(e) => {
                if e.error.message.to_ascii_lowercase().contains("rate limit") {
                    self.limiter.trigger_backoff();
                }
                return Err(anyhow!("Chat API error: {}", e.error.message));
            }
            ChatApiResponseOrError::Response(resp) => resp,
        };

        let choice = parsed.choices.first().context("No choices in response")?;
        Ok(choice.message.content.clone())
    }
}

fn summary_from_parsed(message: &RawMessage, parsed: ParsedSummary) -> EmailSummary {
    EmailSummary {
        message_id: message.id.clone(),
        sender: message.sender.clone(),
        subject: message.subject.clone(),
        received_at: message.received_at,
        key_points: parsed.key_points,
        action_items: parsed.action_items,
        priority: parsed.priority,
        degraded: false,
    }
}

/// Fallback used when the service fails or answers with an unexpected
/// shape. The message is still counted, just without extracted content.
fn degraded_summary(message: &RawMessage) -> EmailSummary {
    EmailSummary {
        message_id: message.id.clone(),
        sender: message.sender.clone(),
        subject: message.subject.clone(),
        received_at: message.received_at,
        key_points: Vec::new(),
        action_items: Vec::new(),
        priority: Priority::Medium,
        degraded: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, LimitsConfig};
    use crate::email::message::test_message;

    fn unreachable_summarizer(attempts: u32) -> Summarizer {
        let api = ApiConfig {
            key: "sk-test".to_string(),
            model: "test-model".to_string(),
            temperature: 0.2,
            // Nothing listens here, every call fails fast.
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
        };
        let limits = LimitsConfig {
            max_emails_per_digest: 50,
            summary_concurrency: 3,
            summary_attempts: attempts,
            fetch_attempts: 1,
            request_timeout_secs: 1,
            run_timeout_secs: 60,
            prompts_per_sec: 100,
        };
        Summarizer::new(
            reqwest::Client::new(),
            &api,
            &limits,
            PromptLimiter::new(limits.prompts_per_sec),
        )
    }

    #[test]
    fn test_degraded_summary_defaults() {
        let msg = test_message("m1", 2);
        let summary = degraded_summary(&msg);
        assert_eq!(summary.message_id, "m1");
        assert_eq!(summary.priority, Priority::Medium);
        assert!(summary.key_points.is_empty());
        assert!(summary.action_items.is_empty());
        assert!(summary.degraded);
    }

    #[test]
    fn test_summary_from_parsed_denormalizes_message_fields() {
        let msg = test_message("m2", 1);
        let parsed = ParsedSummary {
            key_points: vec!["a point".to_string()],
            action_items: vec!["do a thing".to_string()],
            priority: Priority::High,
        };
        let summary = summary_from_parsed(&msg, parsed);
        assert_eq!(summary.sender, msg.sender);
        assert_eq!(summary.subject, msg.subject);
        assert_eq!(summary.received_at, msg.received_at);
        assert_eq!(summary.priority, Priority::High);
        assert!(!summary.degraded);
    }

    #[tokio::test]
    async fn test_batch_never_shrinks_on_failure() {
        // Unreachable service: every message degrades, none is dropped,
        // and the output order matches the input order.
        let summarizer = unreachable_summarizer(1);
        let messages: Vec<_> = (0..5).map(|i| test_message(&format!("m{i}"), i)).collect();

        let summaries = summarizer.summarize_batch(&messages).await;
        assert_eq!(summaries.len(), 5);
        for (msg, summary) in messages.iter().zip(&summaries) {
            assert_eq!(summary.message_id, msg.id);
            assert!(summary.degraded);
            assert_eq!(summary.priority, Priority::Medium);
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let summarizer = unreachable_summarizer(1);
        assert!(summarizer.summarize_batch(&[]).await.is_empty());
    }
}
