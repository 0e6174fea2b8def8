use std::time::Duration;

use crate::digest::mailer::{DeliveryOutcome, DigestMailer};
use crate::digest::report::{DigestReport, Period};
use crate::email::source::MessageSource;
use crate::error::{DigestError, DigestResult};
use crate::prompt::summarizer::Summarizer;

/// What a completed run produced, for logging and exit reporting.
#[derive(Debug)]
pub struct RunOutcome {
    pub delivery: DeliveryOutcome,
    pub email_count: usize,
    pub high_priority_count: usize,
    pub truncated: usize,
}

/// One digest run, stage by stage. Owns the three collaborators for the
/// process lifetime; the scheduler (or one-shot mode) drives it.
pub struct DigestPipeline {
    source: MessageSource,
    summarizer: Summarizer,
    mailer: DigestMailer,
    run_timeout: Duration,
}

impl DigestPipeline {
    pub fn new(
        source: MessageSource,
        summarizer: Summarizer,
        mailer: DigestMailer,
        run_timeout: Duration,
    ) -> Self {
        Self {
            source,
            summarizer,
            mailer,
            run_timeout,
        }
    }

    /// Execute one run under the overall time budget. A stuck run is
    /// abandoned so it cannot block the next scheduled trigger.
    pub async fn run(&self, period: Period, cutoff_hours: u32) -> DigestResult<RunOutcome> {
        match tokio::time::timeout(self.run_timeout, self.run_inner(period, cutoff_hours)).await {
            Ok(result) => result,
            Err(_) => Err(DigestError::RunTimeout(self.run_timeout.as_secs())),
        }
    }

    async fn run_inner(&self, period: Period, cutoff_hours: u32) -> DigestResult<RunOutcome> {
        tracing::info!(%period, cutoff_hours, "Starting digest run");

        let fetched = self.source.fetch(cutoff_hours).await?;
        tracing::info!(count = fetched.messages.len(), "Fetched messages");

        let summaries = self.summarizer.summarize_batch(&fetched.messages).await;
        debug_assert_eq!(summaries.len(), fetched.messages.len());
        tracing::info!(count = summaries.len(), "Generated summaries");

        let report = DigestReport::build(period, summaries, fetched.truncated);
        let outcome = RunOutcome {
            email_count: report.email_count,
            high_priority_count: report.high_priority_count,
            truncated: report.truncated,
            delivery: self.mailer.deliver(&report).await?,
        };

        tracing::info!(
            %period,
            email_count = outcome.email_count,
            high_priority = outcome.high_priority_count,
            delivery = ?outcome.delivery,
            "Digest run complete"
        );
        Ok(outcome)
    }
}
