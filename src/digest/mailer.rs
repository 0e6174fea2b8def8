use anyhow::Context;
use chrono_tz::Tz;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use minijinja::render;
use serde::Serialize;

use crate::config::SmtpConfig;
use crate::error::{DigestError, DigestResult};

use super::report::{DigestReport, EmailSummary, Priority};
use super::template::DIGEST_EMAIL_TEMPLATE;

/// Result of one delivery decision.
#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// Empty report and the empty-digest policy is off; nothing was sent.
    Suppressed,
}

#[derive(Debug, Serialize)]
struct SummaryView {
    sender: String,
    subject: String,
    time: String,
    priority: String,
    priority_class: String,
    key_points: Vec<String>,
    action_items: Vec<String>,
    degraded: bool,
}

#[derive(Debug, Serialize)]
struct SectionView {
    title: String,
    items: Vec<SummaryView>,
}

pub struct DigestMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
    send_empty: bool,
    display_tz: Tz,
}

impl DigestMailer {
    /// Parses all addresses up front so a bad recipient list fails at
    /// startup, not at the first scheduled send.
    pub fn new(
        smtp: &SmtpConfig,
        recipients: &[String],
        send_empty: bool,
        display_tz: Tz,
    ) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
            .context("Could not configure SMTP relay")?
            .credentials(Credentials::new(
                smtp.username.clone(),
                smtp.password.clone(),
            ))
            .build();

        let from = smtp
            .from_address
            .parse()
            .context("smtp.from_address is not a valid mailbox")?;
        let recipients = recipients
            .iter()
            .map(|r| {
                r.parse()
                    .context(format!("delivery recipient is not a valid mailbox: {r}"))
            })
            .collect::<anyhow::Result<Vec<Mailbox>>>()?;

        Ok(Self {
            transport,
            from,
            recipients,
            send_empty,
            display_tz,
        })
    }

    /// Send the rendered report unless the empty-digest policy
    /// suppresses it. Exactly one SMTP attempt; the next scheduled
    /// firing is the retry.
    pub async fn deliver(&self, report: &DigestReport) -> DigestResult<DeliveryOutcome> {
        if report.is_empty() && !self.send_empty {
            tracing::info!(period = %report.period, "Empty digest suppressed by policy");
            return Ok(DeliveryOutcome::Suppressed);
        }

        let message = self
            .build_message(report)
            .map_err(DigestError::Internal)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DigestError::DeliveryFailed(e.into()))?;

        tracing::info!(
            period = %report.period,
            recipients = self.recipients.len(),
            "Digest sent"
        );
        Ok(DeliveryOutcome::Sent)
    }

    fn build_message(&self, report: &DigestReport) -> anyhow::Result<lettre::Message> {
        let (plain, html) = self.render(report);

        let mut builder = lettre::Message::builder()
            .from(self.from.clone())
            .subject(subject_line(report));
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        builder
            .multipart(MultiPart::alternative_plain_html(plain, html))
            .context("Could not build digest message")
    }

    /// Deterministic report-to-text transformation. Summaries are
    /// grouped High/Medium/Low for display, fetch order kept inside
    /// each group.
    pub fn render(&self, report: &DigestReport) -> (String, String) {
        let period_name = report.period.label();
        let date_line = report
            .generated_at
            .with_timezone(&self.display_tz)
            .format("%A, %B %d, %Y")
            .to_string();
        let sections = self.sections(report);
        let plain = self.render_plain(report, &date_line, &sections);

        let html = render!(
            DIGEST_EMAIL_TEMPLATE,
            period_name,
            date_line,
            email_count => report.email_count,
            high_priority_count => report.high_priority_count,
            truncated => report.truncated,
            sections
        );

        (plain, html)
    }

    fn sections(&self, report: &DigestReport) -> Vec<SectionView> {
        [
            ("High Priority", Priority::High),
            ("Medium Priority", Priority::Medium),
            ("Low Priority", Priority::Low),
        ]
        .into_iter()
        .filter_map(|(title, priority)| {
            let items: Vec<SummaryView> = report
                .summaries
                .iter()
                .filter(|s| s.priority == priority)
                .map(|s| self.summary_view(s))
                .collect();
            (!items.is_empty()).then(|| SectionView {
                title: title.to_string(),
                items,
            })
        })
        .collect()
    }

    fn summary_view(&self, summary: &EmailSummary) -> SummaryView {
        SummaryView {
            sender: summary.sender.clone(),
            subject: summary.subject.clone(),
            time: summary
                .received_at
                .with_timezone(&self.display_tz)
                .format("%I:%M %p")
                .to_string(),
            priority: summary.priority.to_string(),
            priority_class: summary.priority.to_string().to_lowercase(),
            key_points: summary.key_points.clone(),
            action_items: summary.action_items.clone(),
            degraded: summary.degraded,
        }
    }

    fn render_plain(
        &self,
        report: &DigestReport,
        date_line: &str,
        sections: &[SectionView],
    ) -> String {
        let mut out = format!(
            "{} Email Digest\n{}\nTotal emails: {} | High priority: {}\n",
            report.period.label(),
            date_line,
            report.email_count,
            report.high_priority_count
        );
        if report.truncated > 0 {
            out.push_str(&format!(
                "({} older emails omitted to keep this digest within its cap)\n",
                report.truncated
            ));
        }
        if report.is_empty() {
            out.push_str("\nNo new emails during this period.\n");
            return out;
        }
        for section in sections {
            out.push_str(&format!("\n== {} ==\n", section.title));
            for item in &section.items {
                out.push_str(&format!(
                    "\n[{}] {} - {} ({})\n",
                    item.priority, item.sender, item.subject, item.time
                ));
                if item.degraded {
                    out.push_str("  (automatic summarization unavailable)\n");
                }
                for point in &item.key_points {
                    out.push_str(&format!("  * {point}\n"));
                }
                for action in &item.action_items {
                    out.push_str(&format!("  ! {action}\n"));
                }
            }
        }
        out
    }
}

fn subject_line(report: &DigestReport) -> String {
    format!(
        "{} Email Digest: {} emails ({} high priority)",
        report.period.label(),
        report.email_count,
        report.high_priority_count
    )
}
