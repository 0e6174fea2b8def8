use chrono::{DateTime, Utc};
use strum::{Display, EnumString};

/// Urgency classification assigned during summarization. Anything the
/// service returns outside this set degrades to Medium upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Which scheduled run a digest belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Period {
    Morning,
    Evening,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::Morning => "Morning",
            Period::Evening => "Evening",
        }
    }
}

/// Structured summary of exactly one fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSummary {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub priority: Priority,
    /// True when the fallback summary was used because the service
    /// failed or returned an unparseable answer.
    pub degraded: bool,
}

/// Aggregate over one run. Counts are computed from the summaries at
/// build time and can never drift from them.
#[derive(Debug, Clone)]
pub struct DigestReport {
    pub period: Period,
    pub generated_at: DateTime<Utc>,
    pub email_count: usize,
    pub high_priority_count: usize,
    /// Number of fetched messages dropped by the per-digest cap.
    pub truncated: usize,
    /// Fetch order, preserved.
    pub summaries: Vec<EmailSummary>,
}

impl DigestReport {
    /// Pure aggregation: no I/O, cannot fail. An empty summary list
    /// yields a valid zero-count report. The caller passes summaries
    /// already in fetch order.
    pub fn build(period: Period, summaries: Vec<EmailSummary>, truncated: usize) -> Self {
        let high_priority_count = summaries
            .iter()
            .filter(|s| s.priority == Priority::High)
            .count();

        Self {
            period,
            generated_at: Utc::now(),
            email_count: summaries.len(),
            high_priority_count,
            truncated,
            summaries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

#[cfg(test)]
pub fn test_summary(id: &str, priority: Priority) -> EmailSummary {
    EmailSummary {
        message_id: id.to_string(),
        sender: format!("{id}@example.com"),
        subject: format!("Subject {id}"),
        received_at: Utc::now(),
        key_points: vec![format!("point about {id}")],
        action_items: vec![],
        priority,
        degraded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_counts_computed_from_summaries() {
        // Ten messages, three classified High.
        let mut summaries: Vec<_> = (0..7)
            .map(|i| test_summary(&format!("m{i}"), Priority::Medium))
            .collect();
        summaries.extend((7..10).map(|i| test_summary(&format!("m{i}"), Priority::High)));

        let report = DigestReport::build(Period::Morning, summaries, 0);
        assert_eq!(report.email_count, 10);
        assert_eq!(report.high_priority_count, 3);
    }

    #[test]
    fn test_empty_input_yields_zero_count_report() {
        let report = DigestReport::build(Period::Evening, vec![], 0);
        assert_eq!(report.email_count, 0);
        assert_eq!(report.high_priority_count, 0);
        assert!(report.is_empty());
    }

    #[test]
    fn test_build_is_idempotent_modulo_timestamp() {
        let summaries = vec![
            test_summary("a", Priority::High),
            test_summary("b", Priority::Low),
        ];
        let first = DigestReport::build(Period::Morning, summaries.clone(), 2);
        let second = DigestReport::build(Period::Morning, summaries, 2);

        assert_eq!(first.period, second.period);
        assert_eq!(first.email_count, second.email_count);
        assert_eq!(first.high_priority_count, second.high_priority_count);
        assert_eq!(first.truncated, second.truncated);
        assert_eq!(first.summaries, second.summaries);
    }

    #[test]
    fn test_input_order_preserved() {
        let summaries = vec![
            test_summary("z", Priority::Low),
            test_summary("a", Priority::High),
            test_summary("m", Priority::Medium),
        ];
        let report = DigestReport::build(Period::Morning, summaries, 0);
        let ids: Vec<_> = report.summaries.iter().map(|s| s.message_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_priority_parses_case_insensitively() {
        assert_eq!(Priority::from_str("high").unwrap(), Priority::High);
        assert_eq!(Priority::from_str("MEDIUM").unwrap(), Priority::Medium);
        assert!(Priority::from_str("urgent").is_err());
    }

    #[test]
    fn test_period_display() {
        assert_eq!(Period::Morning.to_string(), "morning");
        assert_eq!(Period::Evening.label(), "Evening");
    }
}
