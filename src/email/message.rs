use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// One fetched email, owned by the run that fetched it. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Transport-stable identifier, unique within one fetch result.
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub body: String,
}

/// Drop repeated identifiers, keeping the first occurrence. A transport
/// may surface the same logical message from two folders or queries.
pub fn dedup_by_id(messages: Vec<RawMessage>) -> Vec<RawMessage> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect()
}

/// Receipt timestamp ascending, ties broken by identifier so two fetches
/// of the same window always agree on the order.
pub fn sort_deterministic(messages: &mut [RawMessage]) {
    messages.sort_by(|a, b| {
        a.received_at
            .cmp(&b.received_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Apply the per-digest cap: keep the `max` most recent messages
/// (assumes ascending order), returning how many were dropped.
pub fn truncate_to_most_recent(messages: &mut Vec<RawMessage>, max: usize) -> usize {
    if messages.len() <= max {
        return 0;
    }
    let dropped = messages.len() - max;
    messages.drain(..dropped);
    dropped
}

#[cfg(test)]
pub fn test_message(id: &str, hours_ago: i64) -> RawMessage {
    RawMessage {
        id: id.to_string(),
        sender: format!("{id}@example.com"),
        subject: format!("Subject {id}"),
        received_at: Utc::now() - chrono::Duration::hours(hours_ago),
        body: format!("Body of {id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut first = test_message("a", 2);
        first.subject = "original".to_string();
        let mut dupe = test_message("a", 1);
        dupe.subject = "different content, same id".to_string();

        let out = dedup_by_id(vec![first.clone(), dupe, test_message("b", 3)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].subject, "original");
    }

    #[test]
    fn test_sort_breaks_timestamp_ties_by_id() {
        let ts = Utc::now();
        let mut msgs = vec![
            RawMessage {
                received_at: ts,
                ..test_message("b", 0)
            },
            RawMessage {
                received_at: ts,
                ..test_message("a", 0)
            },
        ];
        sort_deterministic(&mut msgs);
        assert_eq!(msgs[0].id, "a");
        assert_eq!(msgs[1].id, "b");
    }

    #[test]
    fn test_truncate_keeps_most_recent() {
        let mut msgs: Vec<_> = (0..5).map(|i| test_message(&i.to_string(), 10 - i)).collect();
        sort_deterministic(&mut msgs);

        let dropped = truncate_to_most_recent(&mut msgs, 2);
        assert_eq!(dropped, 3);
        assert_eq!(msgs.len(), 2);
        // The two with the smallest hours_ago survive.
        assert_eq!(msgs[0].id, "3");
        assert_eq!(msgs[1].id, "4");
    }

    #[test]
    fn test_truncate_noop_under_cap() {
        let mut msgs = vec![test_message("a", 1)];
        assert_eq!(truncate_to_most_recent(&mut msgs, 50), 0);
        assert_eq!(msgs.len(), 1);
    }
}
