pub mod summarizer;

use indoc::{formatdoc, indoc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::digest::report::Priority;

/// Parsed answer from the model's JSON response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSummary {
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub priority: Priority,
}

/// Parse the model's JSON content into a structured summary.
/// Returns None if the shape is wrong or the priority token is not one
/// of High/Medium/Low; the caller then substitutes the degraded summary.
pub fn parse_summary_answer(content: &str) -> Option<ParsedSummary> {
    let parsed: serde_json::Value = serde_json::from_str(content).ok()?;

    let key_points = string_list(parsed.get("key_points")?)?;
    // Tolerate a missing action_items field; an email may simply have none.
    let action_items = match parsed.get("action_items") {
        Some(v) => string_list(v)?,
        None => Vec::new(),
    };
    let priority = Priority::from_str(parsed.get("priority")?.as_str()?.trim()).ok()?;

    Some(ParsedSummary {
        key_points,
        action_items,
        priority,
    })
}

fn string_list(value: &serde_json::Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(|s| s.to_string()))
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatApiErrorDetail {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatApiError {
    pub error: ChatApiErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}

pub const SYSTEM_PROMPT: &str = indoc! {r#"
    You are an assistant that summarizes emails into key points and action items.
    Extract only the most important information and be concise.
    You will only respond with a JSON object with the keys key_points,
    action_items, and priority.
    "key_points" is a list of 2-5 short strings with the main points.
    "action_items" is a list of strings with actions the reader must take (may be empty).
    "priority" is exactly one of "High", "Medium" or "Low", based on urgency and importance.
    Do not provide explanations."#
};

/// Build the user prompt for one email summarization call.
pub fn summary_user_prompt(sender: &str, subject: &str, body: &str) -> String {
    formatdoc!(
        r#"Summarize the following email and extract key information.

        <sender>{}</sender>
        <subject>{}</subject>
        <body>{}</body>"#,
        sender,
        subject,
        body
    )
}
