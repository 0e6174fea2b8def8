use regex::Regex;

const RE_WHITESPACE_STR: &str = r"[\r\t\n]+";
const RE_LONG_SPACE_STR: &str = r" {2,}";
const RE_DIVIDERS_STR: &str = r"[-=_]{3,}";
const RE_HTTP_LINK_STR: &str = r"https?:\/\/(www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_\+.~#?&//=]*)";

lazy_static::lazy_static!(
    static ref RE_WHITESPACE: Regex = Regex::new(RE_WHITESPACE_STR).unwrap();
    static ref RE_LONG_SPACE: Regex = Regex::new(RE_LONG_SPACE_STR).unwrap();
    static ref RE_DIVIDERS: Regex = Regex::new(RE_DIVIDERS_STR).unwrap();
    static ref RE_HTTP_LINK: Regex = Regex::new(RE_HTTP_LINK_STR).unwrap();
);

/// Cap on cleaned body length sent to the summarization service.
const MAX_BODY_CHARS: usize = 8_000;

/// Flatten an email body to prompt-ready plain text: render any HTML,
/// replace bare URLs with a placeholder, collapse whitespace and
/// decorative dividers, and cap the length.
pub fn clean_body(body: &str) -> String {
    let text = if looks_like_html(body) {
        html2text::from_read(body.as_bytes(), 400)
    } else {
        body.to_string()
    };

    let text = RE_HTTP_LINK.replace_all(&text, "[LINK]");
    let text = RE_WHITESPACE.replace_all(&text, " ");
    let text = RE_DIVIDERS.replace_all(&text, " ");
    let text = RE_LONG_SPACE.replace_all(&text, " ");
    let text = text.trim();

    match text.char_indices().nth(MAX_BODY_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn looks_like_html(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("<html") || lower.contains("<body") || lower.contains("<div")
}
