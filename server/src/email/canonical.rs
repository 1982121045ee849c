use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::timestamp::resolve_timestamp;

pub const NO_SUBJECT: &str = "(No Subject)";
pub const UNREAD_LABEL: &str = "UNREAD";

/// Webhook envelopes nest the message one level down under this key
const ENVELOPE_KEY: &str = "data";

/// How many leading characters of a text body are searched for a `<table` tag
const HTML_SNIFF_WINDOW: usize = 500;

// Source field names per canonical field, in priority order. New aliases go at the end.
const MESSAGE_ID_ALIASES: &[&str] = &["messageId", "id", "message_id"];
const THREAD_ID_ALIASES: &[&str] = &["threadId", "thread_id"];
const SUBJECT_ALIASES: &[&str] = &["subject"];
const SENDER_ALIASES: &[&str] = &["sender", "from"];
const RECIPIENT_ALIASES: &[&str] = &["to", "recipient"];
const TEXT_BODY_ALIASES: &[&str] = &["messageText", "body", "bodyText", "text"];
const HTML_BODY_ALIASES: &[&str] = &["bodyHtml", "html"];
const SNIPPET_ALIASES: &[&str] = &["preview", "snippet"];
const LABEL_ALIASES: &[&str] = &["labelIds", "labels"];
const TIMESTAMP_ALIASES: &[&str] = &["messageTimestamp", "date", "internalDate", "received_at"];

/// Maps a raw connector payload onto the canonical record. See [`CanonicalEmail::from_payload`].
pub fn normalize(payload: Value) -> CanonicalEmail {
    CanonicalEmail::from_payload(payload)
}

/// Storage-ready representation of one email, built from a webhook delivery or a fetched
/// message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalEmail {
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body_text: String,
    pub body_html: String,
    pub snippet: String,
    pub labels: Vec<String>,
    pub is_read: bool,
    pub received_at: DateTime<Utc>,
    /// The payload exactly as it was received, envelope included
    pub raw_payload: Value,
}

impl CanonicalEmail {
    /// Normalizes a raw connector payload. Never fails: missing or malformed fields fall
    /// back to their defaults, and an unresolvable `message_id` is left empty for the caller
    /// to reject.
    pub fn from_payload(payload: Value) -> Self {
        let fields = PayloadFields::unwrap_envelope(&payload);

        let (body_text, body_html) = split_bodies(
            fields.text(TEXT_BODY_ALIASES).unwrap_or_default(),
            fields.text(HTML_BODY_ALIASES).unwrap_or_default(),
        );
        let labels = fields.labels(LABEL_ALIASES);
        let is_read = !labels.iter().any(|label| label == UNREAD_LABEL);

        let message_id = fields.text(MESSAGE_ID_ALIASES).unwrap_or_default();
        let thread_id = fields.text(THREAD_ID_ALIASES).unwrap_or_default();
        let subject = fields
            .text(SUBJECT_ALIASES)
            .unwrap_or_else(|| NO_SUBJECT.to_string());
        let sender = fields.text(SENDER_ALIASES).unwrap_or_default();
        let recipient = fields.text(RECIPIENT_ALIASES).unwrap_or_default();
        let snippet = fields.text(SNIPPET_ALIASES).unwrap_or_default();
        let received_at = resolve_timestamp(fields.first_present(TIMESTAMP_ALIASES));

        CanonicalEmail {
            message_id,
            thread_id,
            subject,
            sender,
            recipient,
            body_text,
            body_html,
            snippet,
            labels,
            is_read,
            received_at,
            raw_payload: payload,
        }
    }

    pub fn has_message_id(&self) -> bool {
        !self.message_id.is_empty()
    }
}

/// The mapping fields are read from: the `data` object of an envelope, else the payload
/// itself. Non-object payloads have no fields.
struct PayloadFields<'a> {
    fields: Option<&'a Map<String, Value>>,
}

impl<'a> PayloadFields<'a> {
    fn unwrap_envelope(payload: &'a Value) -> Self {
        let top_level = payload.as_object();
        let nested = top_level
            .and_then(|fields| fields.get(ENVELOPE_KEY))
            .and_then(Value::as_object);

        PayloadFields {
            fields: nested.or(top_level),
        }
    }

    /// First alias holding a non-empty value
    fn first_present(&self, aliases: &[&str]) -> Option<&'a Value> {
        let fields = self.fields?;
        aliases
            .iter()
            .filter_map(|alias| fields.get(*alias))
            .find(|value| is_present(value))
    }

    /// First alias holding a non-empty string or a non-zero number, as text
    fn text(&self, aliases: &[&str]) -> Option<String> {
        let fields = self.fields?;
        aliases
            .iter()
            .filter_map(|alias| fields.get(*alias))
            .find_map(|value| match value {
                Value::String(text) if !text.is_empty() => Some(text.clone()),
                Value::Number(number) if is_present(value) => Some(number.to_string()),
                _ => None,
            })
    }

    /// First alias holding a non-empty list; only string entries are kept, in order
    fn labels(&self, aliases: &[&str]) -> Vec<String> {
        let Some(fields) = self.fields else {
            return Vec::new();
        };

        aliases
            .iter()
            .filter_map(|alias| fields.get(*alias))
            .find_map(|value| match value {
                Value::Array(items) if !items.is_empty() => Some(items),
                _ => None,
            })
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(true, |n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

/// Returns `(body_text, body_html)`. A text body that is really an HTML document is moved
/// into the HTML slot when no explicit HTML body was supplied.
fn split_bodies(text: String, html: String) -> (String, String) {
    if !text.is_empty() && html.is_empty() && looks_like_html(&text) {
        return (String::new(), text);
    }

    (text, html)
}

fn looks_like_html(text: &str) -> bool {
    let lowered = text.to_lowercase();
    let lowered = lowered.trim();

    if lowered.starts_with("<!doctype") || lowered.starts_with("<html") {
        return true;
    }

    let window_end = lowered
        .char_indices()
        .nth(HTML_SNIFF_WINDOW)
        .map_or(lowered.len(), |(offset, _)| offset);

    lowered[..window_end].contains("<table")
}
