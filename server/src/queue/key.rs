//! Key dispatch: splits a path-like `"topic"`, `"topic/line"`, or
//! `"topic/line/<id>"` key into its segments.

use super::error::QueueError;

/// A parsed dispatch key, one segment per addressable level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Topic(String),
    Line(String, String),
    Message(String, String, u64),
}

/// Split `key` by `/`, trimming leading/trailing separators, and classify it
/// by segment count. Every segment must be non-empty.
pub fn parse(key: &str) -> Result<Key, QueueError> {
    let trimmed = key.trim_matches('/');
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();

    if segments.len() != trimmed.split('/').count() {
        return Err(QueueError::BadKey(format!("empty segment in key '{key}'")));
    }

    match segments.as_slice() {
        [topic] => Ok(Key::Topic(topic.to_string())),
        [topic, line] => Ok(Key::Line(topic.to_string(), line.to_string())),
        [topic, line, id] => {
            let id: u64 = id
                .parse()
                .map_err(|_| QueueError::BadKey(format!("non-numeric id in key '{key}'")))?;
            Ok(Key::Message(topic.to_string(), line.to_string(), id))
        }
        _ => Err(QueueError::BadKey(format!("too many segments in key '{key}'"))),
    }
}
