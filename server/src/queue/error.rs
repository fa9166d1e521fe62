//! Queue-engine error type: one variant per error code surfaced to
//! protocol front-ends (of the design).

use thiserror::Error;

use crate::store::StorageError;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("no message available")]
    NoMessage,

    #[error("topic does not exist: {0}")]
    TopicNotExisted(String),

    #[error("line does not exist: {0}")]
    LineNotExisted(String),

    #[error("id not in delivered state: {0}")]
    NotDelivered(String),

    #[error("bad key format: {0}")]
    BadKey(String),

    #[error("topic already exists: {0}")]
    TopicExisted(String),

    #[error("line already exists: {0}")]
    LineExisted(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Numeric code surfaced to protocol front-ends.
    pub fn code(&self) -> u32 {
        match self {
            Self::NoMessage => 100,
            Self::TopicNotExisted(_) => 101,
            Self::LineNotExisted(_) => 102,
            Self::NotDelivered(_) => 103,
            Self::BadKey(_) => 104,
            Self::TopicExisted(_) => 105,
            Self::LineExisted(_) => 106,
            Self::BadRequest(_) => 400,
            Self::Internal(_) => 500,
        }
    }
}

impl From<StorageError> for QueueError {
    fn from(e: StorageError) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_table() {
        assert_eq!(QueueError::NoMessage.code(), 100);
        assert_eq!(QueueError::TopicNotExisted(String::new()).code(), 101);
        assert_eq!(QueueError::LineNotExisted(String::new()).code(), 102);
        assert_eq!(QueueError::NotDelivered(String::new()).code(), 103);
        assert_eq!(QueueError::BadKey(String::new()).code(), 104);
        assert_eq!(QueueError::TopicExisted(String::new()).code(), 105);
        assert_eq!(QueueError::LineExisted(String::new()).code(), 106);
        assert_eq!(QueueError::BadRequest(String::new()).code(), 400);
        assert_eq!(QueueError::Internal(String::new()).code(), 500);
    }
}
