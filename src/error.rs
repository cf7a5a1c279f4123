// Queue Errors - taxonomy shared by every queue operation

use thiserror::Error;

use crate::model::QueueNumber;

/// Errors surfaced by the sequencer, recorder, lookups and the service.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No record matched the requested key.
    #[error("No record found: {0}")]
    NotFound(String),

    /// The queue number was already taken when the claim was committed.
    #[error("Queue number {0} is already taken")]
    DuplicateQueueNumber(QueueNumber),

    /// The store could not be reached or failed.
    #[error("Store transport failed: {0}")]
    Transport(String),

    /// The store did not answer within the configured timeout. A write
    /// that hits this is rolled back. Reported as a transport failure.
    #[error("Store transport failed: {op} timed out")]
    Timeout { op: &'static str },

    /// Required input was missing or malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The three-digit sequence is exhausted.
    #[error("Queue sequence exhausted after {0}")]
    Overflow(QueueNumber),
}

impl QueueError {
    /// Short machine-readable tag, used in API responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QueueError::NotFound(_) => "not_found",
            QueueError::DuplicateQueueNumber(_) => "duplicate_queue_number",
            QueueError::Transport(_) | QueueError::Timeout { .. } => "transport",
            QueueError::Validation(_) => "validation",
            QueueError::Overflow(_) => "overflow",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, QueueError::Timeout { .. })
    }
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Transport(e.to_string())
    }
}

pub type Result<T, E = QueueError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_errors_become_transport() {
        let err: QueueError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind(), "transport");
    }

    #[test]
    fn timeout_is_a_transport_failure() {
        let err = QueueError::Timeout { op: "record_claim" };
        assert_eq!(err.kind(), "transport");
        assert!(err.is_timeout());
        assert!(!QueueError::Transport("connection refused".to_string()).is_timeout());
        assert_eq!(err.to_string(), "Store transport failed: record_claim timed out");
    }

    #[test]
    fn duplicate_message_names_the_number() {
        let number = QueueNumber::parse("UZ007").unwrap();
        let err = QueueError::DuplicateQueueNumber(number);
        assert_eq!(err.to_string(), "Queue number UZ007 is already taken");
    }
}
