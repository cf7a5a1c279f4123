// Claim Recorder - commits a pending claim for a resolved identity
//
// One insert on success, none on failure. Nothing is retried here: a
// duplicate means the caller asks the sequencer for a fresh number.

use std::time::Instant;
use tracing::{info, warn};

use crate::error::{QueueError, Result};
use crate::model::{Identity, QueueEntry, QueueNumber};
use crate::sequencer::QueueSequencer;
use crate::store::DocumentStore;

pub struct ClaimRecorder<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    deadline: Option<Instant>,
}

impl<'a, S: DocumentStore + ?Sized> ClaimRecorder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            deadline: None,
        }
    }

    /// Refuse to commit once `deadline` has passed. The write is rolled
    /// back and the claim fails with `Timeout`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Record a pending claim for `identity` under `number`.
    pub fn record_claim(&self, identity: &Identity, number: QueueNumber) -> Result<QueueEntry> {
        identity.validate()?;

        if QueueSequencer::new(self.store).is_duplicate(number)? {
            warn!(queue_number = %number, "queue number already taken, refusing claim");
            return Err(QueueError::DuplicateQueueNumber(number));
        }

        let entry = QueueEntry::pending(identity, number);
        self.store.commit_queue_entry(&entry, self.deadline)?;

        info!(
            queue_number = %number,
            student_number = %identity.student_number,
            "recorded pending claim"
        );
        Ok(entry)
    }

    /// Same as [`record_claim`](Self::record_claim) for a number typed or
    /// scanned as text.
    pub fn record_claim_str(&self, identity: &Identity, number: &str) -> Result<QueueEntry> {
        if number.trim().is_empty() {
            return Err(QueueError::Validation("queue number is required".to_string()));
        }
        self.record_claim(identity, QueueNumber::parse(number)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
