// Permit Lookup - read-only retrieval for the print screen

use tracing::debug;

use crate::error::{QueueError, Result};
use crate::model::{PermitRecord, QueueNumber};
use crate::store::DocumentStore;

pub struct PermitLookup<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> PermitLookup<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Permit issued under `number`, or `NotFound`.
    pub fn fetch_permit(&self, number: QueueNumber) -> Result<PermitRecord> {
        debug!(queue_number = %number, "fetching permit");
        self.store
            .get_permit(number)?
            .ok_or_else(|| QueueError::NotFound(format!("no permit found for queue number {number}")))
    }

    /// Lookup for a number typed at the print screen.
    pub fn fetch_permit_str(&self, number: &str) -> Result<PermitRecord> {
        if number.trim().is_empty() {
            return Err(QueueError::Validation("queue number is required".to_string()));
        }
        self.fetch_permit(QueueNumber::parse(number)?)
    }
}
