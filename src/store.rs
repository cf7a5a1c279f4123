// Document Store - the storage seam behind every queue operation
//
// The kiosk only needs a handful of operations over three collections:
// `QueueDatabase` (claims), `accountuz` (accounts) and `ClaimingPermit`
// (permits). Calls are blocking; the async service moves them onto the
// blocking pool.

use std::time::Instant;

use crate::error::Result;
use crate::model::{Identity, PermitRecord, QueueEntry, QueueNumber};

/// Collection holding queue entries.
pub const QUEUE_COLLECTION: &str = "QueueDatabase";
/// Collection holding student accounts.
pub const ACCOUNT_COLLECTION: &str = "accountuz";
/// Collection holding permits keyed by queue number.
pub const PERMIT_COLLECTION: &str = "ClaimingPermit";

pub trait DocumentStore: Send + Sync {
    /// Entry with the highest queue number, if any.
    fn max_queue_number(&self) -> Result<Option<QueueNumber>>;

    /// Number of entries whose queue number equals `number`.
    fn count_queue_number(&self, number: QueueNumber) -> Result<usize>;

    /// Add one entry. Fails with `DuplicateQueueNumber` if the store already
    /// holds that number.
    fn add_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        self.commit_queue_entry(entry, None)
    }

    /// Write one entry as a single transaction. If `deadline` has passed
    /// once the write is ready, roll it back and fail with `Timeout`: a
    /// failed call leaves no entry behind.
    fn commit_queue_entry(&self, entry: &QueueEntry, deadline: Option<Instant>) -> Result<()>;

    /// First account whose secret matches.
    fn find_identity(&self, secret: &str) -> Result<Option<Identity>>;

    /// Permit stored under `number`.
    fn get_permit(&self, number: QueueNumber) -> Result<Option<PermitRecord>>;
}
