// Permit Queue - Core Library
// Exposes the queue modules for the kiosk CLI, the API server, and tests

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod kiosk;
pub mod model;
pub mod permit;
pub mod recorder;
pub mod sequencer;
pub mod service;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ConfigError, PermitQueueConfig};
pub use db::{
    SqliteStore,
    setup_database, secret_digest,
    get_queue_entries, count_queue_entries, upsert_account, upsert_permit,
};
pub use error::QueueError;
pub use identity::{IdentityResolver, AccountRow, load_accounts_csv, import_accounts};
pub use kiosk::{KioskEvent, KioskState, ScanBuffer, ScanKey};
pub use model::{
    ClaimStatus, Identity, PermitRecord, QueueEntry, QueueNumber, Resolution,
};
pub use permit::PermitLookup;
pub use recorder::ClaimRecorder;
pub use sequencer::QueueSequencer;
pub use service::QueueService;
pub use store::DocumentStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
