// Queue Service - async facade over the queue components
//
// Every store call runs on the blocking pool. Reads are bounded by a timeout
// on the caller side; writes carry a deadline into the store, which rolls
// back instead of committing late. Issuance (next number + record) is
// serialized through one lock per process; the store's unique index covers
// several processes sharing a database.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::PermitQueueConfig;
use crate::db::SqliteStore;
use crate::error::{QueueError, Result};
use crate::identity::IdentityResolver;
use crate::model::{Identity, PermitRecord, QueueEntry, QueueNumber, Resolution};
use crate::permit::PermitLookup;
use crate::recorder::ClaimRecorder;
use crate::sequencer::QueueSequencer;
use crate::store::DocumentStore;

pub struct QueueService {
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
    max_reissue_attempts: u32,
    issuance: Mutex<()>,
}

impl QueueService {
    pub fn new(store: Arc<dyn DocumentStore>, timeout: Duration, max_reissue_attempts: u32) -> Self {
        Self {
            store,
            timeout,
            max_reissue_attempts,
            issuance: Mutex::new(()),
        }
    }

    /// Open the configured SQLite database and wrap it.
    pub fn from_config(config: &PermitQueueConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.store.path)?;
        store.set_busy_timeout(config.store.timeout())?;
        Ok(Self::new(
            Arc::new(store),
            config.store.timeout(),
            config.queue.max_reissue_attempts,
        ))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a read-only store call, bounded by the configured timeout.
    async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn DocumentStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let handle = tokio::task::spawn_blocking(move || f(&*store));

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(QueueError::Transport(format!("{op} task failed: {join}"))),
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "store call timed out");
                Err(QueueError::Timeout { op })
            }
        }
    }

    /// Run a store write that must not outlive the timeout. The deadline
    /// travels into the store, and the caller waits for the final outcome,
    /// so an error here always means nothing was committed.
    async fn write<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn DocumentStore, Instant) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let deadline = Instant::now() + self.timeout;

        let result = tokio::task::spawn_blocking(move || f(&*store, deadline))
            .await
            .map_err(|join| QueueError::Transport(format!("{op} task failed: {join}")))?;

        if let Err(QueueError::Timeout { .. }) = &result {
            warn!(op, timeout_ms = self.timeout.as_millis() as u64, "store write rolled back after timeout");
            return Err(QueueError::Timeout { op });
        }
        result
    }

    // ========================================================================
    // CORE OPERATIONS
    // ========================================================================

    pub async fn next_queue_number(&self) -> Result<QueueNumber> {
        self.call("next_queue_number", |store| {
            QueueSequencer::new(store).next_queue_number()
        })
        .await
    }

    pub async fn is_duplicate(&self, candidate: QueueNumber) -> Result<bool> {
        self.call("is_duplicate", move |store| {
            QueueSequencer::new(store).is_duplicate(candidate)
        })
        .await
    }

    pub async fn record_claim(&self, identity: Identity, number: QueueNumber) -> Result<QueueEntry> {
        self.write("record_claim", move |store, deadline| {
            ClaimRecorder::new(store)
                .with_deadline(deadline)
                .record_claim(&identity, number)
        })
        .await
    }

    pub async fn resolve_identity(&self, secret: &str) -> Result<Resolution> {
        let secret = secret.to_string();
        self.call("resolve_identity", move |store| {
            IdentityResolver::new(store).resolve(&secret)
        })
        .await
    }

    pub async fn fetch_permit(&self, number: QueueNumber) -> Result<PermitRecord> {
        self.call("fetch_permit", move |store| {
            PermitLookup::new(store).fetch_permit(number)
        })
        .await
    }

    // ========================================================================
    // KIOSK FLOW
    // ========================================================================

    /// Scan → resolve → issue. An unknown secret is `NotFound`.
    pub async fn enqueue(&self, secret: &str) -> Result<QueueEntry> {
        match self.resolve_identity(secret).await? {
            Resolution::Found(identity) => self.issue_claim(identity).await,
            Resolution::NotFound => Err(QueueError::NotFound(
                "no account matches the scanned code".to_string(),
            )),
        }
    }

    /// Compute the next number and record it, requesting a fresh number
    /// after each duplicate up to the configured limit.
    pub async fn issue_claim(&self, identity: Identity) -> Result<QueueEntry> {
        self.issue_claim_with(identity, |_| {}).await
    }

    /// Like [`issue_claim`](Self::issue_claim), calling `on_candidate` with
    /// each number just before it is recorded.
    pub async fn issue_claim_with<F>(&self, identity: Identity, mut on_candidate: F) -> Result<QueueEntry>
    where
        F: FnMut(QueueNumber),
    {
        identity.validate()?;
        let _guard = self.issuance.lock().await;

        let mut attempt = 0;
        loop {
            let number = self.next_queue_number().await?;
            on_candidate(number);
            match self.record_claim(identity.clone(), number).await {
                Ok(entry) => {
                    info!(queue_number = %entry.queue_number, attempt, "issued queue number");
                    return Ok(entry);
                }
                Err(QueueError::DuplicateQueueNumber(taken)) if attempt < self.max_reissue_attempts => {
                    attempt += 1;
                    warn!(queue_number = %taken, attempt, "queue number taken, reissuing");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_queue_entries, upsert_account, upsert_permit};
    use crate::model::ClaimStatus;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn identity(student_number: &str) -> Identity {
        Identity {
            name: format!("Student {student_number}"),
            email: format!("{student_number}@uz.edu.ph"),
            student_number: student_number.to_string(),
            cellphone_number: "09170000000".to_string(),
        }
    }

    fn number(raw: &str) -> QueueNumber {
        QueueNumber::parse(raw).unwrap()
    }

    fn seeded_store() -> Arc<SqliteStore> {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .with_connection(|conn| {
                upsert_account(conn, "QR-0001", &identity("2021-0001"))?;
                upsert_account(conn, "QR-0002", &identity("2021-0002"))
            })
            .unwrap();
        Arc::new(store)
    }

    fn service(store: Arc<SqliteStore>) -> QueueService {
        QueueService::new(store, Duration::from_secs(10), 3)
    }

    /// Forwards to SQLite after an artificial delay.
    struct SlowStore {
        inner: Arc<SqliteStore>,
        delay: Duration,
    }

    impl DocumentStore for SlowStore {
        fn max_queue_number(&self) -> Result<Option<QueueNumber>> {
            std::thread::sleep(self.delay);
            self.inner.max_queue_number()
        }
        fn count_queue_number(&self, number: QueueNumber) -> Result<usize> {
            self.inner.count_queue_number(number)
        }
        fn commit_queue_entry(&self, entry: &QueueEntry, deadline: Option<Instant>) -> Result<()> {
            std::thread::sleep(self.delay);
            self.inner.commit_queue_entry(entry, deadline)
        }
        fn find_identity(&self, secret: &str) -> Result<Option<Identity>> {
            self.inner.find_identity(secret)
        }
        fn get_permit(&self, number: QueueNumber) -> Result<Option<PermitRecord>> {
            std::thread::sleep(self.delay);
            self.inner.get_permit(number)
        }
    }

    /// Reports an empty queue on the first max read, like a kiosk that read
    /// before another kiosk committed.
    struct StaleOnceStore {
        inner: Arc<SqliteStore>,
        stale: AtomicBool,
    }

    impl DocumentStore for StaleOnceStore {
        fn max_queue_number(&self) -> Result<Option<QueueNumber>> {
            if self.stale.swap(false, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.max_queue_number()
        }
        fn count_queue_number(&self, number: QueueNumber) -> Result<usize> {
            self.inner.count_queue_number(number)
        }
        fn commit_queue_entry(&self, entry: &QueueEntry, deadline: Option<Instant>) -> Result<()> {
            self.inner.commit_queue_entry(entry, deadline)
        }
        fn find_identity(&self, secret: &str) -> Result<Option<Identity>> {
            self.inner.find_identity(secret)
        }
        fn get_permit(&self, number: QueueNumber) -> Result<Option<PermitRecord>> {
            self.inner.get_permit(number)
        }
    }

    /// Every call fails as if the network were down.
    struct OfflineStore;

    impl DocumentStore for OfflineStore {
        fn max_queue_number(&self) -> Result<Option<QueueNumber>> {
            Err(QueueError::Transport("connection refused".to_string()))
        }
        fn count_queue_number(&self, _number: QueueNumber) -> Result<usize> {
            Err(QueueError::Transport("connection refused".to_string()))
        }
        fn commit_queue_entry(&self, _entry: &QueueEntry, _deadline: Option<Instant>) -> Result<()> {
            Err(QueueError::Transport("connection refused".to_string()))
        }
        fn find_identity(&self, _secret: &str) -> Result<Option<Identity>> {
            Err(QueueError::Transport("connection refused".to_string()))
        }
        fn get_permit(&self, _number: QueueNumber) -> Result<Option<PermitRecord>> {
            Err(QueueError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_empty_queue_claim_then_unknown_permit() {
        let store = seeded_store();
        let service = service(Arc::clone(&store));

        let next = service.next_queue_number().await.unwrap();
        assert_eq!(next.to_string(), "UZ001");

        let entry = service.record_claim(identity("2021-0001"), next).await.unwrap();
        assert_eq!(entry.status, ClaimStatus::Pending);

        let err = service.fetch_permit(number("UZ050")).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
        assert_eq!(store.with_connection(get_queue_entries).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_next_after_stored_uz005() {
        let store = seeded_store();
        store
            .add_queue_entry(&QueueEntry::pending(&identity("2021-0001"), number("UZ005")))
            .unwrap();

        let next = service(store).next_queue_number().await.unwrap();
        assert_eq!(next.to_string(), "UZ006");
    }

    #[tokio::test]
    async fn test_enqueue_issues_sequential_numbers() {
        let service = service(seeded_store());

        let first = service.enqueue("QR-0001").await.unwrap();
        let second = service.enqueue("QR-0002\n").await.unwrap();

        assert_eq!(first.queue_number.to_string(), "UZ001");
        assert_eq!(second.queue_number.to_string(), "UZ002");
        assert_eq!(second.user_student_number, "2021-0002");
        assert!(service.is_duplicate(number("UZ002")).await.unwrap());
    }

    #[tokio::test]
    async fn test_enqueue_unknown_secret_writes_nothing() {
        let store = seeded_store();
        let service = service(Arc::clone(&store));

        let err = service.enqueue("QR-9999").await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
        assert!(store.with_connection(get_queue_entries).unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueues_get_distinct_numbers() {
        let service = Arc::new(service(seeded_store()));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let service = Arc::clone(&service);
                let secret = if i % 2 == 0 { "QR-0001" } else { "QR-0002" };
                tokio::spawn(async move { service.enqueue(secret).await })
            })
            .collect();

        let mut numbers = HashSet::new();
        for handle in handles {
            let entry = handle.await.unwrap().unwrap();
            numbers.insert(entry.queue_number.value());
        }

        assert_eq!(numbers, (1..=10).collect::<HashSet<u16>>());
    }

    #[tokio::test]
    async fn test_duplicate_triggers_reissue() {
        let sqlite = seeded_store();
        sqlite
            .add_queue_entry(&QueueEntry::pending(&identity("2021-0002"), number("UZ001")))
            .unwrap();
        let store = StaleOnceStore {
            inner: Arc::clone(&sqlite),
            stale: AtomicBool::new(true),
        };
        let service = QueueService::new(Arc::new(store), Duration::from_secs(10), 3);

        let entry = service.enqueue("QR-0001").await.unwrap();
        assert_eq!(entry.queue_number.to_string(), "UZ002");
        assert_eq!(sqlite.with_connection(get_queue_entries).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_surfaces_when_reissue_disabled() {
        let sqlite = seeded_store();
        sqlite
            .add_queue_entry(&QueueEntry::pending(&identity("2021-0002"), number("UZ001")))
            .unwrap();
        let store = StaleOnceStore {
            inner: Arc::clone(&sqlite),
            stale: AtomicBool::new(true),
        };
        let service = QueueService::new(Arc::new(store), Duration::from_secs(10), 0);

        let err = service.enqueue("QR-0001").await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateQueueNumber(n) if n.to_string() == "UZ001"));
        assert_eq!(sqlite.with_connection(get_queue_entries).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_store_times_out_as_transport_error() {
        let store = SlowStore {
            inner: Arc::new(SqliteStore::open_in_memory().unwrap()),
            delay: Duration::from_millis(300),
        };
        let service = QueueService::new(Arc::new(store), Duration::from_millis(50), 3);

        let err = service.next_queue_number().await.unwrap_err();
        assert!(matches!(err, QueueError::Timeout { op: "next_queue_number" }));
        assert_eq!(err.kind(), "transport");

        let err = service.fetch_permit(number("UZ001")).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }

    #[tokio::test]
    async fn test_timed_out_claim_is_never_committed() {
        let sqlite = seeded_store();
        let store = SlowStore {
            inner: Arc::clone(&sqlite),
            delay: Duration::from_millis(300),
        };
        let service = QueueService::new(Arc::new(store), Duration::from_millis(50), 3);

        let err = service
            .record_claim(identity("2021-0001"), number("UZ001"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.kind(), "transport");

        // Give a stray blocking task time to land, then check again.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(sqlite.with_connection(get_queue_entries).unwrap().is_empty());
        assert!(!service.is_duplicate(number("UZ001")).await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_claim_reports_each_candidate() {
        let sqlite = seeded_store();
        sqlite
            .add_queue_entry(&QueueEntry::pending(&identity("2021-0002"), number("UZ001")))
            .unwrap();
        let store = StaleOnceStore {
            inner: Arc::clone(&sqlite),
            stale: AtomicBool::new(true),
        };
        let service = QueueService::new(Arc::new(store), Duration::from_secs(10), 3);

        let mut candidates = Vec::new();
        let entry = service
            .issue_claim_with(identity("2021-0001"), |n| candidates.push(n))
            .await
            .unwrap();

        assert_eq!(candidates, vec![number("UZ001"), number("UZ002")]);
        assert_eq!(entry.queue_number, *candidates.last().unwrap());
    }

    #[tokio::test]
    async fn test_offline_store_surfaces_transport_errors() {
        let service = QueueService::new(Arc::new(OfflineStore), Duration::from_secs(1), 3);

        assert_eq!(service.next_queue_number().await.unwrap_err().kind(), "transport");
        assert_eq!(service.enqueue("QR-0001").await.unwrap_err().kind(), "transport");
        assert_eq!(
            service.record_claim(identity("1"), number("UZ001")).await.unwrap_err().kind(),
            "transport"
        );
    }

    #[tokio::test]
    async fn test_fetch_permit_returns_stored_copy() {
        let store = seeded_store();
        let permit = PermitRecord {
            user_name: "Student 2021-0001".to_string(),
            user_student_number: "2021-0001".to_string(),
            permit_status: "approved".to_string(),
            timestamp: "2026-10-18T09:00:00Z".to_string(),
        };
        store
            .with_connection(|conn| upsert_permit(conn, number("UZ001"), &permit))
            .unwrap();

        let fetched = service(store).fetch_permit(number("UZ001")).await.unwrap();
        assert_eq!(fetched, permit);
    }
}
