use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{QueueError, Result};
use crate::model::{ClaimStatus, Identity, PermitRecord, QueueEntry, QueueNumber};
use crate::store::DocumentStore;

/// Digest used to look accounts up by their shared secret.
/// The plaintext secret is never stored.
pub fn secret_digest(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // QueueDatabase: one row per claim
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS QueueDatabase (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id TEXT UNIQUE NOT NULL,
            queue_number TEXT NOT NULL,
            user_name TEXT NOT NULL,
            user_email TEXT NOT NULL,
            user_student_number TEXT NOT NULL,
            user_cellphone_number TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            status TEXT NOT NULL,
            reference_number TEXT NOT NULL,
            amount TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // accountuz: student accounts, keyed by secret digest
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS accountuz (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            secret_digest TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            student_number TEXT UNIQUE NOT NULL,
            cellphone_number TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // ClaimingPermit: written by the processing office
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ClaimingPermit (
            queue_number TEXT PRIMARY KEY,
            user_name TEXT NOT NULL,
            user_student_number TEXT NOT NULL,
            permit_status TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    // Unique: two kiosks racing on the same number cannot both commit.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_number ON QueueDatabase(queue_number)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_secret_digest ON accountuz(secret_digest)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// QUEUE ENTRIES
// ============================================================================

pub fn max_queue_number(conn: &Connection) -> Result<Option<QueueNumber>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT queue_number FROM QueueDatabase ORDER BY queue_number DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|s| QueueNumber::parse(&s)).transpose()
}

pub fn count_queue_number(conn: &Connection, number: QueueNumber) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM QueueDatabase WHERE queue_number = ?1",
        params![number.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn insert_queue_entry(conn: &Connection, entry: &QueueEntry) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO QueueDatabase (
            doc_id, queue_number, user_name, user_email, user_student_number,
            user_cellphone_number, timestamp, status, reference_number, amount
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id,
            entry.queue_number.to_string(),
            entry.user_name,
            entry.user_email,
            entry.user_student_number,
            entry.user_cellphone_number,
            entry.timestamp.to_rfc3339(),
            entry.status.as_str(),
            entry.reference_number,
            entry.amount,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            Err(QueueError::DuplicateQueueNumber(entry.queue_number))
        }
        Err(e) => Err(e.into()),
    }
}

/// All entries, lowest queue number first.
pub fn get_queue_entries(conn: &Connection) -> Result<Vec<QueueEntry>> {
    let mut stmt = conn.prepare(
        "SELECT doc_id, queue_number, user_name, user_email, user_student_number,
                user_cellphone_number, timestamp, status, reference_number, amount
         FROM QueueDatabase
         ORDER BY queue_number",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, number, name, email, student, cell, ts, status, reference, amount) = row?;
        let timestamp = DateTime::parse_from_rfc3339(&ts)
            .map_err(|e| QueueError::Validation(format!("entry {id} timestamp '{ts}': {e}")))?
            .with_timezone(&Utc);

        entries.push(QueueEntry {
            id,
            queue_number: QueueNumber::parse(&number)?,
            user_name: name,
            user_email: email,
            user_student_number: student,
            user_cellphone_number: cell,
            timestamp,
            status: ClaimStatus::from(status),
            reference_number: reference,
            amount,
        });
    }

    Ok(entries)
}

pub fn count_queue_entries(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM QueueDatabase", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// ACCOUNTS
// ============================================================================

/// Insert or refresh an account. The student number identifies the row.
pub fn upsert_account(conn: &Connection, secret: &str, identity: &Identity) -> Result<()> {
    conn.execute(
        "INSERT INTO accountuz (secret_digest, name, email, student_number, cellphone_number)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(student_number) DO UPDATE SET
            secret_digest = excluded.secret_digest,
            name = excluded.name,
            email = excluded.email,
            cellphone_number = excluded.cellphone_number",
        params![
            secret_digest(secret),
            identity.name,
            identity.email,
            identity.student_number,
            identity.cellphone_number,
        ],
    )?;
    Ok(())
}

pub fn find_identity(conn: &Connection, secret: &str) -> Result<Option<Identity>> {
    let identity = conn
        .query_row(
            "SELECT name, email, student_number, cellphone_number
             FROM accountuz
             WHERE secret_digest = ?1
             ORDER BY id
             LIMIT 1",
            params![secret_digest(secret)],
            |row| {
                Ok(Identity {
                    name: row.get(0)?,
                    email: row.get(1)?,
                    student_number: row.get(2)?,
                    cellphone_number: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(identity)
}

// ============================================================================
// PERMITS
// ============================================================================

pub fn upsert_permit(conn: &Connection, number: QueueNumber, permit: &PermitRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO ClaimingPermit (queue_number, user_name, user_student_number, permit_status, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(queue_number) DO UPDATE SET
            user_name = excluded.user_name,
            user_student_number = excluded.user_student_number,
            permit_status = excluded.permit_status,
            timestamp = excluded.timestamp",
        params![
            number.to_string(),
            permit.user_name,
            permit.user_student_number,
            permit.permit_status,
            permit.timestamp,
        ],
    )?;
    Ok(())
}

pub fn get_permit(conn: &Connection, number: QueueNumber) -> Result<Option<PermitRecord>> {
    let permit = conn
        .query_row(
            "SELECT user_name, user_student_number, permit_status, timestamp
             FROM ClaimingPermit
             WHERE queue_number = ?1",
            params![number.to_string()],
            |row| {
                Ok(PermitRecord {
                    user_name: row.get(0)?,
                    user_student_number: row.get(1)?,
                    permit_status: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(permit)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// `DocumentStore` backed by a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        debug!(path = %path.display(), "opened queue database");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Bound how long a statement waits on a lock held by another
    /// connection to the same file.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.lock()?.busy_timeout(timeout)?;
        Ok(())
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Transport("database connection lock poisoned".to_string()))
    }
}

impl DocumentStore for SqliteStore {
    fn max_queue_number(&self) -> Result<Option<QueueNumber>> {
        max_queue_number(&*self.lock()?)
    }

    fn count_queue_number(&self, number: QueueNumber) -> Result<usize> {
        count_queue_number(&*self.lock()?, number)
    }

    fn commit_queue_entry(&self, entry: &QueueEntry, deadline: Option<Instant>) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        insert_queue_entry(&tx, entry)?;

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tx.rollback()?;
            warn!(queue_number = %entry.queue_number, "deadline passed before commit, rolled back");
            return Err(QueueError::Timeout { op: "add_queue_entry" });
        }

        tx.commit()?;
        Ok(())
    }

    fn find_identity(&self, secret: &str) -> Result<Option<Identity>> {
        find_identity(&*self.lock()?, secret)
    }

    fn get_permit(&self, number: QueueNumber) -> Result<Option<PermitRecord>> {
        get_permit(&*self.lock()?, number)
    }
}
