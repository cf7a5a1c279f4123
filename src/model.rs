use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{QueueError, Result};

/// Prefix every queue number carries.
pub const QUEUE_PREFIX: &str = "UZ";

/// Width of the zero-padded numeric suffix.
pub const QUEUE_DIGITS: usize = 3;

/// Largest suffix the fixed-width format can hold.
pub const QUEUE_MAX: u16 = 999;

// ============================================================================
// QUEUE NUMBER
// ============================================================================

/// Human-readable ticket identifier: `UZ` + 3-digit zero-padded sequence.
///
/// Ordering compares the numeric suffix, which for this fixed-width format is
/// the same as comparing the strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueNumber(u16);

impl QueueNumber {
    /// First number handed out on an empty queue.
    pub const SEED: QueueNumber = QueueNumber(1);

    /// Parse a stored or scanned queue number.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let suffix = raw.strip_prefix(QUEUE_PREFIX).ok_or_else(|| {
            QueueError::Validation(format!("queue number '{raw}' must start with {QUEUE_PREFIX}"))
        })?;

        if suffix.len() != QUEUE_DIGITS || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QueueError::Validation(format!(
                "queue number '{raw}' must end in exactly {QUEUE_DIGITS} digits"
            )));
        }

        // Three ASCII digits always fit.
        let value = suffix
            .parse::<u16>()
            .map_err(|e| QueueError::Validation(format!("queue number '{raw}': {e}")))?;
        Ok(QueueNumber(value))
    }

    /// Build from a raw sequence value.
    pub fn from_value(value: u16) -> Result<Self> {
        if value > QUEUE_MAX {
            return Err(QueueError::Overflow(QueueNumber(QUEUE_MAX)));
        }
        Ok(QueueNumber(value))
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    /// The number after this one, or `Overflow` past `UZ999`.
    pub fn next(self) -> Result<Self> {
        if self.0 >= QUEUE_MAX {
            return Err(QueueError::Overflow(self));
        }
        Ok(QueueNumber(self.0 + 1))
    }
}

impl fmt::Display for QueueNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:0width$}", QUEUE_PREFIX, self.0, width = QUEUE_DIGITS)
    }
}

impl FromStr for QueueNumber {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        QueueNumber::parse(s)
    }
}

impl TryFrom<String> for QueueNumber {
    type Error = QueueError;

    fn try_from(s: String) -> Result<Self> {
        QueueNumber::parse(&s)
    }
}

impl From<QueueNumber> for String {
    fn from(n: QueueNumber) -> Self {
        n.to_string()
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

/// A student account resolved from a scanned secret. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub student_number: String,
    pub cellphone_number: String,
}

impl Identity {
    /// A resolved identity must at least carry a name and a student number.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(QueueError::Validation("identity name is empty".to_string()));
        }
        if self.student_number.trim().is_empty() {
            return Err(QueueError::Validation(
                "identity student number is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of looking up a scanned secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "identity", rename_all = "snake_case")]
pub enum Resolution {
    Found(Identity),
    NotFound,
}

impl Resolution {
    pub fn into_identity(self) -> Option<Identity> {
        match self {
            Resolution::Found(identity) => Some(identity),
            Resolution::NotFound => None,
        }
    }
}

// ============================================================================
// QUEUE ENTRY
// ============================================================================

/// Lifecycle status of a claim. Anything other than the two known values is
/// set by the processing office and kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClaimStatus {
    Pending,
    Claimed,
    Other(String),
}

impl ClaimStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Claimed => "claimed",
            ClaimStatus::Other(s) => s,
        }
    }
}

impl From<String> for ClaimStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => ClaimStatus::Pending,
            "claimed" => ClaimStatus::Claimed,
            _ => ClaimStatus::Other(s),
        }
    }
}

impl From<ClaimStatus> for String {
    fn from(status: ClaimStatus) -> Self {
        status.as_str().to_string()
    }
}

/// A claim waiting in the queue. Written once, never mutated by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Generated document id (UUID v4)
    pub id: String,
    pub queue_number: QueueNumber,
    pub user_name: String,
    pub user_email: String,
    pub user_student_number: String,
    pub user_cellphone_number: String,
    pub timestamp: DateTime<Utc>,
    pub status: ClaimStatus,
    pub reference_number: String,
    pub amount: String,
}

impl QueueEntry {
    /// Fresh pending claim for `identity`, stamped with the current time.
    pub fn pending(identity: &Identity, queue_number: QueueNumber) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue_number,
            user_name: identity.name.clone(),
            user_email: identity.email.clone(),
            user_student_number: identity.student_number.clone(),
            user_cellphone_number: identity.cellphone_number.clone(),
            timestamp: Utc::now(),
            status: ClaimStatus::Pending,
            reference_number: "0".to_string(),
            amount: "0".to_string(),
        }
    }
}

// ============================================================================
// PERMIT RECORD
// ============================================================================

/// Administrative permit keyed by queue number. Read-only for the kiosk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitRecord {
    pub user_name: String,
    pub user_student_number: String,
    pub permit_status: String,
    /// Stored as written by the admin process; usually RFC 3339.
    pub timestamp: String,
}

impl PermitRecord {
    /// Label/value pairs shown on the print screen.
    pub fn detail_lines(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.user_name.clone()),
            ("Student Number", self.user_student_number.clone()),
            ("Permit Status", self.permit_status.clone()),
            ("Timestamp", self.display_timestamp()),
        ]
    }

    /// Timestamp in local time when it parses, otherwise as stored.
    pub fn display_timestamp(&self) -> String {
        match DateTime::parse_from_rfc3339(&self.timestamp) {
            Ok(ts) => ts
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            Err(_) => self.timestamp.clone(),
        }
    }
}
