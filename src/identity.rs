// Identity Resolver - scanned secret to student account
// Also loads the account roster from CSV.

use anyhow::Context;
use rusqlite::Connection;
use serde::Deserialize;
use std::path::Path;

use crate::db::upsert_account;
use crate::error::{QueueError, Result};
use crate::model::{Identity, Resolution};
use crate::store::DocumentStore;

pub struct IdentityResolver<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> IdentityResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// First account matching the scanned secret.
    pub fn resolve(&self, secret: &str) -> Result<Resolution> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(QueueError::Validation("scanned value is empty".to_string()));
        }

        Ok(match self.store.find_identity(secret)? {
            Some(identity) => Resolution::Found(identity),
            None => Resolution::NotFound,
        })
    }
}

// ============================================================================
// ROSTER IMPORT
// ============================================================================

/// One row of the account roster CSV.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccountRow {
    pub secret: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub student_number: String,
    #[serde(default)]
    pub cellphone_number: String,
}

impl AccountRow {
    pub fn identity(&self) -> Identity {
        Identity {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            student_number: self.student_number.trim().to_string(),
            cellphone_number: self.cellphone_number.trim().to_string(),
        }
    }
}

pub fn load_accounts_csv(csv_path: &Path) -> anyhow::Result<Vec<AccountRow>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open roster {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        // Header is line 1
        let row: AccountRow =
            result.with_context(|| format!("Failed to read roster line {}", i + 2))?;
        rows.push(row);
    }

    Ok(rows)
}

/// Upsert every valid row. Returns how many were imported; rows with a blank
/// secret or an incomplete identity are skipped.
pub fn import_accounts(conn: &Connection, rows: &[AccountRow]) -> Result<usize> {
    let mut imported = 0;
    for row in rows {
        let identity = row.identity();
        if row.secret.trim().is_empty() || identity.validate().is_err() {
            tracing::warn!(student_number = %row.student_number, "skipping incomplete roster row");
            continue;
        }
        upsert_account(conn, row.secret.trim(), &identity)?;
        imported += 1;
    }
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const ROSTER: &str = "\
secret,name,email,studentNumber,cellphoneNumber
QR-0001,Ana Reyes,ana@uz.edu.ph,2021-0001,09170000001
QR-0002,Ben Cruz,ben@uz.edu.ph,2021-0002,
,No Secret,nobody@uz.edu.ph,2021-0003,
";

    fn roster_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ROSTER.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_and_import_roster() {
        let file = roster_file();
        let rows = load_accounts_csv(file.path()).unwrap();
        assert_eq!(rows.len(), 3);

        let store = SqliteStore::open_in_memory().unwrap();
        let imported = store.with_connection(|conn| import_accounts(conn, &rows)).unwrap();
        assert_eq!(imported, 2);

        let resolver = IdentityResolver::new(&store);
        match resolver.resolve("QR-0002").unwrap() {
            Resolution::Found(identity) => {
                assert_eq!(identity.name, "Ben Cruz");
                assert_eq!(identity.cellphone_number, "");
            }
            Resolution::NotFound => panic!("expected QR-0002 to resolve"),
        }
    }

    #[test]
    fn test_scanned_token_is_trimmed() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows = load_accounts_csv(roster_file().path()).unwrap();
        store.with_connection(|conn| import_accounts(conn, &rows)).unwrap();

        let resolution = IdentityResolver::new(&store).resolve("  QR-0001\r").unwrap();
        assert_eq!(
            resolution.into_identity().map(|i| i.student_number),
            Some("2021-0001".to_string())
        );
    }

    #[test]
    fn test_unknown_secret_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(
            IdentityResolver::new(&store).resolve("nobody").unwrap(),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_blank_scan_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            IdentityResolver::new(&store).resolve("   "),
            Err(QueueError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_roster_file_reports_path() {
        let err = load_accounts_csv(Path::new("/nonexistent/roster.csv")).unwrap_err();
        assert!(err.to_string().contains("roster.csv"));
    }
}
