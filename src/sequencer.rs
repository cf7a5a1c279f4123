// Queue Sequencer - computes the next queue number and detects collisions
//
// Neither read is atomic with the write that follows it. The store's unique
// index is what finally rejects a number two kiosks computed at once.

use tracing::debug;

use crate::error::Result;
use crate::model::QueueNumber;
use crate::store::DocumentStore;

pub struct QueueSequencer<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> QueueSequencer<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// `UZ001` on an empty queue, otherwise the stored maximum plus one.
    /// Past `UZ999` this fails with `Overflow`.
    pub fn next_queue_number(&self) -> Result<QueueNumber> {
        let next = match self.store.max_queue_number()? {
            None => QueueNumber::SEED,
            Some(max) => max.next()?,
        };
        debug!(queue_number = %next, "computed next queue number");
        Ok(next)
    }

    /// True iff at least one entry already carries `candidate`.
    pub fn is_duplicate(&self, candidate: QueueNumber) -> Result<bool> {
        Ok(self.store.count_queue_number(candidate)? > 0)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::error::QueueError;
    use crate::model::{Identity, QueueEntry};
    use pretty_assertions::assert_eq;

    fn identity() -> Identity {
        Identity {
            name: "Ana Reyes".to_string(),
            email: "ana@uz.edu.ph".to_string(),
            student_number: "2021-0001".to_string(),
            cellphone_number: "09170000000".to_string(),
        }
    }

    fn store_with(numbers: &[&str]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for raw in numbers {
            let entry = QueueEntry::pending(&identity(), QueueNumber::parse(raw).unwrap());
            store.add_queue_entry(&entry).unwrap();
        }
        store
    }

    #[test]
    fn test_empty_store_seeds_uz001() {
        let store = store_with(&[]);
        let sequencer = QueueSequencer::new(&store);
        assert_eq!(sequencer.next_queue_number().unwrap().to_string(), "UZ001");
    }

    #[test]
    fn test_next_after_stored_max() {
        let store = store_with(&["UZ005"]);
        let sequencer = QueueSequencer::new(&store);
        assert_eq!(sequencer.next_queue_number().unwrap().to_string(), "UZ006");
    }

    #[test]
    fn test_next_increments_every_stored_max() {
        for value in 1..=98u16 {
            let max = QueueNumber::from_value(value).unwrap().to_string();
            let store = store_with(&[max.as_str()]);
            let next = QueueSequencer::new(&store).next_queue_number().unwrap();
            assert_eq!(next.to_string(), format!("UZ{:03}", value + 1));
        }
    }

    #[test]
    fn test_next_uses_maximum_not_latest() {
        let store = store_with(&["UZ010", "UZ003"]);
        let next = QueueSequencer::new(&store).next_queue_number().unwrap();
        assert_eq!(next.to_string(), "UZ011");
    }

    #[test]
    fn test_overflow_after_999() {
        let store = store_with(&["UZ999"]);
        let err = QueueSequencer::new(&store).next_queue_number().unwrap_err();
        assert!(matches!(err, QueueError::Overflow(n) if n.value() == 999));
    }

    #[test]
    fn test_is_duplicate_iff_entry_exists() {
        let store = store_with(&["UZ002"]);
        let sequencer = QueueSequencer::new(&store);

        assert!(sequencer.is_duplicate(QueueNumber::parse("UZ002").unwrap()).unwrap());
        assert!(!sequencer.is_duplicate(QueueNumber::parse("UZ001").unwrap()).unwrap());
        assert!(!sequencer.is_duplicate(QueueNumber::parse("UZ003").unwrap()).unwrap());
    }
}
