// Kiosk State - scan-and-queue screen flow
//
// A keyboard-wedge scanner types the decoded QR/barcode payload followed by
// Enter. `ScanBuffer` turns that keystream into tokens and `KioskState`
// tracks where the operator is in the scan → resolve → save flow.

use tracing::debug;

use crate::model::{Identity, QueueEntry, QueueNumber, Resolution};

// ============================================================================
// SCAN BUFFER
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct ScanBuffer {
    buffer: String,
}

/// A keystroke as the kiosk sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKey {
    Char(char),
    Backspace,
    Enter,
}

impl ScanBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one key. Enter returns the completed token (trimmed) and clears
    /// the buffer; an empty scan yields nothing.
    pub fn push(&mut self, key: ScanKey) -> Option<String> {
        match key {
            ScanKey::Char('\n') | ScanKey::Char('\r') | ScanKey::Enter => {
                let token = std::mem::take(&mut self.buffer).trim().to_string();
                if token.is_empty() {
                    None
                } else {
                    Some(token)
                }
            }
            ScanKey::Char(c) => {
                self.buffer.push(c);
                None
            }
            ScanKey::Backspace => {
                self.buffer.pop();
                None
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

// ============================================================================
// KIOSK STATE MACHINE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub enum KioskState {
    #[default]
    Idle,
    Scanning { buffer: String },
    Resolved { identity: Identity },
    Saving { identity: Identity, queue_number: QueueNumber },
    Success { entry: QueueEntry },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum KioskEvent {
    Input(char),
    ScanComplete(Resolution),
    SaveStarted(QueueNumber),
    SaveSucceeded(QueueEntry),
    SaveFailed(String),
    Timeout,
    Dismiss,
}

impl KioskState {
    /// Apply `event`. Pairs with no defined transition leave the state as is.
    pub fn on(self, event: KioskEvent) -> KioskState {
        use KioskEvent as E;
        use KioskState as S;

        match (self, event) {
            (S::Idle, E::Input(c)) | (S::Success { .. }, E::Input(c)) | (S::Error { .. }, E::Input(c)) => {
                S::Scanning { buffer: c.to_string() }
            }
            (S::Scanning { mut buffer }, E::Input(c)) => {
                buffer.push(c);
                S::Scanning { buffer }
            }

            (S::Idle, E::ScanComplete(resolution)) | (S::Scanning { .. }, E::ScanComplete(resolution)) => {
                match resolution {
                    Resolution::Found(identity) => S::Resolved { identity },
                    Resolution::NotFound => S::Error {
                        message: "No account matches the scanned code.".to_string(),
                    },
                }
            }

            // A reissue after a duplicate moves Saving on to the new number
            (S::Resolved { identity }, E::SaveStarted(queue_number))
            | (S::Saving { identity, .. }, E::SaveStarted(queue_number)) => S::Saving {
                identity,
                queue_number,
            },
            (S::Saving { .. }, E::SaveSucceeded(entry)) => S::Success { entry },
            (S::Scanning { .. }, E::SaveFailed(message))
            | (S::Resolved { .. }, E::SaveFailed(message))
            | (S::Saving { .. }, E::SaveFailed(message)) => S::Error { message },

            (S::Scanning { .. }, E::Timeout)
            | (S::Resolved { .. }, E::Timeout)
            | (S::Saving { .. }, E::Timeout) => S::Error {
                message: "The request timed out. Please scan again.".to_string(),
            },

            (S::Success { .. }, E::Dismiss) | (S::Error { .. }, E::Dismiss) => S::Idle,

            (state, event) => {
                debug!(?state, ?event, "ignored kiosk event");
                state
            }
        }
    }

    /// True while a store call is outstanding.
    pub fn is_busy(&self) -> bool {
        matches!(self, KioskState::Resolved { .. } | KioskState::Saving { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            KioskState::Idle => "Idle",
            KioskState::Scanning { .. } => "Scanning",
            KioskState::Resolved { .. } => "Resolved",
            KioskState::Saving { .. } => "Saving",
            KioskState::Success { .. } => "Success",
            KioskState::Error { .. } => "Error",
        }
    }
}
