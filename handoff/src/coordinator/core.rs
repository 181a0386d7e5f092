//! Core transaction data structures
//!
//! Defines the fundamental types shared by every coordinator implementation:
//! - IsolationLevel / TransactionOptions: how a root transaction is begun
//! - TransactionState / TransactionOutcome / Vote: lifecycle and resolution
//! - Command / JournalEntry: enlisted work settled on commit or abort
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Isolation level requested when a root transaction begins.
///
/// Participants joining through a token inherit the root's level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    Serializable,
    RepeatableRead,
    ReadCommitted,
    #[default]
    ReadUncommitted,
    Snapshot,
    Chaos,
    Unspecified,
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IsolationLevel::Serializable => "Serializable",
            IsolationLevel::RepeatableRead => "RepeatableRead",
            IsolationLevel::ReadCommitted => "ReadCommitted",
            IsolationLevel::ReadUncommitted => "ReadUncommitted",
            IsolationLevel::Snapshot => "Snapshot",
            IsolationLevel::Chaos => "Chaos",
            IsolationLevel::Unspecified => "Unspecified",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for IsolationLevel {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "serializable" => Ok(IsolationLevel::Serializable),
            "repeatableread" => Ok(IsolationLevel::RepeatableRead),
            "readcommitted" => Ok(IsolationLevel::ReadCommitted),
            "readuncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "snapshot" => Ok(IsolationLevel::Snapshot),
            "chaos" => Ok(IsolationLevel::Chaos),
            "unspecified" => Ok(IsolationLevel::Unspecified),
            _ => Err(HandoffError::new(
                &format!("Unknown isolation level '{}'", s),
                ErrorKind::InvalidConfiguration,
            )),
        }
    }
}

/// Options used to begin a root transaction scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    pub isolation_level: IsolationLevel,
    pub timeout: Duration,
}

impl TransactionOptions {
    pub fn new(isolation_level: IsolationLevel, timeout: Duration) -> Self {
        TransactionOptions {
            isolation_level,
            timeout,
        }
    }
}

/// State of a transaction handle inside one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Accepting enlisted work
    Active,
    /// This participant voted and waits for the root's decision
    Prepared,
    /// Settled as committed; enlisted work applied
    Committed,
    /// Settled as aborted; enlisted work discarded
    Aborted,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

/// Final, shared decision of a distributed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionOutcome {
    Committed,
    Aborted,
}

impl Display for TransactionOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionOutcome::Committed => write!(f, "Committed"),
            TransactionOutcome::Aborted => write!(f, "Aborted"),
        }
    }
}

impl From<TransactionOutcome> for TransactionState {
    fn from(outcome: TransactionOutcome) -> Self {
        match outcome {
            TransactionOutcome::Committed => TransactionState::Committed,
            TransactionOutcome::Aborted => TransactionState::Aborted,
        }
    }
}

/// A participant's vote on the shared transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Pending,
    Prepared,
    Aborted,
}

/// Executable command run when enlisted work settles.
pub type Command = Arc<dyn Fn() -> HandoffResult<()> + Send + Sync>;

/// Record of one piece of enlisted work.
///
/// Stores the forward operation (`commit`) and the inverse operation (`rollback`); exactly
/// one of them runs, once, when the transaction settles.
#[derive(Clone)]
pub struct JournalEntry {
    pub operation: String,
    pub commit: Option<Command>,
    pub rollback: Option<Command>,
}

impl JournalEntry {
    pub fn new(operation: &str, commit: Option<Command>, rollback: Option<Command>) -> Self {
        JournalEntry {
            operation: operation.to_string(),
            commit,
            rollback,
        }
    }
}

impl std::fmt::Debug for JournalEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalEntry")
            .field("operation", &self.operation)
            .field("has_commit", &self.commit.is_some())
            .field("has_rollback", &self.rollback.is_some())
            .finish()
    }
}
