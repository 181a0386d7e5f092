use super::core::{IsolationLevel, JournalEntry, TransactionOutcome, TransactionState};
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How this process holds the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The process began the transaction and decides its outcome
    Root,
    /// The process joined through a propagation token
    Participant(Uuid),
}

/// In-process handle of a distributed transaction.
///
/// A handle is owned by the process that began or imported it; only its exported token
/// crosses the process boundary. Work enlisted through [`Transaction::add_journal_entry`]
/// is held in a journal and settled exactly once, when the shared outcome is known.
///
/// # Characteristics
/// - **Cheap clones**: all clones share one state through `Arc`
/// - **Completion flag**: set once by the owning scope, never cleared
/// - **Single settlement**: settling twice is a no-op that reports the first outcome
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

struct TransactionInner {
    id: Uuid,
    origin: Origin,
    address: PathBuf,
    isolation_level: IsolationLevel,
    timeout: Duration,
    deadline: DateTime<Utc>,
    completed: AtomicBool,
    state: Mutex<TransactionState>,
    journal: Mutex<VecDeque<JournalEntry>>,
}

impl Transaction {
    /// Creates an active handle.
    ///
    /// # Arguments
    /// * `id` - Identity shared by every participant of the transaction
    /// * `origin` - Whether this process is the root or a participant
    /// * `address` - Address of the coordinator that owns the transaction
    /// * `isolation_level` - Isolation level fixed by the root
    /// * `timeout` - Scope timeout of this handle
    /// * `deadline` - Instant after which this handle can no longer commit
    pub fn new(
        id: Uuid,
        origin: Origin,
        address: PathBuf,
        isolation_level: IsolationLevel,
        timeout: Duration,
        deadline: DateTime<Utc>,
    ) -> Self {
        Transaction {
            inner: Arc::new(TransactionInner {
                id,
                origin,
                address,
                isolation_level,
                timeout,
                deadline,
                completed: AtomicBool::new(false),
                state: Mutex::new(TransactionState::Active),
                journal: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn origin(&self) -> Origin {
        self.inner.origin
    }

    pub fn is_root(&self) -> bool {
        self.inner.origin == Origin::Root
    }

    pub fn address(&self) -> &Path {
        &self.inner.address
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation_level
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.inner.deadline
    }

    /// Returns true once `now` is past this handle's deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.inner.deadline
    }

    pub fn state(&self) -> TransactionState {
        *self.inner.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.inner.state.lock() = state;
    }

    /// Whether the owning scope has been marked complete.
    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    /// Marks the owning scope complete.
    ///
    /// # Errors
    /// `InvalidOperation` if already marked or no longer active.
    pub fn set_completed(&self) -> HandoffResult<()> {
        self.check_active()?;
        if self
            .inner
            .completed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(HandoffError::new(
                "Transaction scope is already marked complete",
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }

    /// Enlists work in this transaction.
    ///
    /// # Errors
    /// `InvalidOperation` if the handle is no longer active or its scope is already
    /// marked complete.
    pub fn add_journal_entry(&self, entry: JournalEntry) -> HandoffResult<()> {
        self.check_active()?;
        if self.is_completed() {
            return Err(HandoffError::new(
                "Cannot enlist work after the scope was marked complete",
                ErrorKind::InvalidOperation,
            ));
        }
        log::debug!("Transaction {} enlisted {}", self.id(), entry.operation);
        self.inner.journal.lock().push_back(entry);
        Ok(())
    }

    /// Number of enlisted operations not settled yet.
    pub fn pending_operations(&self) -> usize {
        self.inner.journal.lock().len()
    }

    /// Settles the enlisted work with the shared outcome.
    ///
    /// Runs every commit command on `Committed` and every rollback command on `Aborted`,
    /// in enlistment order. All commands run even if one fails; the first failure is
    /// returned. Settling an already settled handle returns its recorded outcome.
    pub fn settle(&self, outcome: TransactionOutcome) -> HandoffResult<TransactionOutcome> {
        let entries: Vec<JournalEntry> = {
            let mut state = self.inner.state.lock();
            match *state {
                TransactionState::Committed => return Ok(TransactionOutcome::Committed),
                TransactionState::Aborted => return Ok(TransactionOutcome::Aborted),
                _ => {}
            }
            *state = outcome.into();
            self.inner.journal.lock().drain(..).collect()
        };

        let mut first_error: Option<HandoffError> = None;
        for entry in entries {
            let command = match outcome {
                TransactionOutcome::Committed => entry.commit,
                TransactionOutcome::Aborted => entry.rollback,
            };
            if let Some(command) = command {
                if let Err(e) = command() {
                    log::error!(
                        "Transaction {} failed to settle {} as {}: {}",
                        self.id(),
                        entry.operation,
                        outcome,
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(HandoffError::new_with_cause(
                &format!("Transaction {} settled as {} with failures", self.id(), outcome),
                ErrorKind::ResourceOperationError,
                e,
            )),
            None => Ok(outcome),
        }
    }

    fn check_active(&self) -> HandoffResult<()> {
        let state = self.state();
        if state != TransactionState::Active {
            return Err(HandoffError::new(
                &format!("Transaction {} is not active: {:?}", self.id(), state),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("origin", &self.inner.origin)
            .field("isolation_level", &self.inner.isolation_level)
            .field("deadline", &self.inner.deadline)
            .field("state", &self.state())
            .field("completed", &self.is_completed())
            .field("pending_operations", &self.pending_operations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::core::Command;
    use std::sync::atomic::AtomicUsize;

    fn create_transaction(origin: Origin) -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            origin,
            PathBuf::from("/tmp/coordinator"),
            IsolationLevel::ReadUncommitted,
            Duration::from_secs(60),
            Utc::now() + chrono::Duration::seconds(60),
        )
    }

    fn counting_entry(commits: &Arc<AtomicUsize>, rollbacks: &Arc<AtomicUsize>) -> JournalEntry {
        let c = Arc::clone(commits);
        let r = Arc::clone(rollbacks);
        let commit: Command = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let rollback: Command = Arc::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        JournalEntry::new("insert", Some(commit), Some(rollback))
    }

    #[test]
    fn test_new_transaction_is_active() {
        let tx = create_transaction(Origin::Root);
        assert_eq!(tx.state(), TransactionState::Active);
        assert!(tx.is_root());
        assert!(!tx.is_completed());
        assert_eq!(tx.pending_operations(), 0);
    }

    #[test]
    fn test_participant_is_not_root() {
        let tx = create_transaction(Origin::Participant(Uuid::new_v4()));
        assert!(!tx.is_root());
    }

    #[test]
    fn test_clone_shares_state() {
        let tx = create_transaction(Origin::Root);
        let clone = tx.clone();
        tx.set_completed().unwrap();
        assert!(clone.is_completed());
    }

    #[test]
    fn test_set_completed_twice_fails() {
        let tx = create_transaction(Origin::Root);
        tx.set_completed().unwrap();
        let err = tx.set_completed().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_enlist_after_complete_fails() {
        let tx = create_transaction(Origin::Root);
        tx.set_completed().unwrap();
        let err = tx
            .add_journal_entry(JournalEntry::new("insert", None, None))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_settle_committed_runs_commits_only() {
        let commits = Arc::new(AtomicUsize::new(0));
        let rollbacks = Arc::new(AtomicUsize::new(0));
        let tx = create_transaction(Origin::Root);
        tx.add_journal_entry(counting_entry(&commits, &rollbacks)).unwrap();
        tx.add_journal_entry(counting_entry(&commits, &rollbacks)).unwrap();

        let outcome = tx.settle(TransactionOutcome::Committed).unwrap();
        assert_eq!(outcome, TransactionOutcome::Committed);
        assert_eq!(commits.load(Ordering::SeqCst), 2);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 0);
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(tx.pending_operations(), 0);
    }

    #[test]
    fn test_settle_aborted_runs_rollbacks_only() {
        let commits = Arc::new(AtomicUsize::new(0));
        let rollbacks = Arc::new(AtomicUsize::new(0));
        let tx = create_transaction(Origin::Root);
        tx.add_journal_entry(counting_entry(&commits, &rollbacks)).unwrap();

        tx.settle(TransactionOutcome::Aborted).unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 0);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_settle_twice_keeps_first_outcome() {
        let commits = Arc::new(AtomicUsize::new(0));
        let rollbacks = Arc::new(AtomicUsize::new(0));
        let tx = create_transaction(Origin::Root);
        tx.add_journal_entry(counting_entry(&commits, &rollbacks)).unwrap();

        tx.settle(TransactionOutcome::Committed).unwrap();
        let second = tx.settle(TransactionOutcome::Aborted).unwrap();
        assert_eq!(second, TransactionOutcome::Committed);
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_settle_reports_failed_command_but_runs_the_rest() {
        let commits = Arc::new(AtomicUsize::new(0));
        let rollbacks = Arc::new(AtomicUsize::new(0));
        let tx = create_transaction(Origin::Root);
        let failing: Command =
            Arc::new(|| Err(HandoffError::new("disk full", ErrorKind::IOError)));
        tx.add_journal_entry(JournalEntry::new("insert", Some(failing), None))
            .unwrap();
        tx.add_journal_entry(counting_entry(&commits, &rollbacks)).unwrap();

        let err = tx.settle(TransactionOutcome::Committed).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ResourceOperationError);
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(tx.state(), TransactionState::Committed);
    }

    #[test]
    fn test_is_expired() {
        let tx = Transaction::new(
            Uuid::new_v4(),
            Origin::Root,
            PathBuf::from("/tmp/coordinator"),
            IsolationLevel::ReadUncommitted,
            Duration::from_secs(1),
            Utc::now() - chrono::Duration::seconds(1),
        );
        assert!(tx.is_expired(Utc::now()));
    }
}
