use crate::channel::{PropagationToken, Role};
use crate::coordinator::{
    CompletionSignal, Coordinator, IsolationLevel, Transaction, TransactionOptions,
    TransactionOutcome,
};
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use parking_lot::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of a [`TransactionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Active,
    MarkedComplete,
    Disposed,
}

/// One participant's view of the distributed transaction.
///
/// The outer participant begins a new root transaction; the inner participant resumes the
/// one named by a propagation token. Only the exported token ever leaves the process.
///
/// # Lifecycle
/// `Active` → `MarkedComplete` → `Disposed`. Disposing without marking complete makes the
/// transaction abort. A session that is dropped undisposed is disposed on drop.
///
/// # Settlement
/// - The root learns the outcome from its own disposal and settles its enlisted work then.
/// - A participant only votes on disposal. Its enlisted work is settled through
///   [`TransactionSession::settle`] once the outcome is observed.
pub struct TransactionSession {
    role: Role,
    coordinator: Coordinator,
    transaction: Transaction,
    state: Mutex<SessionState>,
    outcome: Mutex<Option<TransactionOutcome>>,
}

impl TransactionSession {
    /// Begins a new root transaction.
    pub fn begin_outer(
        coordinator: &Coordinator,
        options: &TransactionOptions,
    ) -> HandoffResult<TransactionSession> {
        let transaction = coordinator.begin_scope(options)?;
        log::info!(
            "Outer session began transaction {} ({})",
            transaction.id(),
            transaction.isolation_level()
        );
        Ok(Self::new(Role::Outer, coordinator, transaction))
    }

    /// Joins the transaction identified by `token`.
    ///
    /// # Errors
    /// `TransactionResumeError` if the transaction cannot be joined. There is nothing to
    /// fall back to.
    pub fn resume_inner(
        coordinator: &Coordinator,
        token: &PropagationToken,
        timeout: Duration,
    ) -> HandoffResult<TransactionSession> {
        let transaction = coordinator.import_token(token, timeout).map_err(|e| {
            if e.kind() == &ErrorKind::TransactionResumeError {
                e
            } else {
                HandoffError::new_with_cause(
                    "Failed to resume the propagated transaction",
                    ErrorKind::TransactionResumeError,
                    e,
                )
            }
        })?;
        log::info!(
            "Inner session resumed transaction {} ({})",
            transaction.id(),
            transaction.isolation_level()
        );
        Ok(Self::new(Role::Inner, coordinator, transaction))
    }

    fn new(role: Role, coordinator: &Coordinator, transaction: Transaction) -> Self {
        TransactionSession {
            role,
            coordinator: coordinator.clone(),
            transaction,
            state: Mutex::new(SessionState::Active),
            outcome: Mutex::new(None),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn id(&self) -> Uuid {
        self.transaction.id()
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.transaction.isolation_level()
    }

    pub fn timeout(&self) -> Duration {
        self.transaction.timeout()
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// The settled outcome, once known to this session.
    pub fn outcome(&self) -> Option<TransactionOutcome> {
        *self.outcome.lock()
    }

    /// The transaction, provided the session still accepts work.
    pub fn active_transaction(&self) -> HandoffResult<&Transaction> {
        self.expect_state(SessionState::Active, "enlist work")?;
        Ok(&self.transaction)
    }

    /// Exports the transaction so another process can join it.
    pub fn export_token(&self) -> HandoffResult<PropagationToken> {
        self.expect_state(SessionState::Active, "export the transaction")?;
        self.coordinator.export_token(&self.transaction)
    }

    /// Marks the scope complete; disposal will then vote to commit.
    pub fn mark_complete(&self) -> HandoffResult<()> {
        let mut state = self.state.lock();
        if *state != SessionState::Active {
            return Err(invalid_state(*state, "mark the session complete"));
        }
        self.coordinator.mark_complete(&self.transaction)?;
        *state = SessionState::MarkedComplete;
        Ok(())
    }

    /// Starts watching for the transaction's terminal outcome.
    pub fn on_completed(&self) -> HandoffResult<CompletionSignal> {
        self.coordinator.on_completed(&self.transaction)
    }

    /// Disposes the scope. Idempotent.
    ///
    /// For the root this returns the decided outcome after settling the enlisted work. For
    /// a participant it casts the vote and returns `None`.
    pub fn dispose(&self) -> HandoffResult<Option<TransactionOutcome>> {
        let mut state = self.state.lock();
        if *state == SessionState::Disposed {
            return Ok(self.outcome());
        }
        *state = SessionState::Disposed;

        let decided = match self.coordinator.dispose_scope(&self.transaction) {
            Ok(decided) => decided,
            Err(e) => {
                log::error!(
                    "Failed to dispose transaction {}: {}",
                    self.transaction.id(),
                    e
                );
                // enlisted work can no longer commit
                if let Err(settle_error) = self.transaction.settle(TransactionOutcome::Aborted) {
                    log::error!("{:?}", settle_error);
                }
                return Err(e);
            }
        };
        log::info!("{} session disposed transaction {}", self.role, self.transaction.id());

        match decided {
            Some(outcome) => self.settle(outcome).map(Some),
            None => Ok(None),
        }
    }

    /// Settles the enlisted work with `outcome` and records it.
    pub fn settle(&self, outcome: TransactionOutcome) -> HandoffResult<TransactionOutcome> {
        let result = self.transaction.settle(outcome);
        let settled = match &result {
            Ok(settled) => *settled,
            Err(_) => outcome,
        };
        *self.outcome.lock() = Some(settled);
        log::info!("Transaction {} {}", self.transaction.id(), settled);
        result
    }

    /// Resolves a transaction whose outcome never arrived.
    pub fn resolve_in_doubt(&self) -> HandoffResult<TransactionOutcome> {
        self.coordinator.resolve_in_doubt(&self.transaction)
    }

    fn expect_state(&self, expected: SessionState, action: &str) -> HandoffResult<()> {
        let state = self.state();
        if state != expected {
            return Err(invalid_state(state, action));
        }
        Ok(())
    }
}

impl Drop for TransactionSession {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            log::error!("Error while disposing session: {:?}", e);
        }
    }
}

fn invalid_state(state: SessionState, action: &str) -> HandoffError {
    HandoffError::new(
        &format!("Cannot {} in session state {:?}", action, state),
        ErrorKind::InvalidOperation,
    )
}
