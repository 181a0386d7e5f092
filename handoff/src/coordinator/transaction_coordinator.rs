use super::core::{TransactionOutcome, TransactionOptions};
use super::signal::CompletionSignal;
use super::transaction::Transaction;
use crate::channel::PropagationToken;
use crate::errors::HandoffResult;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Contract of the distributed transaction coordinator.
///
/// The handoff protocol depends on nothing else: begin a root scope, export it to a token,
/// import a token into a participant scope, mark a scope complete, dispose it, and observe
/// the terminal outcome. How the coordinator reaches agreement between the participants is
/// its own business.
///
/// # Implementations
/// - `FileCoordinator`: coordination through a directory shared by the participants
///
/// # Thread Safety
/// Implementers must be `Send + Sync`.
pub trait CoordinatorProvider: Send + Sync {
    /// Starts a new root transaction.
    fn begin_scope(&self, options: &TransactionOptions) -> HandoffResult<Transaction>;

    /// Exports an active transaction so another process can join it.
    fn export_token(&self, transaction: &Transaction) -> HandoffResult<PropagationToken>;

    /// Joins the transaction identified by `token` as a participant.
    ///
    /// # Errors
    /// `TransactionResumeError` if the token is malformed, the coordinator cannot be
    /// reached, or the transaction is no longer open.
    fn import_token(
        &self,
        token: &PropagationToken,
        timeout: Duration,
    ) -> HandoffResult<Transaction>;

    /// Marks the scope holding `transaction` complete.
    fn mark_complete(&self, transaction: &Transaction) -> HandoffResult<()>;

    /// Disposes the scope holding `transaction`.
    ///
    /// For the root this decides and publishes the outcome, which is returned. For a
    /// participant this casts its vote and returns `None`; the outcome arrives later
    /// through [`CoordinatorProvider::on_completed`].
    fn dispose_scope(&self, transaction: &Transaction) -> HandoffResult<Option<TransactionOutcome>>;

    /// Starts watching for the terminal outcome of `transaction`.
    fn on_completed(&self, transaction: &Transaction) -> HandoffResult<CompletionSignal>;

    /// Resolves a transaction whose outcome never arrived by presuming abort.
    ///
    /// Returns the outcome that is final after the call, which is the one already decided
    /// if the decision raced ahead.
    fn resolve_in_doubt(&self, transaction: &Transaction) -> HandoffResult<TransactionOutcome>;
}

/// Cheaply cloneable handle on a coordinator implementation.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<dyn CoordinatorProvider>,
}

impl Coordinator {
    pub fn new<T: CoordinatorProvider + 'static>(inner: T) -> Self {
        Coordinator {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for Coordinator {
    type Target = Arc<dyn CoordinatorProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
