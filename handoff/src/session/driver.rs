use super::notifier::CompletionNotifier;
use super::transaction_session::TransactionSession;
use super::waiter::{CompletionWaiter, WaitState};
use crate::channel::{detect_role, Assignment, PropagationToken, Role, TokenChannel};
use crate::coordinator::{Coordinator, FileCoordinator, TransactionOutcome};
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use crate::handoff_config::HandoffConfig;
use crate::store::{DataStore, FileDataStore, ResourceOperation};
use std::sync::Arc;
use uuid::Uuid;

/// Every round committed.
pub const EXIT_COMMITTED: i32 = 0;
/// The run could not proceed.
pub const EXIT_FATAL: i32 = 1;
/// A transaction aborted or a write failed.
pub const EXIT_ABORTED: i32 = 2;

/// Called by the outer participant right after its token is published.
pub type PublishHook = Arc<dyn Fn(&PropagationToken) -> HandoffResult<()> + Send + Sync>;

/// What happened to one transaction.
#[derive(Debug)]
pub struct RoundReport {
    pub transaction_id: Uuid,
    /// Terminal state of the outer participant's wait; `None` for the inner participant
    pub wait_state: Option<WaitState>,
    pub outcome: Option<TransactionOutcome>,
    /// Recoverable errors met along the way
    pub errors: Vec<HandoffError>,
}

impl RoundReport {
    fn new(transaction_id: Uuid) -> Self {
        RoundReport {
            transaction_id,
            wait_state: None,
            outcome: None,
            errors: Vec::new(),
        }
    }

    /// Committed, with no failure other than an expired wait.
    pub fn is_committed(&self) -> bool {
        self.outcome == Some(TransactionOutcome::Committed)
            && self
                .errors
                .iter()
                .all(|e| e.kind() == &ErrorKind::WaitTimeout)
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub role: Role,
    pub rounds: Vec<RoundReport>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        if self.rounds.iter().all(RoundReport::is_committed) {
            EXIT_COMMITTED
        } else {
            EXIT_ABORTED
        }
    }
}

/// Removes a token this invocation owns when it goes out of scope, on every exit path.
struct ChannelGuard<'a> {
    channel: &'a TokenChannel,
    token: Option<PropagationToken>,
}

impl<'a> ChannelGuard<'a> {
    fn new(channel: &'a TokenChannel) -> Self {
        ChannelGuard {
            channel,
            token: None,
        }
    }

    fn own(&mut self, token: PropagationToken) {
        self.token = Some(token);
    }
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            match self.channel.clear_if_holds(&token) {
                Ok(true) => log::info!(
                    "Removed leftover token from {}",
                    self.channel.path().display()
                ),
                Ok(false) => {}
                Err(e) => log::error!(
                    "Failed to remove token from {}: {:?}",
                    self.channel.path().display(),
                    e
                ),
            }
        }
    }
}

/// Runs one invocation of the handoff: detects the role from the token channel, then
/// drives the outer or the inner participant's flow to completion.
///
/// # Errors
/// Fatal errors are returned once the owned token is cleaned up and every open
/// transaction is disposed: a malformed token, a transaction that cannot be resumed or
/// begun, an occupied channel. Write failures and an expired wait are recorded in the
/// [`RunReport`] instead, and the flow carries on to disposal.
pub struct SessionDriver {
    config: HandoffConfig,
    coordinator: Coordinator,
    operation: ResourceOperation,
    channel: TokenChannel,
    publish_hook: Option<PublishHook>,
}

impl SessionDriver {
    /// Creates a driver over the file-backed coordinator and data store named by `config`.
    pub fn new(config: HandoffConfig) -> Self {
        let coordinator = Coordinator::new(
            FileCoordinator::new(config.coordinator())
                .with_resolution_poll(config.resolution_poll()),
        );
        let store = DataStore::new(FileDataStore::new(config.data_store()));
        Self::with_backends(config, coordinator, store)
    }

    pub fn with_backends(config: HandoffConfig, coordinator: Coordinator, store: DataStore) -> Self {
        let operation = ResourceOperation::new(store, config.table());
        let channel = TokenChannel::new(config.token_file());
        SessionDriver {
            config,
            coordinator,
            operation,
            channel,
            publish_hook: None,
        }
    }

    /// Installs a hook the outer participant calls after publishing each token.
    pub fn with_publish_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PropagationToken) -> HandoffResult<()> + Send + Sync + 'static,
    {
        self.publish_hook = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &HandoffConfig {
        &self.config
    }

    pub fn channel(&self) -> &TokenChannel {
        &self.channel
    }

    pub fn run(&self) -> HandoffResult<RunReport> {
        let assignment = detect_role(&self.channel).inspect_err(|e| {
            if e.kind() == &ErrorKind::TokenDecodeError {
                log::error!(
                    "Leaving unreadable token in {} untouched",
                    self.channel.path().display()
                );
            }
        })?;

        match assignment {
            Assignment::Outer => self.run_outer(),
            Assignment::Inner(token) => self.run_inner(token),
        }
    }

    fn run_outer(&self) -> HandoffResult<RunReport> {
        // blank content reads as no token but still occupies the slot
        if self.channel.is_occupied()? {
            log::warn!(
                "Discarding blank token file {}",
                self.channel.path().display()
            );
            self.channel.clear()?;
        }

        let total = self.config.rounds();
        let mut rounds = Vec::with_capacity(total as usize);
        for round in 1..=total {
            log::info!("Outer round {} of {}", round, total);
            rounds.push(self.outer_round()?);
        }
        Ok(RunReport {
            role: Role::Outer,
            rounds,
        })
    }

    fn outer_round(&self) -> HandoffResult<RoundReport> {
        let mut guard = ChannelGuard::new(&self.channel);
        let session =
            TransactionSession::begin_outer(&self.coordinator, &self.config.transaction_options())?;
        let mut report = RoundReport::new(session.id());
        if self.write(&session, &mut report) {
            let mut waiter = CompletionWaiter::new(
                self.channel.clone(),
                self.config.poll_interval(),
                self.config.max_wait(),
            );
            let token = waiter.publish(&session)?;
            guard.own(token.clone());
            if let Some(hook) = &self.publish_hook {
                hook(&token)?;
            }

            let wait_state = waiter.wait()?;
            report.wait_state = Some(wait_state);
            if wait_state == WaitState::TimedOut {
                report.errors.push(waiter.timeout_error());
            }
            session.mark_complete()?;
        } else {
            // the transaction can only abort, so nobody is invited to join it
            log::warn!(
                "Outer write failed, disposing transaction {} without publishing a token",
                report.transaction_id
            );
        }
        report.outcome = match session.dispose() {
            Ok(outcome) => outcome,
            Err(e) if e.kind() == &ErrorKind::ResourceOperationError => {
                report.errors.push(e);
                session.outcome()
            }
            Err(e) => return Err(e),
        };
        log::info!(
            "Outer participant finished transaction {}: {:?}",
            report.transaction_id,
            report.outcome
        );
        Ok(report)
    }

    fn run_inner(&self, token: PropagationToken) -> HandoffResult<RunReport> {
        let mut guard = ChannelGuard::new(&self.channel);
        guard.own(token.clone());

        let session = TransactionSession::resume_inner(
            &self.coordinator,
            &token,
            self.config.transaction_timeout(),
        )?;
        let mut report = RoundReport::new(session.id());
        let written = self.write(&session, &mut report);

        let notifier = CompletionNotifier::new(self.channel.clone(), self.config.resolution_poll());
        notifier.acknowledge(&token)?;
        let signal = notifier.watch(&session)?;

        if written {
            session.mark_complete()?;
        }
        session.dispose()?;

        match notifier.await_outcome(&session, &signal) {
            Ok(outcome) => report.outcome = Some(outcome),
            Err(e) if e.kind() == &ErrorKind::ResourceOperationError => {
                report.errors.push(e);
                report.outcome = session.outcome();
            }
            Err(e) => return Err(e),
        }
        log::info!(
            "Inner participant finished transaction {}: {:?}",
            report.transaction_id,
            report.outcome
        );
        Ok(RunReport {
            role: Role::Inner,
            rounds: vec![report],
        })
    }

    fn write(&self, session: &TransactionSession, report: &mut RoundReport) -> bool {
        match self.operation.perform_write(session) {
            Ok(()) => true,
            Err(e) => {
                log::error!("{:?}", e);
                report.errors.push(e);
                false
            }
        }
    }
}
