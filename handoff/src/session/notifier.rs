use super::transaction_session::TransactionSession;
use crate::channel::{PropagationToken, TokenChannel};
use crate::coordinator::{CompletionSignal, TransactionOutcome};
use crate::errors::HandoffResult;
use chrono::Utc;
use std::time::Duration;

/// Inner participant's side of the completion handshake.
///
/// Acknowledges receipt of the token by clearing the channel, then blocks on the resumed
/// transaction's terminal outcome and settles the session's enlisted work with it. The
/// wait ends at the transaction deadline plus one resolution poll, after which the
/// transaction is presumed aborted.
pub struct CompletionNotifier {
    channel: TokenChannel,
    resolution_poll: Duration,
}

impl CompletionNotifier {
    pub fn new(channel: TokenChannel, resolution_poll: Duration) -> Self {
        CompletionNotifier {
            channel,
            resolution_poll,
        }
    }

    /// Clears the channel if it still holds `token`, signalling receipt to the outer
    /// participant.
    pub fn acknowledge(&self, token: &PropagationToken) -> HandoffResult<bool> {
        let cleared = self.channel.clear_if_holds(token)?;
        if cleared {
            log::info!(
                "Deleted propagation token from {}",
                self.channel.path().display()
            );
        } else {
            log::warn!(
                "Token channel {} no longer holds the consumed token",
                self.channel.path().display()
            );
        }
        Ok(cleared)
    }

    /// Registers for the terminal outcome of the session's transaction.
    pub fn watch(&self, session: &TransactionSession) -> HandoffResult<CompletionSignal> {
        session.on_completed()
    }

    /// Blocks until the outcome arrives, then settles the session with it.
    pub fn await_outcome(
        &self,
        session: &TransactionSession,
        signal: &CompletionSignal,
    ) -> HandoffResult<TransactionOutcome> {
        let deadline = session.transaction().deadline();
        let limit = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO) + self.resolution_poll;

        let outcome = match signal.wait(limit) {
            Some(outcome) => outcome,
            None => {
                log::warn!(
                    "No outcome for transaction {} by its deadline {}, resolving in doubt",
                    session.id(),
                    deadline
                );
                session.resolve_in_doubt()?
            }
        };
        session.settle(outcome)
    }
}
