use super::core::TransactionOutcome;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Creates a connected sender/signal pair for one transaction's terminal outcome.
pub fn completion_channel() -> (CompletionSender, CompletionSignal) {
    let (sender, receiver) = bounded(1);
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        CompletionSender {
            sender,
            cancelled: Arc::clone(&cancelled),
        },
        CompletionSignal {
            receiver,
            cancelled,
            received: Mutex::new(None),
        },
    )
}

/// Producer half, held by whatever observes the coordinator's decision.
pub struct CompletionSender {
    sender: Sender<TransactionOutcome>,
    cancelled: Arc<AtomicBool>,
}

impl CompletionSender {
    /// Delivers the outcome. Returns false if nobody is waiting anymore.
    pub fn notify(&self, outcome: TransactionOutcome) -> bool {
        self.sender.try_send(outcome).is_ok()
    }

    /// True once the matching [`CompletionSignal`] was dropped.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Blocking handle on a transaction's terminal outcome.
///
/// Replaces a "transaction completed" callback: the owner decides when to block and for
/// how long. Once received, the outcome is remembered, so later waits return immediately.
/// Dropping the signal tells the producer to stop watching.
pub struct CompletionSignal {
    receiver: Receiver<TransactionOutcome>,
    cancelled: Arc<AtomicBool>,
    received: Mutex<Option<TransactionOutcome>>,
}

impl CompletionSignal {
    /// Blocks until the outcome arrives or `limit` elapses.
    ///
    /// Returns `None` on timeout, or early if the producer went away without an outcome.
    pub fn wait(&self, limit: Duration) -> Option<TransactionOutcome> {
        let mut received = self.received.lock();
        if received.is_none() {
            match self.receiver.recv_timeout(limit) {
                Ok(outcome) => *received = Some(outcome),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("Completion watcher stopped before an outcome was observed");
                }
            }
        }
        *received
    }

    /// Returns the outcome if it has already arrived, without blocking.
    pub fn try_outcome(&self) -> Option<TransactionOutcome> {
        let mut received = self.received.lock();
        if received.is_none() {
            if let Ok(outcome) = self.receiver.try_recv() {
                *received = Some(outcome);
            }
        }
        *received
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
