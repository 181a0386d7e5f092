//! Participant sessions and the flows that drive them.

mod driver;
mod notifier;
mod transaction_session;
mod waiter;

pub use driver::*;
pub use notifier::CompletionNotifier;
pub use transaction_session::{SessionState, TransactionSession};
pub use waiter::{CompletionWaiter, WaitState};
