//! Transaction coordination: scopes, propagation, voting and the final decision.
mod core;
mod file_coordinator;
mod record;
mod signal;
mod transaction;
mod transaction_coordinator;

pub use self::core::*;
pub use file_coordinator::*;
pub use record::*;
pub use signal::*;
pub use transaction::*;
pub use transaction_coordinator::*;
