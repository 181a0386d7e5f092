use super::data_store::DataStore;
use super::statement::WriteStatement;
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use crate::session::TransactionSession;
use chrono::Utc;

/// The single write each participant performs inside the shared transaction.
#[derive(Clone)]
pub struct ResourceOperation {
    store: DataStore,
    table: String,
}

impl ResourceOperation {
    pub fn new(store: DataStore, table: &str) -> Self {
        ResourceOperation {
            store,
            table: table.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Inserts the current timestamp into the table, enlisted in the session's transaction.
    ///
    /// # Errors
    /// `ResourceOperationError` for any failure. The session is left untouched so the
    /// caller can still dispose it, which then aborts.
    pub fn perform_write(&self, session: &TransactionSession) -> HandoffResult<()> {
        let timestamp = Utc::now();
        let statement = WriteStatement::insert(&self.table).bind("@1", timestamp.to_rfc3339());

        let result = session
            .active_transaction()
            .and_then(|transaction| self.store.execute_write(transaction, &statement));
        match result {
            Ok(()) => {
                log::info!(
                    "{} participant wrote {} into {} within transaction {}",
                    session.role(),
                    timestamp,
                    self.table,
                    session.id()
                );
                Ok(())
            }
            Err(e) if e.kind() == &ErrorKind::ResourceOperationError => Err(e),
            Err(e) => Err(HandoffError::new_with_cause(
                &format!("Write into {} failed", self.table),
                ErrorKind::ResourceOperationError,
                e,
            )),
        }
    }
}
