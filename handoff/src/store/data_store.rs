use super::statement::WriteStatement;
use crate::coordinator::Transaction;
use crate::errors::HandoffResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

/// A durable row, written once its transaction committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub values: Map<String, Value>,
    pub written_at: DateTime<Utc>,
}

/// Contract of a transactional data store acting as a resource manager.
///
/// # Implementations
/// - `FileDataStore`: one JSON-lines file per table
///
/// # Thread Safety
/// Implementers must be `Send + Sync`.
pub trait DataStoreProvider: Send + Sync {
    /// Executes `statement` inside `transaction`.
    ///
    /// The write is enlisted in the transaction and becomes durable only if the
    /// transaction commits.
    ///
    /// # Errors
    /// `ResourceOperationError` if the store cannot be opened or the statement is invalid.
    fn execute_write(&self, transaction: &Transaction, statement: &WriteStatement)
        -> HandoffResult<()>;

    /// Returns the durable rows of `table`, oldest first.
    fn rows(&self, table: &str) -> HandoffResult<Vec<Row>>;
}

/// Cloneable handle on a data store implementation.
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<dyn DataStoreProvider>,
}

impl DataStore {
    pub fn new<T: DataStoreProvider + 'static>(inner: T) -> Self {
        DataStore {
            inner: Arc::new(inner),
        }
    }
}

impl Deref for DataStore {
    type Target = Arc<dyn DataStoreProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
