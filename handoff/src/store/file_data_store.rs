use super::data_store::{DataStoreProvider, Row};
use super::statement::WriteStatement;
use crate::common::{append_line, read_if_exists};
use crate::coordinator::{Command, JournalEntry, Transaction};
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Map;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Resource manager keeping one JSON-lines file per table under a directory.
///
/// Writes are enlisted in the caller's transaction: the row is appended when the
/// transaction settles as committed and dropped when it aborts.
#[derive(Debug, Clone)]
pub struct FileDataStore {
    root: PathBuf,
    append_lock: Arc<Mutex<()>>,
}

impl FileDataStore {
    /// Creates a store whose connection target is the directory `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileDataStore {
            root: root.into(),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", table))
    }

    fn open(&self) -> HandoffResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            HandoffError::new_with_cause(
                &format!("Cannot open data store at {}", self.root.display()),
                ErrorKind::ResourceOperationError,
                e.into(),
            )
        })
    }
}

impl DataStoreProvider for FileDataStore {
    fn execute_write(
        &self,
        transaction: &Transaction,
        statement: &WriteStatement,
    ) -> HandoffResult<()> {
        statement.validate()?;
        self.open()?;

        let values: Map<_, _> = statement.parameters().iter().cloned().collect();
        let row = Row {
            id: Uuid::new_v4(),
            transaction_id: transaction.id(),
            values,
            written_at: Utc::now(),
        };
        let line = serde_json::to_string(&row)?;
        let row_id = row.id;
        let table = statement.table().to_string();
        let path = self.table_path(&table);
        let append_lock = Arc::clone(&self.append_lock);

        let commit: Command = Arc::new(move || {
            let _guard = append_lock.lock();
            append_line(&path, &line)
        });
        let rollback: Command = Arc::new(move || {
            log::debug!("Discarded row {} of table {}", row_id, table);
            Ok(())
        });

        transaction
            .add_journal_entry(JournalEntry::new(
                &statement.to_string(),
                Some(commit),
                Some(rollback),
            ))
            .map_err(|e| {
                HandoffError::new_with_cause(
                    &format!("Failed to enlist {} in transaction {}", statement, transaction.id()),
                    ErrorKind::ResourceOperationError,
                    e,
                )
            })
    }

    fn rows(&self, table: &str) -> HandoffResult<Vec<Row>> {
        let text = match read_if_exists(&self.table_path(table))? {
            Some(text) => text,
            None => return Ok(Vec::new()),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(HandoffError::from))
            .collect()
    }
}
