//! Configuration of a handoff run.

use crate::common::{
    COORDINATOR_DIR_NAME, DATA_DIR_NAME, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL,
    DEFAULT_RESOLUTION_POLL, DEFAULT_ROUNDS, DEFAULT_TABLE, DEFAULT_TRANSACTION_TIMEOUT,
    DEFAULT_WORK_DIR, TOKEN_FILE_NAME,
};
use crate::coordinator::{IsolationLevel, TransactionOptions};
use crate::handoff_builder::HandoffBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Immutable settings handed to the session driver.
///
/// Every location the two participants must agree on lives here, so tests can run
/// isolated handoffs side by side with distinct directories.
///
/// # Examples
///
/// ```rust,ignore
/// use handoff::HandoffConfig;
///
/// let config = HandoffConfig::builder()
///     .work_dir("/tmp/my-handoff")
///     .poll_interval(Duration::from_millis(50))
///     .build()?;
/// ```
#[derive(Clone, Debug)]
pub struct HandoffConfig {
    inner: Arc<HandoffConfigInner>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HandoffConfigInner {
    pub(crate) data_store: PathBuf,
    pub(crate) table: String,
    pub(crate) coordinator: PathBuf,
    pub(crate) token_file: PathBuf,
    pub(crate) transaction_timeout: Duration,
    pub(crate) isolation_level: IsolationLevel,
    pub(crate) poll_interval: Duration,
    pub(crate) max_wait: Duration,
    pub(crate) rounds: u32,
    pub(crate) resolution_poll: Duration,
    pub(crate) spawn_inner: bool,
}

impl HandoffConfigInner {
    pub(crate) fn in_work_dir(work_dir: &Path) -> Self {
        HandoffConfigInner {
            data_store: work_dir.join(DATA_DIR_NAME),
            table: DEFAULT_TABLE.to_string(),
            coordinator: work_dir.join(COORDINATOR_DIR_NAME),
            token_file: work_dir.join(TOKEN_FILE_NAME),
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            isolation_level: IsolationLevel::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            rounds: DEFAULT_ROUNDS,
            resolution_poll: DEFAULT_RESOLUTION_POLL,
            spawn_inner: false,
        }
    }
}

impl Default for HandoffConfigInner {
    fn default() -> Self {
        Self::in_work_dir(&std::env::temp_dir().join(DEFAULT_WORK_DIR))
    }
}

impl Default for HandoffConfig {
    fn default() -> Self {
        HandoffConfig::from_inner(HandoffConfigInner::default())
    }
}

impl HandoffConfig {
    /// Starts a builder with default settings.
    pub fn builder() -> HandoffBuilder {
        HandoffBuilder::new()
    }

    pub(crate) fn from_inner(inner: HandoffConfigInner) -> Self {
        HandoffConfig {
            inner: Arc::new(inner),
        }
    }

    /// Directory of the data store the resource operation writes to.
    pub fn data_store(&self) -> &Path {
        &self.inner.data_store
    }

    pub fn table(&self) -> &str {
        &self.inner.table
    }

    /// Directory shared by the participants to agree on outcomes.
    pub fn coordinator(&self) -> &Path {
        &self.inner.coordinator
    }

    pub fn token_file(&self) -> &Path {
        &self.inner.token_file
    }

    pub fn transaction_timeout(&self) -> Duration {
        self.inner.transaction_timeout
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation_level
    }

    /// Interval between two checks of the token channel by the outer participant.
    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    /// Bound on how long the outer participant waits for its token to be consumed.
    pub fn max_wait(&self) -> Duration {
        self.inner.max_wait
    }

    /// Number of transactions the outer participant runs in one invocation.
    pub fn rounds(&self) -> u32 {
        self.inner.rounds
    }

    pub fn resolution_poll(&self) -> Duration {
        self.inner.resolution_poll
    }

    /// Whether the outer participant launches the inner instance itself.
    pub fn spawn_inner(&self) -> bool {
        self.inner.spawn_inner
    }

    /// Options every root transaction of this run begins with.
    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions::new(self.inner.isolation_level, self.inner.transaction_timeout)
    }
}
