use crate::coordinator::IsolationLevel;
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use crate::handoff_config::{HandoffConfig, HandoffConfigInner};
use crate::store::is_identifier;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Builder for a [`HandoffConfig`].
///
/// Setters validate their input as they go. The first invalid value is captured and
/// returned by [`HandoffBuilder::build`]; later setters are ignored once an error is held.
///
/// # Examples
///
/// ```rust,ignore
/// use handoff::HandoffBuilder;
///
/// let config = HandoffBuilder::new()
///     .work_dir("/tmp/handoff-a")
///     .transaction_timeout(Duration::from_secs(10))
///     .isolation_level_text("serializable")
///     .build()?;
/// ```
#[derive(Default)]
pub struct HandoffBuilder {
    error: Option<HandoffError>,
    settings: HandoffConfigInner,
}

impl HandoffBuilder {
    pub fn new() -> Self {
        HandoffBuilder {
            error: None,
            settings: HandoffConfigInner::default(),
        }
    }

    fn apply<F>(mut self, setter: F) -> Self
    where
        F: FnOnce(&mut HandoffConfigInner) -> HandoffResult<()>,
    {
        if self.error.is_none() {
            if let Err(e) = setter(&mut self.settings) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Places the data store, the coordinator and the token file under `work_dir`.
    ///
    /// Locations set individually before this call are replaced.
    pub fn work_dir(self, work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        self.apply(|settings| {
            settings.data_store = work_dir.join(crate::common::DATA_DIR_NAME);
            settings.coordinator = work_dir.join(crate::common::COORDINATOR_DIR_NAME);
            settings.token_file = work_dir.join(crate::common::TOKEN_FILE_NAME);
            Ok(())
        })
    }

    /// Sets the connection target of the data store.
    pub fn data_store(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.apply(|settings| {
            settings.data_store = path;
            Ok(())
        })
    }

    /// Sets the table written by the resource operation. Must be an identifier.
    pub fn table(self, table: &str) -> Self {
        self.apply(|settings| {
            if !is_identifier(table) {
                return Err(invalid(&format!("Invalid table name '{}'", table)));
            }
            settings.table = table.to_string();
            Ok(())
        })
    }

    /// Sets the coordinator address shared by both participants.
    pub fn coordinator(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.apply(|settings| {
            settings.coordinator = path;
            Ok(())
        })
    }

    pub fn token_file(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.apply(|settings| {
            if path.file_name().is_none() {
                return Err(invalid(&format!(
                    "Token file path '{}' does not name a file",
                    path.display()
                )));
            }
            settings.token_file = path;
            Ok(())
        })
    }

    pub fn transaction_timeout(self, timeout: Duration) -> Self {
        self.apply(|settings| {
            settings.transaction_timeout = non_zero("transaction timeout", timeout)?;
            Ok(())
        })
    }

    pub fn isolation_level(self, isolation_level: IsolationLevel) -> Self {
        self.apply(|settings| {
            settings.isolation_level = isolation_level;
            Ok(())
        })
    }

    /// Parses the isolation level from text, e.g. `read-uncommitted` or `Serializable`.
    pub fn isolation_level_text(self, isolation_level: &str) -> Self {
        self.apply(|settings| {
            settings.isolation_level = IsolationLevel::from_str(isolation_level)?;
            Ok(())
        })
    }

    pub fn poll_interval(self, interval: Duration) -> Self {
        self.apply(|settings| {
            settings.poll_interval = non_zero("poll interval", interval)?;
            Ok(())
        })
    }

    /// Sets the bound on the outer participant's wait. Zero gives up after one check.
    pub fn max_wait(self, max_wait: Duration) -> Self {
        self.apply(|settings| {
            settings.max_wait = max_wait;
            Ok(())
        })
    }

    pub fn rounds(self, rounds: u32) -> Self {
        self.apply(|settings| {
            if rounds == 0 {
                return Err(invalid("At least one round is required"));
            }
            settings.rounds = rounds;
            Ok(())
        })
    }

    pub fn resolution_poll(self, interval: Duration) -> Self {
        self.apply(|settings| {
            settings.resolution_poll = non_zero("resolution poll", interval)?;
            Ok(())
        })
    }

    pub fn spawn_inner(self, spawn_inner: bool) -> Self {
        self.apply(|settings| {
            settings.spawn_inner = spawn_inner;
            Ok(())
        })
    }

    /// Returns the configuration, or the first error captured by a setter.
    pub fn build(self) -> HandoffResult<HandoffConfig> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(HandoffConfig::from_inner(self.settings))
    }
}

fn non_zero(name: &str, value: Duration) -> HandoffResult<Duration> {
    if value.is_zero() {
        return Err(invalid(&format!("The {} must be greater than zero", name)));
    }
    Ok(value)
}

fn invalid(message: &str) -> HandoffError {
    HandoffError::new(message, ErrorKind::InvalidConfiguration)
}
