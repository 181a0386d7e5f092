use std::time::Duration;

/// Default transaction timeout.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(60);
/// Default interval between two checks of the token channel.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default bound on how long the outer participant waits for the inner one.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(65);
/// Default interval at which the coordinator re-reads votes and outcomes.
pub const DEFAULT_RESOLUTION_POLL: Duration = Duration::from_millis(100);

pub const DEFAULT_TABLE: &str = "HANDOFF_TEST";
pub const DEFAULT_ROUNDS: u32 = 1;

pub const DEFAULT_WORK_DIR: &str = "handoff";
pub const TOKEN_FILE_NAME: &str = "token.txt";
pub const DATA_DIR_NAME: &str = "data";
pub const COORDINATOR_DIR_NAME: &str = "coordinator";

/// Version tag written into every propagation token payload.
pub const TOKEN_FORMAT_VERSION: u8 = 1;

pub const TRANSACTION_RECORD_FILE: &str = "transaction.json";
pub const OUTCOME_RECORD_FILE: &str = "outcome.json";
pub const SEALED_MARKER_FILE: &str = "sealed";
pub const PARTICIPANTS_DIR: &str = "participants";
