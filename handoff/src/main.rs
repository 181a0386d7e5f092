use clap::Parser;
use handoff::errors::HandoffResult;
use handoff::session::{EXIT_ABORTED, EXIT_COMMITTED, EXIT_FATAL};
use handoff::{HandoffBuilder, HandoffConfig, SessionDriver};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::Arc;
use std::time::Duration;

/// Takes part in a cross-process transaction handoff.
///
/// The first instance started against an empty token file becomes the outer participant;
/// an instance started while a token is pending becomes the inner participant.
#[derive(Parser, Debug)]
#[command(name = "handoff", version)]
struct Cli {
    /// Directory holding the data store, the coordinator and the token file
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Data store connection target (directory)
    #[arg(long)]
    data_store: Option<PathBuf>,

    /// Table written by each participant
    #[arg(long)]
    table: Option<String>,

    /// Coordinator address shared by both participants (directory)
    #[arg(long)]
    coordinator: Option<PathBuf>,

    /// Token file path
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Transaction timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Isolation level, e.g. read-uncommitted or serializable
    #[arg(long)]
    isolation: Option<String>,

    /// Interval between two checks of the token file, in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Bound on the outer participant's wait, in milliseconds
    #[arg(long)]
    max_wait_ms: Option<u64>,

    /// Number of transactions run by the outer participant
    #[arg(long)]
    rounds: Option<u32>,

    /// Interval at which votes and outcomes are re-read, in milliseconds
    #[arg(long)]
    resolution_poll_ms: Option<u64>,

    /// Launch the inner participant after publishing each token
    #[arg(long)]
    spawn_inner: bool,
}

impl Cli {
    fn into_config(self) -> HandoffResult<HandoffConfig> {
        let mut builder = HandoffBuilder::new();
        if let Some(work_dir) = self.work_dir {
            builder = builder.work_dir(work_dir);
        }
        if let Some(path) = self.data_store {
            builder = builder.data_store(path);
        }
        if let Some(table) = self.table {
            builder = builder.table(&table);
        }
        if let Some(path) = self.coordinator {
            builder = builder.coordinator(path);
        }
        if let Some(path) = self.token_file {
            builder = builder.token_file(path);
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.transaction_timeout(Duration::from_millis(ms));
        }
        if let Some(isolation) = self.isolation {
            builder = builder.isolation_level_text(&isolation);
        }
        if let Some(ms) = self.poll_interval_ms {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_wait_ms {
            builder = builder.max_wait(Duration::from_millis(ms));
        }
        if let Some(rounds) = self.rounds {
            builder = builder.rounds(rounds);
        }
        if let Some(ms) = self.resolution_poll_ms {
            builder = builder.resolution_poll(Duration::from_millis(ms));
        }
        builder.spawn_inner(self.spawn_inner).build()
    }
}

/// Arguments that make a child instance use exactly the parent's settings.
fn inner_args(config: &HandoffConfig) -> Vec<String> {
    vec![
        "--data-store".into(),
        config.data_store().display().to_string(),
        "--table".into(),
        config.table().to_string(),
        "--coordinator".into(),
        config.coordinator().display().to_string(),
        "--token-file".into(),
        config.token_file().display().to_string(),
        "--timeout-ms".into(),
        config.transaction_timeout().as_millis().to_string(),
        "--isolation".into(),
        config.isolation_level().to_string(),
        "--poll-interval-ms".into(),
        config.poll_interval().as_millis().to_string(),
        "--max-wait-ms".into(),
        config.max_wait().as_millis().to_string(),
        "--resolution-poll-ms".into(),
        config.resolution_poll().as_millis().to_string(),
    ]
}

fn spawn_inner(config: &HandoffConfig, children: &Mutex<Vec<Child>>) -> HandoffResult<()> {
    let exe = std::env::current_exe()?;
    let child = Command::new(exe).args(inner_args(config)).spawn()?;
    log::info!("Started inner participant, pid {}", child.id());
    children.lock().push(child);
    Ok(())
}

fn wait_children(children: &Mutex<Vec<Child>>) -> bool {
    let mut all_committed = true;
    for mut child in children.lock().drain(..) {
        match child.wait() {
            Ok(status) => {
                log::info!("Inner participant {} exited with {}", child.id(), status);
                all_committed &= status.success();
            }
            Err(e) => {
                log::error!("Failed to wait for inner participant {}: {}", child.id(), e);
                all_committed = false;
            }
        }
    }
    all_committed
}

fn run(config: HandoffConfig) -> HandoffResult<i32> {
    let children: Arc<Mutex<Vec<Child>>> = Arc::new(Mutex::new(Vec::new()));
    let mut driver = SessionDriver::new(config.clone());
    if config.spawn_inner() {
        let spawned = Arc::clone(&children);
        let child_config = config.clone();
        driver = driver.with_publish_hook(move |_token| spawn_inner(&child_config, &spawned));
    }

    let result = driver.run();
    let children_committed = wait_children(&children);
    Ok(exit_code(result?.exit_code(), children_committed))
}

/// Exit code of this invocation given its own report and the fate of the children it
/// started.
fn exit_code(own: i32, children_committed: bool) -> i32 {
    if own == EXIT_COMMITTED && !children_committed {
        log::error!("An inner participant did not commit");
        EXIT_ABORTED
    } else {
        own
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // usage errors are fatal, not an abort
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_FATAL } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let code = match cli.into_config() {
        Ok(config) => match run(config) {
            Ok(code) => code,
            Err(e) => {
                log::error!("{:?}", e);
                EXIT_FATAL
            }
        },
        Err(e) => {
            log::error!("Invalid configuration: {:?}", e);
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}
