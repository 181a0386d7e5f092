use handoff::errors::HandoffResult;
use handoff::session::RunReport;
use handoff::store::{DataStoreProvider, FileDataStore, Row};
use handoff::{HandoffBuilder, HandoffConfig, SessionDriver};
use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use std::{env, fs};

/// Runs a test with retry logic and error handling.
///
/// `after` runs whether the test passed or failed, so every attempt cleans its directory.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> HandoffResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> HandoffResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> HandoffResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let ctx = match before() {
            Ok(ctx) => ctx,
            Err(e) => {
                last_error = Some(format!("Before run failed: {:?}", e));
                continue;
            }
        };

        let result = std::panic::catch_unwind(|| test(ctx.clone()));
        let after_result = after(ctx);
        let elapsed = start_time.elapsed();

        let failure = match (result, after_result) {
            (Ok(Ok(())), Ok(())) => return,
            (Ok(Ok(())), Err(e)) => format!("After run failed: {:?}", e),
            (Ok(Err(e)), _) => format!("Test failed: {:?}", e),
            (Err(panic_err), _) => {
                let message = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                format!("Panic: {}", message)
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("{}", failure);
            eprintln!("Retrying in {}ms...\n", 100 * attempt);
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
        last_error = Some(failure);
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    let backtrace = Backtrace::capture().to_string();
    if !backtrace.is_empty() && !backtrace.contains("disabled") {
        eprintln!("\nBacktrace:\n{}", backtrace);
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// An isolated handoff setup: its own work directory, hence its own token file,
/// coordinator address and data store.
#[derive(Clone)]
pub struct TestContext {
    path: PathBuf,
    config: HandoffConfig,
}

impl TestContext {
    pub fn new(path: PathBuf, config: HandoffConfig) -> Self {
        Self { path, config }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> HandoffConfig {
        self.config.clone()
    }

    /// A builder pointing at this context's directory with its fast timings.
    pub fn builder(&self) -> HandoffBuilder {
        fast_builder(&self.path)
    }

    /// Rows made durable in this context's data store.
    pub fn rows(&self) -> HandoffResult<Vec<Row>> {
        FileDataStore::new(self.config.data_store()).rows(self.config.table())
    }

    pub fn token_pending(&self) -> bool {
        self.config.token_file().exists()
    }
}

pub fn random_path() -> PathBuf {
    let id = uuid::Uuid::new_v4();
    env::temp_dir().join(format!("handoff-{}", id))
}

fn fast_builder(path: &Path) -> HandoffBuilder {
    HandoffBuilder::new()
        .work_dir(path)
        .transaction_timeout(Duration::from_secs(20))
        .poll_interval(Duration::from_millis(20))
        .max_wait(Duration::from_secs(10))
        .resolution_poll(Duration::from_millis(10))
}

pub fn create_test_context() -> HandoffResult<TestContext> {
    let path = random_path();
    if path.exists() {
        let _ = fs::remove_dir_all(&path);
    }
    fs::create_dir_all(&path)?;
    let config = fast_builder(&path).build()?;
    Ok(TestContext::new(path, config))
}

pub fn cleanup(ctx: TestContext) -> HandoffResult<()> {
    let path = ctx.path().to_path_buf();
    let max_retries = 10;

    for retry in 0..max_retries {
        if !path.exists() {
            return Ok(());
        }
        match fs::remove_dir_all(&path) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(_) if retry < max_retries - 1 => {
                // a watcher thread may still be polling inside the directory
                thread::sleep(Duration::from_millis(50 * (retry as u64 + 1)));
            }
            Err(e) => {
                eprintln!(
                    "Warning: Failed to remove test directory {} after {} attempts: {:?}",
                    path.display(),
                    max_retries,
                    e
                );
                return Ok(());
            }
        }
    }
    Ok(())
}

/// Inner participants started by [`with_inner_participant`].
pub type InnerRuns = Arc<Mutex<Vec<JoinHandle<HandoffResult<RunReport>>>>>;

/// A driver for `outer` that runs an inner participant with `inner` on its own thread
/// each time it publishes a token.
pub fn with_inner_participant(outer: HandoffConfig, inner: HandoffConfig) -> (SessionDriver, InnerRuns) {
    let runs: InnerRuns = Arc::new(Mutex::new(Vec::new()));
    let spawned = Arc::clone(&runs);
    let driver = SessionDriver::new(outer).with_publish_hook(move |_token| {
        let config = inner.clone();
        let handle = thread::spawn(move || SessionDriver::new(config).run());
        spawned.lock().push(handle);
        Ok(())
    });
    (driver, runs)
}

/// Joins every inner participant started so far.
///
/// A panic on an inner participant's thread is raised again on the caller's thread.
pub fn join_inner_runs(runs: &InnerRuns) -> Vec<HandoffResult<RunReport>> {
    let handles: Vec<_> = runs.lock().drain(..).collect();
    handles
        .into_iter()
        .map(|handle| match handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        })
        .collect()
}
