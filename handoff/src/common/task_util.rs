use std::time::Duration;

/// Spawn a named background task on its own thread.
pub fn async_task<OP>(name: &str, op: OP)
where
    OP: FnOnce() + Send + 'static,
{
    let spawned = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(op);
    if let Err(e) = spawned {
        log::error!("Failed to spawn background task {}: {}", name, e);
    }
}

/// Sleeps for `interval`, but never past `remaining`.
///
/// Returns the time actually slept.
#[inline]
pub fn bounded_sleep(interval: Duration, remaining: Duration) -> Duration {
    let nap = interval.min(remaining);
    if !nap.is_zero() {
        std::thread::sleep(nap);
    }
    nap
}
