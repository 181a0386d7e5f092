use super::transaction_session::TransactionSession;
use crate::channel::{PropagationToken, TokenChannel};
use crate::common::bounded_sleep;
use crate::errors::{ErrorKind, HandoffError, HandoffResult};
use std::time::{Duration, Instant};

/// Progress of the outer participant's wait for its token to be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitState {
    Publishing,
    Waiting,
    /// The bound passed with the token still pending
    TimedOut,
    /// The inner participant cleared the channel
    Observed,
}

impl WaitState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WaitState::TimedOut | WaitState::Observed)
    }
}

/// Publishes the outer participant's token, then polls the channel until the inner
/// participant clears it or the wait bound passes.
///
/// Consumption is inferred from the channel being empty; nothing stronger is available.
/// The wait never exceeds the bound by more than the time of one channel check.
pub struct CompletionWaiter {
    channel: TokenChannel,
    poll_interval: Duration,
    max_wait: Duration,
    state: WaitState,
}

impl CompletionWaiter {
    pub fn new(channel: TokenChannel, poll_interval: Duration, max_wait: Duration) -> Self {
        CompletionWaiter {
            channel,
            poll_interval,
            max_wait,
            state: WaitState::Publishing,
        }
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    /// Exports the session's transaction and writes the token into the channel.
    ///
    /// # Errors
    /// `ChannelOccupied` if a token is already pending, or any export failure. The waiter
    /// stays in `Publishing`.
    pub fn publish(&mut self, session: &TransactionSession) -> HandoffResult<PropagationToken> {
        self.expect_state(WaitState::Publishing)?;
        let token = session.export_token()?;
        self.channel.publish(&token)?;
        self.state = WaitState::Waiting;
        Ok(token)
    }

    /// Blocks until the channel is empty or the bound passes; returns the terminal state.
    pub fn wait(&mut self) -> HandoffResult<WaitState> {
        self.expect_state(WaitState::Waiting)?;
        let started = Instant::now();
        loop {
            if !self.channel.is_occupied()? {
                log::info!(
                    "Token consumed after {:?}, inner participant joined",
                    started.elapsed()
                );
                self.state = WaitState::Observed;
                return Ok(self.state);
            }

            let elapsed = started.elapsed();
            if elapsed >= self.max_wait {
                log::warn!("{}", self.timeout_error());
                self.state = WaitState::TimedOut;
                return Ok(self.state);
            }

            log::info!(
                "Waiting for the inner participant to consume {} ({:?} elapsed)",
                self.channel.path().display(),
                elapsed
            );
            bounded_sleep(self.poll_interval, self.max_wait - elapsed);
        }
    }

    /// The soft error describing a wait that ran out.
    pub fn timeout_error(&self) -> HandoffError {
        HandoffError::new(
            &format!(
                "Token in {} was not consumed within {:?}, completing without confirmation",
                self.channel.path().display(),
                self.max_wait
            ),
            ErrorKind::WaitTimeout,
        )
    }

    fn expect_state(&self, expected: WaitState) -> HandoffResult<()> {
        if self.state != expected {
            return Err(HandoffError::new(
                &format!("Waiter is {:?}, expected {:?}", self.state, expected),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{
        Coordinator, FileCoordinator, IsolationLevel, TransactionOptions,
    };
    use std::thread;
    use test_retry::retry;

    struct Fixture {
        _dir: tempfile::TempDir,
        channel: TokenChannel,
        coordinator: Coordinator,
    }

    fn create_fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            channel: TokenChannel::new(dir.path().join("token.txt")),
            coordinator: Coordinator::new(FileCoordinator::new(dir.path().join("coordinator"))),
            _dir: dir,
        }
    }

    fn begin(fixture: &Fixture) -> TransactionSession {
        TransactionSession::begin_outer(
            &fixture.coordinator,
            &TransactionOptions::new(IsolationLevel::ReadUncommitted, Duration::from_secs(30)),
        )
        .unwrap()
    }

    #[test]
    fn test_publish_writes_token() {
        let fixture = create_fixture();
        let session = begin(&fixture);
        let mut waiter = CompletionWaiter::new(
            fixture.channel.clone(),
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        assert_eq!(waiter.state(), WaitState::Publishing);

        let token = waiter.publish(&session).unwrap();
        assert_eq!(waiter.state(), WaitState::Waiting);
        assert_eq!(fixture.channel.peek().unwrap(), Some(token));
    }

    #[test]
    fn test_publish_into_occupied_channel_fails() {
        let fixture = create_fixture();
        let session = begin(&fixture);
        fixture
            .channel
            .publish(&PropagationToken::from_bytes(vec![1, 2, 3]))
            .unwrap();
        let mut waiter = CompletionWaiter::new(
            fixture.channel.clone(),
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        let err = waiter.publish(&session).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ChannelOccupied);
        assert_eq!(waiter.state(), WaitState::Publishing);
    }

    #[test]
    fn test_wait_before_publish_fails() {
        let fixture = create_fixture();
        let mut waiter = CompletionWaiter::new(
            fixture.channel.clone(),
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        let err = waiter.wait().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_wait_observes_consumption() {
        let fixture = create_fixture();
        let session = begin(&fixture);
        let mut waiter = CompletionWaiter::new(
            fixture.channel.clone(),
            Duration::from_millis(10),
            Duration::from_secs(10),
        );
        waiter.publish(&session).unwrap();

        let channel = fixture.channel.clone();
        let consumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            channel.clear().unwrap();
        });

        let started = Instant::now();
        assert_eq!(waiter.wait().unwrap(), WaitState::Observed);
        assert!(started.elapsed() < Duration::from_secs(10));
        consumer.join().unwrap();
    }

    #[test]
    #[retry]
    fn test_wait_is_bounded() {
        let fixture = create_fixture();
        let session = begin(&fixture);
        let poll = Duration::from_millis(40);
        let bound = Duration::from_millis(150);
        let mut waiter = CompletionWaiter::new(fixture.channel.clone(), poll, bound);
        waiter.publish(&session).unwrap();

        let started = Instant::now();
        assert_eq!(waiter.wait().unwrap(), WaitState::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= bound);
        assert!(elapsed <= bound + poll);
        assert!(waiter.state().is_terminal());
        // a timed out wait leaves the token in place
        assert!(fixture.channel.is_occupied().unwrap());
    }

    #[test]
    fn test_zero_bound_checks_once() {
        let fixture = create_fixture();
        let session = begin(&fixture);
        let mut waiter =
            CompletionWaiter::new(fixture.channel.clone(), Duration::from_secs(5), Duration::ZERO);
        waiter.publish(&session).unwrap();
        let started = Instant::now();
        assert_eq!(waiter.wait().unwrap(), WaitState::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_timeout_error_kind() {
        let fixture = create_fixture();
        let waiter = CompletionWaiter::new(
            fixture.channel.clone(),
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        assert_eq!(waiter.timeout_error().kind(), &ErrorKind::WaitTimeout);
    }
}
