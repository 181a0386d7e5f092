use handoff::channel::Role;
use handoff::coordinator::TransactionOutcome;
use handoff::errors::ErrorKind;
use handoff::session::{SessionDriver, WaitState, EXIT_ABORTED, EXIT_COMMITTED};
use handoff_int_test::test_util::{
    cleanup, create_test_context, join_inner_runs, run_test, with_inner_participant,
};
use std::fs;
use std::time::{Duration, Instant};

#[test]
fn test_both_writes_commit_together() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (driver, runs) = with_inner_participant(ctx.config(), ctx.config());
            let outer = driver.run()?;
            let inner = join_inner_runs(&runs).pop().unwrap()?;

            assert_eq!(outer.role, Role::Outer);
            assert_eq!(inner.role, Role::Inner);
            assert_eq!(outer.rounds[0].wait_state, Some(WaitState::Observed));
            assert_eq!(
                outer.rounds[0].transaction_id,
                inner.rounds[0].transaction_id
            );
            assert_eq!(outer.exit_code(), EXIT_COMMITTED);
            assert_eq!(inner.exit_code(), EXIT_COMMITTED);

            let rows = ctx.rows()?;
            assert_eq!(rows.len(), 2);
            assert!(rows
                .iter()
                .all(|row| row.transaction_id == outer.rounds[0].transaction_id));
            assert!(!ctx.token_pending());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_inner_write_failure_rolls_back_outer_write() {
    run_test(
        || create_test_context(),
        |ctx| {
            let blocked = ctx.path().join("blocked");
            fs::write(&blocked, "not a directory")?;
            let inner_config = ctx.builder().data_store(&blocked).build()?;

            let (driver, runs) = with_inner_participant(ctx.config(), inner_config);
            let outer = driver.run()?;
            let inner = join_inner_runs(&runs).pop().unwrap()?;

            assert_eq!(outer.rounds[0].outcome, Some(TransactionOutcome::Aborted));
            assert_eq!(inner.rounds[0].outcome, Some(TransactionOutcome::Aborted));
            assert_eq!(
                inner.rounds[0].errors[0].kind(),
                &ErrorKind::ResourceOperationError
            );
            assert_eq!(outer.exit_code(), EXIT_ABORTED);
            assert!(ctx.rows()?.is_empty());
            assert!(!ctx.token_pending());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_outer_write_failure_aborts_without_inviting_inner() {
    run_test(
        || create_test_context(),
        |ctx| {
            let blocked = ctx.path().join("blocked");
            fs::write(&blocked, "not a directory")?;
            let outer_config = ctx.builder().data_store(&blocked).build()?;

            let (driver, runs) = with_inner_participant(outer_config, ctx.config());
            let started = Instant::now();
            let outer = driver.run()?;

            let round = &outer.rounds[0];
            assert_eq!(round.outcome, Some(TransactionOutcome::Aborted));
            assert_eq!(round.wait_state, None);
            assert_eq!(round.errors[0].kind(), &ErrorKind::ResourceOperationError);
            assert!(started.elapsed() < ctx.config().max_wait());
            assert_eq!(outer.exit_code(), EXIT_ABORTED);
            // no token was published, so no inner participant ever started
            assert!(join_inner_runs(&runs).is_empty());
            assert!(!ctx.token_pending());
            assert!(ctx.rows()?.is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_each_round_is_its_own_transaction() {
    run_test(
        || create_test_context(),
        |ctx| {
            let config = ctx.builder().rounds(2).build()?;
            let (driver, runs) = with_inner_participant(config.clone(), config);
            let outer = driver.run()?;
            let inners = join_inner_runs(&runs);

            assert_eq!(outer.rounds.len(), 2);
            assert_ne!(outer.rounds[0].transaction_id, outer.rounds[1].transaction_id);
            assert_eq!(inners.len(), 2);
            for inner in inners {
                assert_eq!(inner?.exit_code(), EXIT_COMMITTED);
            }
            assert_eq!(ctx.rows()?.len(), 4);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_outer_wait_is_bounded_without_inner() {
    run_test(
        || create_test_context(),
        |ctx| {
            let poll = Duration::from_millis(50);
            let bound = Duration::from_millis(250);
            let config = ctx.builder().poll_interval(poll).max_wait(bound).build()?;

            let started = Instant::now();
            let report = SessionDriver::new(config).run()?;
            let elapsed = started.elapsed();

            let round = &report.rounds[0];
            assert_eq!(round.wait_state, Some(WaitState::TimedOut));
            assert_eq!(round.errors[0].kind(), &ErrorKind::WaitTimeout);
            assert!(elapsed >= bound);
            // wait bound plus one poll, plus the time to begin and dispose
            assert!(elapsed < bound + poll + Duration::from_secs(2));
            assert!(!ctx.token_pending());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_outer_commits_alone_after_timeout() {
    run_test(
        || create_test_context(),
        |ctx| {
            let config = ctx.builder().max_wait(Duration::from_millis(100)).build()?;
            let report = SessionDriver::new(config).run()?;

            assert_eq!(report.rounds[0].outcome, Some(TransactionOutcome::Committed));
            assert_eq!(report.exit_code(), EXIT_COMMITTED);
            assert_eq!(ctx.rows()?.len(), 1);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_outer_aborts_when_transaction_expires_during_wait() {
    run_test(
        || create_test_context(),
        |ctx| {
            let config = ctx
                .builder()
                .transaction_timeout(Duration::from_millis(100))
                .max_wait(Duration::from_millis(300))
                .build()?;
            let report = SessionDriver::new(config).run()?;

            assert_eq!(report.rounds[0].outcome, Some(TransactionOutcome::Aborted));
            assert_eq!(report.exit_code(), EXIT_ABORTED);
            assert!(ctx.rows()?.is_empty());
            Ok(())
        },
        cleanup,
    )
}
