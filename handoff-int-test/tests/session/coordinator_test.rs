use handoff::coordinator::{
    Coordinator, FileCoordinator, IsolationLevel, TransactionOptions, TransactionOutcome,
};
use handoff::errors::ErrorKind;
use handoff::session::TransactionSession;
use handoff::store::{DataStore, FileDataStore, ResourceOperation};
use handoff_int_test::test_util::{cleanup, create_test_context, run_test, TestContext};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn create_coordinator(ctx: &TestContext) -> Coordinator {
    Coordinator::new(
        FileCoordinator::new(ctx.config().coordinator())
            .with_resolution_poll(Duration::from_millis(10)),
    )
}

fn create_operation(ctx: &TestContext) -> ResourceOperation {
    let config = ctx.config();
    ResourceOperation::new(
        DataStore::new(FileDataStore::new(config.data_store())),
        config.table(),
    )
}

/// Runs an outer and an inner write through one token; the root marks complete only when
/// `outer_completes`, the participant only when `inner_completes`.
fn handoff(
    ctx: &TestContext,
    outer_completes: bool,
    inner_completes: bool,
) -> (Option<TransactionOutcome>, TransactionOutcome) {
    let coordinator = create_coordinator(ctx);
    let options = TransactionOptions::new(IsolationLevel::Serializable, Duration::from_secs(20));
    let outer = TransactionSession::begin_outer(&coordinator, &options).unwrap();
    create_operation(ctx).perform_write(&outer).unwrap();
    let token = outer.export_token().unwrap();

    let (enlisted_tx, enlisted) = mpsc::channel();
    let inner_ctx = ctx.clone();
    let inner = thread::spawn(move || {
        let coordinator = create_coordinator(&inner_ctx);
        let session =
            TransactionSession::resume_inner(&coordinator, &token, Duration::from_secs(20))
                .unwrap();
        enlisted_tx.send(()).unwrap();
        assert_eq!(session.isolation_level(), IsolationLevel::Serializable);
        create_operation(&inner_ctx).perform_write(&session).unwrap();
        let signal = session.on_completed().unwrap();
        if inner_completes {
            session.mark_complete().unwrap();
        }
        session.dispose().unwrap();
        let outcome = signal.wait(Duration::from_secs(20)).unwrap();
        session.settle(outcome).unwrap()
    });

    // the root must not decide before the participant has joined
    enlisted.recv().unwrap();
    if outer_completes {
        outer.mark_complete().unwrap();
    }
    let decided = outer.dispose().unwrap();
    (decided, inner.join().unwrap())
}

#[test]
fn test_participant_commits_in_lockstep_with_root() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (root, participant) = handoff(&ctx, true, true);
            assert_eq!(root, Some(TransactionOutcome::Committed));
            assert_eq!(participant, TransactionOutcome::Committed);
            assert_eq!(ctx.rows()?.len(), 2);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_participant_aborts_in_lockstep_with_root() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (root, participant) = handoff(&ctx, false, true);
            assert_eq!(root, Some(TransactionOutcome::Aborted));
            assert_eq!(participant, TransactionOutcome::Aborted);
            assert!(ctx.rows()?.is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_incomplete_participant_aborts_root() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (root, participant) = handoff(&ctx, true, false);
            assert_eq!(root, Some(TransactionOutcome::Aborted));
            assert_eq!(participant, TransactionOutcome::Aborted);
            assert!(ctx.rows()?.is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_import_after_root_disposed_fails() {
    run_test(
        || create_test_context(),
        |ctx| {
            let coordinator = create_coordinator(&ctx);
            let outer =
                TransactionSession::begin_outer(&coordinator, &ctx.config().transaction_options())?;
            let token = outer.export_token()?;
            outer.mark_complete()?;
            outer.dispose()?;

            let err = TransactionSession::resume_inner(&coordinator, &token, Duration::from_secs(5))
                .err()
                .unwrap();
            assert_eq!(err.kind(), &ErrorKind::TransactionResumeError);
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_token_from_unknown_coordinator_fails() {
    run_test(
        || create_test_context(),
        |ctx| {
            let outer_coordinator = create_coordinator(&ctx);
            let outer = TransactionSession::begin_outer(
                &outer_coordinator,
                &ctx.config().transaction_options(),
            )?;
            let token = outer.export_token()?;
            outer.dispose()?;
            std::fs::remove_dir_all(ctx.config().coordinator())?;

            let err = TransactionSession::resume_inner(
                &outer_coordinator,
                &token,
                Duration::from_secs(5),
            )
            .err()
            .unwrap();
            assert_eq!(err.kind(), &ErrorKind::TransactionResumeError);
            Ok(())
        },
        cleanup,
    )
}
