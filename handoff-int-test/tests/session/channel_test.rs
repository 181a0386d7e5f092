use handoff::channel::{detect_role, Assignment, PropagationToken, Role, TokenChannel};
use handoff::coordinator::{Coordinator, FileCoordinator};
use handoff::errors::ErrorKind;
use handoff::session::{SessionDriver, TransactionSession};
use handoff_int_test::test_util::{cleanup, create_test_context, run_test};
use std::fs;

#[test]
fn test_garbage_token_fails_before_any_transaction() {
    run_test(
        || create_test_context(),
        |ctx| {
            let config = ctx.config();
            fs::write(config.token_file(), [0xde, 0xad, 0xbe, 0xef])?;

            let err = SessionDriver::new(config.clone()).run().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TokenDecodeError);
            assert!(ctx.token_pending());
            assert!(!config.coordinator().exists());
            assert!(ctx.rows()?.is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_token_of_decided_transaction_cannot_be_resumed() {
    run_test(
        || create_test_context(),
        |ctx| {
            let config = ctx.config();
            let coordinator = Coordinator::new(FileCoordinator::new(config.coordinator()));
            let token = {
                let session =
                    TransactionSession::begin_outer(&coordinator, &config.transaction_options())?;
                let token = session.export_token()?;
                session.mark_complete()?;
                session.dispose()?;
                token
            };
            TokenChannel::new(config.token_file()).publish(&token)?;

            let err = SessionDriver::new(config).run().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::TransactionResumeError);
            // the token was read, so this invocation owned it
            assert!(!ctx.token_pending());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_channel_holds_a_single_token() {
    run_test(
        || create_test_context(),
        |ctx| {
            let channel = TokenChannel::new(ctx.config().token_file());
            let first = PropagationToken::from_bytes(b"first".to_vec());
            let second = PropagationToken::from_bytes(b"second".to_vec());

            channel.publish(&first)?;
            let err = channel.publish(&second).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::ChannelOccupied);
            assert_eq!(channel.peek()?, Some(first.clone()));

            assert!(channel.clear()?);
            assert!(!channel.clear()?);
            channel.publish(&second)?;
            assert_eq!(channel.peek()?, Some(second));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_role_follows_channel_state() {
    run_test(
        || create_test_context(),
        |ctx| {
            let channel = TokenChannel::new(ctx.config().token_file());
            assert_eq!(detect_role(&channel)?.role(), Role::Outer);
            assert_eq!(detect_role(&channel)?.role(), Role::Outer);

            let token = PropagationToken::from_bytes(vec![7; 16]);
            channel.publish(&token)?;
            assert_eq!(detect_role(&channel)?, Assignment::Inner(token.clone()));
            assert_eq!(detect_role(&channel)?, Assignment::Inner(token));
            Ok(())
        },
        cleanup,
    )
}
