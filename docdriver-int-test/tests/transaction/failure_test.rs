use docdriver::cluster::Cluster;
use docdriver::command::{Command, CommandExecutor};
use docdriver::doc;
use docdriver::errors::ErrorKind;
use docdriver::server::memory::MemoryServerConfig;
use docdriver::transaction::TransactionState;
use docdriver_int_test::test_util::{
    cleanup, collection, create_test_context, create_test_context_with, run_test, Fault,
};
use std::thread;
use std::time::Duration;

#[test]
fn test_write_conflict_fails_commit() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            coll1.insert(doc! { "_id": "1", "b": "b" })?;

            session1.start_transaction()?;
            coll1.update(doc! { "_id": "1" }, doc! { "$set": { "b": "x" } })?;
            coll2.update(doc! { "_id": "1" }, doc! { "$set": { "b": "y" } })?;

            let err = session1.commit_transaction().unwrap_err();
            assert_eq!(err.server_code(), Some(112));
            assert!(err.is_server_rejection());
            assert_eq!(session1.transaction_state(), TransactionState::Idle);

            let res = coll1.find(doc! { "_id": "1" }).one()?;
            assert_eq!(res, doc! { "_id": "1", "b": "y" });

            // the session recovers
            session1.start_transaction()?;
            coll1.update(doc! { "_id": "1" }, doc! { "$set": { "b": "z" } })?;
            session1.commit_transaction()?;
            assert_eq!(coll2.find(doc! { "_id": "1" }).one()?, doc! { "_id": "1", "b": "z" });
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_failed_statement_aborts_server_transaction() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            coll.insert(doc! { "_id": "1" })?;

            session.start_transaction()?;
            coll.insert(doc! { "_id": "2" })?;
            let err = coll.insert(doc! { "_id": "1" }).unwrap_err();
            assert_eq!(err.server_code(), Some(11000));
            // still active locally until resolved
            assert!(session.in_transaction());

            let err = session.commit_transaction().unwrap_err();
            assert_eq!(err.server_code(), Some(251));
            assert!(!session.in_transaction());
            assert_eq!(ctx.server().committed("mydb", "mycoll").len(), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_create_inside_transaction_is_rejected() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            let err = collection(&session)?.create().unwrap_err();
            assert_eq!(err.server_code(), Some(263));
            session.abort_transaction().unwrap_err();
            assert!(!session.in_transaction());
            assert!(ctx.server().namespaces().is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_commit_network_failure_leaves_idle() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            session.start_transaction()?;
            coll.insert(doc! { "a": "a" })?;

            ctx.recorder().fail_next("commitTransaction", Fault::Network);
            let err = session.commit_transaction().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::Network);
            assert_eq!(session.transaction_state(), TransactionState::Idle);
            assert!(ctx.server().committed("mydb", "mycoll").is_empty());

            // the orphaned server transaction goes away with the session
            session.close()?;
            assert_eq!(ctx.server().open_transactions(), 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_abort_network_failure_is_swallowed() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            session.start_transaction()?;
            coll.insert(doc! { "a": "a" })?;

            ctx.recorder().fail_next("abortTransaction", Fault::Network);
            session.abort_transaction()?;
            assert!(!session.in_transaction());
            assert_eq!(ctx.server().open_transactions(), 1);

            session.start_transaction()?;
            coll.insert(doc! { "a": "b" })?;
            session.commit_transaction()?;
            assert_eq!(coll.find(doc! {}).all()?.len(), 1);
            assert_eq!(ctx.server().open_transactions(), 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_abort_server_rejection_is_returned() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            collection(&session)?.insert(doc! { "a": "a" })?;

            ctx.recorder().fail_next("abortTransaction", Fault::Server(251));
            let err = session.abort_transaction().unwrap_err();
            assert_eq!(err.server_code(), Some(251));
            assert!(!session.in_transaction());
            assert_eq!(
                session.abort_transaction().unwrap_err().to_string(),
                "no transaction in progress"
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_close_survives_failing_teardown() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            collection(&session)?.insert(doc! { "a": "a" })?;

            ctx.recorder().fail_next("abortTransaction", Fault::Network);
            ctx.recorder().fail_next("endSessions", Fault::Network);
            session.close()?;
            assert!(session.is_closed());
            assert_eq!(
                ctx.recorder().command_names(),
                vec!["insert", "abortTransaction", "endSessions"]
            );
            // nothing reached the server, the transaction is still there
            assert_eq!(ctx.server().open_transactions(), 1);
            let end = Command::EndSessions { session_ids: vec![session.id().clone()] };
            ctx.server().execute(&end, None)?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_expired_transaction() {
    run_test(
        || {
            create_test_context_with(
                Cluster::builder(),
                MemoryServerConfig::new().with_transaction_lifetime(Duration::from_millis(20)),
            )
        },
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            session.start_transaction()?;
            coll.insert(doc! { "a": "a" })?;
            thread::sleep(Duration::from_millis(50));

            let err = coll.insert(doc! { "a": "b" }).unwrap_err();
            assert_eq!(err.server_code(), Some(290));
            let err = session.commit_transaction().unwrap_err();
            assert_eq!(err.server_code(), Some(251));
            assert!(!session.in_transaction());
            assert!(ctx.server().committed("mydb", "mycoll").is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
