use docdriver::cluster::Cluster;
use docdriver::doc;
use docdriver::errors::ErrorKind;
use docdriver::server::memory::MemoryServerConfig;
use docdriver::transaction::TransactionState;
use docdriver_int_test::test_util::{cleanup, collection, create_test_context, create_test_context_with, run_test};

#[test]
fn test_copy_starts_idle() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            collection(&session)?.insert(doc! { "a": "a" })?;

            let copy = session.copy()?;
            assert_ne!(copy.id(), session.id());
            assert!(copy.cluster().same_as(session.cluster()));
            assert_eq!(copy.transaction_state(), TransactionState::Idle);
            assert!(session.in_transaction());

            // the copy neither sees nor resolves the original's transaction
            assert!(collection(&copy)?.find(doc! { "a": "a" }).one().is_err());
            assert_eq!(copy.commit_transaction().unwrap_err().to_string(), "no transaction in progress");
            assert!(session.in_transaction());

            copy.start_transaction()?;
            copy.abort_transaction()?;
            session.commit_transaction()?;
            assert!(collection(&copy)?.find(doc! { "a": "a" }).one().is_ok());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_clone_shares_the_session() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let handle = session.clone();
            assert_eq!(handle.id(), session.id());

            session.start_transaction()?;
            assert!(handle.in_transaction());
            handle.abort_transaction()?;
            assert!(!session.in_transaction());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_closed_session_rejects_operations() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            session.close()?;
            assert!(session.is_closed());

            let err = session.start_transaction().unwrap_err();
            assert_eq!(err.to_string(), "session is closed");
            assert_eq!(session.commit_transaction().unwrap_err().kind(), &ErrorKind::SessionClosed);
            assert_eq!(session.abort_transaction().unwrap_err().kind(), &ErrorKind::SessionClosed);
            assert_eq!(coll.insert(doc! { "a": 1 }).unwrap_err().kind(), &ErrorKind::SessionClosed);
            assert!(session.copy().is_err());

            // idempotent
            session.close()?;
            assert_eq!(ctx.recorder().count("endSessions"), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_close_aborts_then_ends_session() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            collection(&session)?.insert(doc! { "a": "a" })?;
            session.close()?;

            assert_eq!(
                ctx.recorder().command_names(),
                vec!["insert", "abortTransaction", "endSessions"]
            );
            let envelopes = ctx.recorder().envelopes();
            assert!(envelopes[1].is_tagged());
            assert!(!envelopes[2].is_tagged());
            assert_eq!(ctx.server().known_sessions(), 0);
            assert!(ctx.server().committed("mydb", "mycoll").is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_close_idle_session_only_ends_it() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            session.commit_transaction()?;
            session.close()?;
            assert_eq!(ctx.recorder().command_names(), vec!["endSessions"]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_dropping_last_handle_closes() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let handle = session.clone();
            session.start_transaction()?;
            collection(&session)?.insert(doc! { "a": "a" })?;

            drop(session);
            assert_eq!(ctx.server().open_transactions(), 1);

            drop(handle);
            assert_eq!(ctx.server().open_transactions(), 0);
            assert_eq!(ctx.recorder().count("abortTransaction"), 1);
            assert_eq!(ctx.recorder().count("endSessions"), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_default_database() {
    run_test(
        || create_test_context_with(Cluster::builder().default_database("inventory"), MemoryServerConfig::new()),
        |ctx| {
            let session = ctx.session();
            assert_eq!(session.db().name(), "inventory");
            session.db().collection("items").insert(doc! { "a": 1 })?;
            assert_eq!(ctx.server().document_count("inventory", "items"), 1);

            let err = session.database("").unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::ValidationError);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_sessions_are_independent() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, session2, coll2) = ctx.two_sessions()?;
            session1.start_transaction()?;
            session2.start_transaction()?;
            coll1.insert(doc! { "_id": "1", "by": "one" })?;
            coll2.insert(doc! { "_id": "2", "by": "two" })?;

            assert_eq!(coll1.find(doc! {}).count()?, 1);
            assert_eq!(coll2.find(doc! {}).count()?, 1);
            assert_eq!(ctx.server().open_transactions(), 2);

            session2.abort_transaction()?;
            session1.commit_transaction()?;
            assert_eq!(coll2.find(doc! {}).all()?, vec![doc! { "_id": "1", "by": "one" }]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
