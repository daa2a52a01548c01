use docdriver::cluster::Cluster;
use docdriver::command::{Command, WriteConcern};
use docdriver::common::Value;
use docdriver::doc;
use docdriver::server::memory::MemoryServerConfig;
use docdriver_int_test::test_util::{cleanup, collection, create_test_context, create_test_context_with, run_test};
use std::time::Duration;

#[test]
fn test_idle_session_sends_untagged() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            coll.create()?;
            coll.insert(doc! { "a": "a" })?;
            coll.find(doc! {}).all()?;

            assert!(ctx.recorder().envelopes().iter().all(|e| !e.is_tagged()));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_first_statement_flag_appears_once() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            session.start_transaction()?;
            coll.insert(doc! { "_id": "1", "a": "a" })?;
            coll.find(doc! { "a": "a" }).one()?;
            coll.update(doc! { "_id": "1" }, doc! { "$set": { "a": "b" } })?;
            coll.remove(doc! { "_id": "1" })?;
            session.commit_transaction()?;

            let envelopes = ctx.recorder().envelopes();
            assert_eq!(
                ctx.recorder().command_names(),
                vec!["insert", "find", "update", "delete", "commitTransaction"]
            );
            let tags: Vec<_> = envelopes.iter().map(|e| e.tag().cloned().expect("untagged")).collect();
            assert!(tags[0].start_transaction);
            assert!(tags[1..].iter().all(|t| !t.start_transaction));
            assert!(tags.iter().all(|t| t.txn_number == tags[0].txn_number));
            assert!(tags.iter().all(|t| &t.session_id == session.id()));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_transaction_numbers_increase() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            for _ in 0..3 {
                session.start_transaction()?;
                coll.insert(doc! { "a": "a" })?;
                session.abort_transaction()?;
            }
            session.start_transaction()?;
            coll.insert(doc! { "a": "a" })?;
            session.commit_transaction()?;

            let numbers: Vec<i64> = ctx
                .recorder()
                .envelopes()
                .iter()
                .filter(|e| matches!(e.command(), Command::Insert { .. }))
                .filter_map(|e| e.tag().map(|t| t.txn_number))
                .collect();
            assert_eq!(numbers, vec![1, 2, 3, 4]);
            assert_eq!(ctx.server().committed("mydb", "mycoll").len(), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_statements_after_resolution_are_untagged() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            session.start_transaction()?;
            coll.insert(doc! { "a": "a" })?;
            session.commit_transaction()?;
            ctx.recorder().clear();

            coll.insert(doc! { "a": "b" })?;
            let envelopes = ctx.recorder().envelopes();
            assert_eq!(envelopes.len(), 1);
            assert!(!envelopes[0].is_tagged());
            assert_eq!(ctx.server().committed("mydb", "mycoll").len(), 2);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_empty_transaction_is_elided() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            session.commit_transaction()?;
            session.start_transaction()?;
            session.abort_transaction()?;
            assert!(ctx.recorder().envelopes().is_empty());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_empty_transaction_sent_when_elision_disabled() {
    run_test(
        || create_test_context_with(Cluster::builder().elide_empty_transactions(false), MemoryServerConfig::new()),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            session.commit_transaction()?;
            session.start_transaction()?;
            session.abort_transaction()?;

            let envelopes = ctx.recorder().envelopes();
            assert_eq!(ctx.recorder().command_names(), vec!["commitTransaction", "abortTransaction"]);
            let commit = envelopes[0].tag().cloned().expect("untagged commit");
            let abort = envelopes[1].tag().cloned().expect("untagged abort");
            assert!(commit.start_transaction);
            assert!(abort.start_transaction);
            assert!(abort.txn_number > commit.txn_number);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_commit_carries_configured_options() {
    run_test(
        || {
            create_test_context_with(
                Cluster::builder()
                    .write_concern(WriteConcern::majority())
                    .commit_max_time(Duration::from_secs(5)),
                MemoryServerConfig::new(),
            )
        },
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            session.start_transaction()?;
            coll.insert(doc! { "a": "a" })?;
            session.commit_transaction()?;

            let envelopes = ctx.recorder().envelopes();
            // the statement's own write concern is dropped inside a transaction
            match envelopes[0].command() {
                Command::Insert { write_concern, .. } => assert!(write_concern.is_none()),
                other => panic!("unexpected {:?}", other),
            }
            match envelopes[1].command() {
                Command::CommitTransaction { write_concern, max_time } => {
                    assert_eq!(write_concern.as_ref(), Some(&WriteConcern::majority()));
                    assert_eq!(*max_time, Some(Duration::from_secs(5)));
                }
                other => panic!("unexpected {:?}", other),
            }

            let wire = envelopes[1].to_document()?;
            assert_eq!(wire.get("txnNumber"), Some(&Value::I64(1)));
            assert_eq!(wire.get("autocommit"), Some(&Value::Bool(false)));
            assert!(wire.get("startTransaction").is_none());
            assert!(wire.get("lsid").is_some());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_first_statement_wire_shape() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            collection(&session)?.insert(doc! { "a": "a" })?;
            session.abort_transaction()?;

            let wire = ctx.recorder().envelopes()[0].to_document()?;
            assert_eq!(wire.get("insert"), Some(&Value::from("mycoll")));
            assert_eq!(wire.get("startTransaction"), Some(&Value::Bool(true)));
            assert_eq!(wire.get_path("lsid.id"), Some(&Value::from(session.id().as_str())));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
