use std::sync::{Arc, Barrier};
use std::thread;

use docdriver::doc;
use docdriver::errors::ErrorKind;
use docdriver::transaction::TransactionState;
use docdriver_int_test::test_util::{ab, cleanup, collection, create_test_context, run_test};

// ==================== Visibility Tests ====================

#[test]
fn test_insert_committed() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            session1.start_transaction()?;
            coll1.insert(doc! { "a": "a", "b": "b" })?;

            // visible inside the transaction
            let res = coll1.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "b" });

            // invisible to the other session
            let err = coll2.find(doc! { "a": "a" }).one().unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NotFound);

            session1.commit_transaction()?;

            let res = coll2.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "b" });
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_insert_aborted() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            session1.start_transaction()?;
            coll1.insert(doc! { "a": "a", "b": "b" })?;

            let res = coll1.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "b" });
            assert!(coll2.find(doc! { "a": "a" }).one().is_err());

            session1.abort_transaction()?;

            // nobody sees it
            assert_eq!(coll2.find(doc! { "a": "a" }).one().unwrap_err().to_string(), "not found");
            assert_eq!(coll1.find(doc! { "a": "a" }).one().unwrap_err().to_string(), "not found");
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_update_committed() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            coll1.insert(doc! { "a": "a", "b": "b" })?;
            session1.start_transaction()?;
            coll1.update(doc! { "a": "a" }, doc! { "$set": { "b": "c" } })?;

            let res = coll1.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "c" });
            let res = coll2.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "b" });

            session1.commit_transaction()?;

            let res = coll2.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "c" });
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_update_all_committed() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            coll1.insert(doc! { "a": "a", "b": "b" })?;
            coll1.insert(doc! { "a": "2", "b": "b" })?;
            session1.start_transaction()?;

            let info = coll1.update_all(doc! {}, doc! { "$set": { "b": "c" } })?;
            assert_eq!(info.matched, 2);
            assert_eq!(info.updated, 2);

            for a in ["a", "2"] {
                let res = coll1.find(doc! { "a": a }).select(ab()).one()?;
                assert_eq!(res, doc! { "a": a, "b": "c" });
                let res = coll2.find(doc! { "a": a }).select(ab()).one()?;
                assert_eq!(res, doc! { "a": a, "b": "b" });
            }

            session1.commit_transaction()?;

            for a in ["a", "2"] {
                let res = coll2.find(doc! { "a": a }).select(ab()).one()?;
                assert_eq!(res, doc! { "a": a, "b": "c" });
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_upsert_committed() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            coll1.insert(doc! { "a": "a", "b": "b" })?;
            session1.start_transaction()?;

            // one upsert updates, the other inserts
            let info = coll1.upsert(doc! { "a": "a" }, doc! { "$set": { "b": "c" } })?;
            assert_eq!(info.matched, 1);
            assert_eq!(info.updated, 1);
            assert!(info.upserted_id.is_none());

            let info = coll1.upsert(doc! { "a": "2" }, doc! { "$set": { "b": "c" } })?;
            assert_eq!(info.matched, 0);
            assert!(info.upserted_id.is_some());

            let res = coll1.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "c" });
            let res = coll1.find(doc! { "a": "2" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "2", "b": "c" });

            let res = coll2.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "b" });
            assert!(coll2.find(doc! { "a": "2" }).one().is_err());

            session1.commit_transaction()?;

            let res = coll2.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "c" });
            let res = coll2.find(doc! { "a": "2" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "2", "b": "c" });
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_remove_committed() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            coll1.insert(doc! { "a": "a", "b": "b" })?;
            session1.start_transaction()?;
            coll1.remove(doc! { "a": "a" })?;

            assert!(coll1.find(doc! { "a": "a" }).one().is_err());
            let res = coll2.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "b" });

            session1.commit_transaction()?;

            assert!(coll1.find(doc! { "a": "a" }).one().is_err());
            assert!(coll2.find(doc! { "a": "a" }).one().is_err());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_remove_all_committed() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            coll1.insert(doc! { "a": "a", "b": "b" })?;
            coll1.insert(doc! { "a": "2", "b": "b" })?;
            session1.start_transaction()?;

            let info = coll1.remove_all(doc! { "a": { "$exists": true } })?;
            assert_eq!(info.matched, 2);
            assert_eq!(info.removed, 2);

            assert!(coll1.find(doc! { "a": "a" }).one().is_err());
            assert!(coll1.find(doc! { "a": "2" }).one().is_err());
            for a in ["a", "2"] {
                let res = coll2.find(doc! { "a": a }).select(ab()).one()?;
                assert_eq!(res, doc! { "a": a, "b": "b" });
            }

            session1.commit_transaction()?;

            for a in ["a", "2"] {
                assert!(coll1.find(doc! { "a": a }).one().is_err());
                assert!(coll2.find(doc! { "a": a }).one().is_err());
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_remove_aborted_keeps_documents() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            coll1.insert_many(vec![doc! { "a": "a" }, doc! { "a": "2" }])?;
            session1.start_transaction()?;
            coll1.remove_all(doc! {})?;
            assert_eq!(coll1.find(doc! {}).count()?, 0);
            session1.abort_transaction()?;

            assert_eq!(coll1.find(doc! {}).count()?, 2);
            assert_eq!(coll2.find(doc! {}).count()?, 2);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

// ==================== Concurrency Tests ====================

#[test]
fn test_start_abort_multithreaded() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            collection(&session)?.create()?;

            let barrier = Arc::new(Barrier::new(10));
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    let session = session.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        match session.start_transaction() {
                            Ok(()) => assert!(session.abort_transaction().is_ok()),
                            Err(err) => assert_eq!(err.to_string(), "transaction already started"),
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().expect("thread panicked");
            }

            assert_eq!(session.transaction_state(), TransactionState::Idle);
            session.close()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_start_commit_multithreaded() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            coll.create()?;

            let barrier = Arc::new(Barrier::new(10));
            let handles: Vec<_> = (0..10)
                .map(|i| {
                    let session = session.clone();
                    let coll = coll.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        match session.start_transaction() {
                            Ok(()) => {
                                coll.insert(doc! { "i": i }).expect("insert failed");
                                assert!(session.commit_transaction().is_ok());
                            }
                            Err(err) => assert_eq!(err.to_string(), "transaction already started"),
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().expect("thread panicked");
            }

            assert!(!session.in_transaction());
            session.close()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_concurrent_commit_has_one_winner() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let coll = collection(&session)?;
            session.start_transaction()?;
            coll.insert(doc! { "a": "a" })?;

            let barrier = Arc::new(Barrier::new(10));
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    let session = session.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        session.commit_transaction()
                    })
                })
                .collect();
            let results: Vec<_> = handles
                .into_iter()
                .map(|h| h.join().expect("thread panicked"))
                .collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            for err in results.into_iter().filter_map(|r| r.err()) {
                assert_eq!(err.to_string(), "no transaction in progress");
            }
            assert_eq!(ctx.server().committed("mydb", "mycoll").len(), 1);
            assert_eq!(ctx.recorder().count("commitTransaction"), 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

// ==================== Protocol State Tests ====================

#[test]
fn test_abort_not_started() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let err = session.abort_transaction().unwrap_err();
            assert_eq!(err.to_string(), "no transaction in progress");
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_commit_not_started() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            let err = session.commit_transaction().unwrap_err();
            assert_eq!(err.to_string(), "no transaction in progress");
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_abort_no_changes() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            session.abort_transaction()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_commit_no_changes() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            session.commit_transaction()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_abort_twice() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            session.abort_transaction()?;
            let err = session.abort_transaction().unwrap_err();
            assert_eq!(err.to_string(), "no transaction in progress");
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_commit_twice() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            session.commit_transaction()?;
            let err = session.commit_transaction().unwrap_err();
            assert_eq!(err.to_string(), "no transaction in progress");
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_start_twice() {
    run_test(
        || create_test_context(),
        |ctx| {
            let session = ctx.session();
            session.start_transaction()?;
            let err = session.start_transaction().unwrap_err();
            assert_eq!(err.to_string(), "transaction already started");
            assert!(err.is_protocol_state());
            assert!(session.in_transaction());
            session.abort_transaction()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_start_commit_abort_start_commit() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            session1.start_transaction()?;
            session1.commit_transaction()?;
            let err = session1.abort_transaction().unwrap_err();
            assert_eq!(err.to_string(), "no transaction in progress");

            // the session recovers
            session1.start_transaction()?;
            coll1.insert(doc! { "a": "a", "b": "b" })?;
            session1.commit_transaction()?;

            let res = coll1.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "b" });
            let res = coll2.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "b" });
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_abort_then_commit_leaves_only_second() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            session1.start_transaction()?;
            coll1.insert(doc! { "a": "first" })?;
            session1.abort_transaction()?;

            session1.start_transaction()?;
            coll1.insert(doc! { "a": "second" })?;
            session1.commit_transaction()?;

            assert!(coll2.find(doc! { "a": "first" }).one().is_err());
            assert!(coll2.find(doc! { "a": "second" }).one().is_ok());
            assert_eq!(coll2.find(doc! {}).count()?, 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_close_with_open_transaction() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, coll1, _session2, coll2) = ctx.two_sessions()?;
            session1.start_transaction()?;
            coll1.insert(doc! { "a": "a", "b": "b" })?;
            let res = coll1.find(doc! { "a": "a" }).select(ab()).one()?;
            assert_eq!(res, doc! { "a": "a", "b": "b" });

            session1.close()?;

            assert!(coll2.find(doc! { "a": "a" }).one().is_err());
            assert_eq!(ctx.server().open_transactions(), 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_with_transaction() {
    run_test(
        || create_test_context(),
        |ctx| {
            let (session1, _coll1, _session2, coll2) = ctx.two_sessions()?;

            let count = session1.with_transaction(|s| {
                let coll = collection(s)?;
                coll.insert(doc! { "a": "a" })?;
                coll.find(doc! {}).count()
            })?;
            assert_eq!(count, 1);
            assert_eq!(coll2.find(doc! {}).count()?, 1);

            let err = session1
                .with_transaction(|s| {
                    collection(s)?.insert(doc! { "a": "b" })?;
                    collection(s)?.remove(doc! { "a": "missing" })
                })
                .unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NotFound);
            assert!(!session1.in_transaction());
            assert_eq!(coll2.find(doc! {}).count()?, 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
