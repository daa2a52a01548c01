use crate::collection::Document;
use crate::command::Namespace;
use im::OrdMap;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Uncommitted writes of one server-side transaction.
///
/// Writes are kept as an overlay over the committed data: `Some` is a put,
/// `None` a tombstone. Reads inside the transaction see the overlay applied on
/// top of the committed documents; nothing touches the committed data until
/// the transaction commits.
#[derive(Debug)]
pub(crate) struct Workspace {
    txn_number: i64,
    started: Instant,
    snapshot: u64,
    writes: BTreeMap<Namespace, BTreeMap<String, Option<Document>>>,
}

impl Workspace {
    pub(crate) fn new(txn_number: i64, snapshot: u64) -> Self {
        Workspace {
            txn_number,
            started: Instant::now(),
            snapshot,
            writes: BTreeMap::new(),
        }
    }

    pub(crate) fn txn_number(&self) -> i64 {
        self.txn_number
    }

    /// Commit clock value when the transaction began. Committed writes newer
    /// than this conflict with the transaction.
    pub(crate) fn snapshot(&self) -> u64 {
        self.snapshot
    }

    pub(crate) fn is_expired(&self, lifetime: Duration) -> bool {
        self.started.elapsed() > lifetime
    }

    /// Committed documents of `ns` with this transaction's writes applied.
    pub(crate) fn view(&self, ns: &Namespace, committed: OrdMap<String, Document>) -> OrdMap<String, Document> {
        let mut view = committed;
        if let Some(writes) = self.writes.get(ns) {
            for (key, document) in writes {
                match document {
                    Some(document) => {
                        view.insert(key.clone(), document.clone());
                    }
                    None => {
                        view.remove(key);
                    }
                }
            }
        }
        view
    }

    pub(crate) fn record(&mut self, ns: &Namespace, key: String, document: Option<Document>) {
        self.writes.entry(ns.clone()).or_default().insert(key, document);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.writes.values().all(|w| w.is_empty())
    }

    /// The recorded writes, namespaces in order.
    pub(crate) fn into_writes(self) -> BTreeMap<Namespace, BTreeMap<String, Option<Document>>> {
        self.writes
    }
}
