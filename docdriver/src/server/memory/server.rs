use super::config::MemoryServerConfig;
use super::plan::{self, Change};
use super::store::NamespaceData;
use super::workspace::Workspace;
use crate::collection::Document;
use crate::command::{Command, CommandExecutor, Namespace, Reply, SessionId, TransactionTag};
use crate::common::{
    CODE_NAMESPACE_EXISTS, CODE_NAMESPACE_NOT_FOUND, CODE_NO_SUCH_TRANSACTION,
    CODE_OPERATION_NOT_SUPPORTED_IN_TRANSACTION, CODE_TRANSACTION_COMMITTED,
    CODE_TRANSACTION_EXPIRED, CODE_WRITE_CONFLICT,
};
use crate::errors::{DriverError, DriverResult, ErrorKind};
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use im::OrdMap;
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type NamespaceRef = Arc<RwLock<NamespaceData>>;

/// In-memory command-execution layer.
///
/// Holds committed data per namespace and one transaction workspace per
/// session. A tagged statement reads the committed data with its own
/// workspace applied and writes only to the workspace; commit applies the
/// whole workspace under the write locks of every namespace it touched, so
/// other sessions observe all of it or none of it.
///
/// # Server-side rules
/// - a transaction begins with a statement carrying `startTransaction`; any
///   later statement, commit or abort for an unknown transaction fails with
///   NoSuchTransaction (251)
/// - `create`/`drop` inside a transaction fail with 263
/// - a write to a document committed by someone else after the transaction
///   began fails with WriteConflict (112)
/// - any failed statement aborts its transaction
/// - a transaction older than the configured lifetime is aborted on its next
///   use, which fails with 290
///
/// Reads inside a transaction see the latest committed data plus the
/// transaction's own writes.
#[derive(Clone)]
pub struct MemoryServer {
    inner: Arc<MemoryServerInner>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::with_config(MemoryServerConfig::new())
    }

    pub fn with_config(config: MemoryServerConfig) -> Self {
        MemoryServer {
            inner: Arc::new(MemoryServerInner {
                config,
                catalog: SkipMap::new(),
                sessions: DashMap::new(),
                clock: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &MemoryServerConfig {
        &self.inner.config
    }

    /// Number of server-side transactions currently open.
    pub fn open_transactions(&self) -> usize {
        self.inner
            .sessions
            .iter()
            .filter(|s| s.value().workspace.is_some())
            .count()
    }

    /// Number of sessions the server currently tracks.
    pub fn known_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Committed documents of a namespace, bypassing every session.
    pub fn committed(&self, database: &str, collection: &str) -> Vec<Document> {
        let ns = Namespace::new(database, collection);
        let snapshot = self.inner.committed_snapshot(&ns);
        snapshot.values().cloned().collect()
    }

    pub fn document_count(&self, database: &str, collection: &str) -> usize {
        let ns = Namespace::new(database, collection);
        self.inner.namespace(&ns).map(|data| data.read().len()).unwrap_or(0)
    }

    pub fn namespaces(&self) -> Vec<Namespace> {
        self.inner.catalog.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for MemoryServer {
    fn execute(&self, command: &Command, tag: Option<&TransactionTag>) -> DriverResult<Reply> {
        match (command, tag) {
            (Command::EndSessions { session_ids }, _) => {
                self.inner.end_sessions(session_ids);
                Ok(Reply::ok())
            }
            (Command::CommitTransaction { .. }, Some(tag)) => self.inner.commit(tag),
            (Command::AbortTransaction { .. }, Some(tag)) => self.inner.abort(tag),
            (Command::CommitTransaction { .. } | Command::AbortTransaction { .. }, None) => {
                log::error!("{} requires a transaction", command.name());
                Err(DriverError::new(
                    &format!("{} requires a transaction", command.name()),
                    ErrorKind::InvalidOperation,
                ))
            }
            (_, Some(tag)) => self.inner.run_in_transaction(command, tag),
            (_, None) => self.inner.run(command),
        }
    }
}

#[derive(Default)]
struct ServerSession {
    last_txn_number: i64,
    committed_txn: Option<i64>,
    workspace: Option<Workspace>,
}

struct MemoryServerInner {
    config: MemoryServerConfig,
    catalog: SkipMap<Namespace, NamespaceRef>,
    sessions: DashMap<SessionId, ServerSession>,
    clock: AtomicU64,
}

impl MemoryServerInner {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn namespace(&self, ns: &Namespace) -> Option<NamespaceRef> {
        self.catalog.get(ns).map(|e| e.value().clone())
    }

    fn namespace_or_create(&self, ns: &Namespace) -> NamespaceRef {
        self.catalog
            .get_or_insert(ns.clone(), Arc::new(RwLock::new(NamespaceData::new())))
            .value()
            .clone()
    }

    fn committed_snapshot(&self, ns: &Namespace) -> OrdMap<String, Document> {
        self.namespace(ns)
            .map(|data| data.read().snapshot())
            .unwrap_or_default()
    }

    fn end_sessions(&self, session_ids: &[SessionId]) {
        for id in session_ids {
            if let Some((_, session)) = self.sessions.remove(id) {
                if let Some(workspace) = session.workspace {
                    log::debug!("Session {} ended, transaction {} discarded", id, workspace.txn_number());
                }
            }
        }
    }

    // Auto-commit path for untagged commands.
    fn run(&self, command: &Command) -> DriverResult<Reply> {
        match command {
            Command::Create { ns } => {
                let created = Arc::new(RwLock::new(NamespaceData::new()));
                let entry = self.catalog.get_or_insert(ns.clone(), created.clone());
                if !Arc::ptr_eq(entry.value(), &created) {
                    return Err(server_error(CODE_NAMESPACE_EXISTS, &format!("Collection {} already exists", ns)));
                }
                Ok(Reply::ok())
            }
            Command::Drop { ns } => match self.catalog.remove(ns) {
                Some(_) => Ok(Reply::ok()),
                None => Err(server_error(CODE_NAMESPACE_NOT_FOUND, &format!("ns not found: {}", ns))),
            },
            Command::Find { ns, .. } => {
                let mut view = self.committed_snapshot(ns);
                plan::execute(command, &mut view).map(|(reply, _)| reply)
            }
            _ => {
                let ns = namespace_of(command)?;
                let data = self.namespace_or_create(ns);
                let mut data = data.write();
                let mut view = data.snapshot();
                let (reply, changes) = plan::execute(command, &mut view)?;
                if !changes.is_empty() {
                    let version = self.tick();
                    for (key, document) in changes {
                        data.apply(key, document, version);
                    }
                }
                Ok(reply)
            }
        }
    }

    fn run_in_transaction(&self, command: &Command, tag: &TransactionTag) -> DriverResult<Reply> {
        let mut session = self.sessions.entry(tag.session_id.clone()).or_default();
        let session = session.value_mut();

        if tag.start_transaction {
            if tag.txn_number <= session.last_txn_number {
                return Err(server_error(
                    CODE_NO_SUCH_TRANSACTION,
                    &format!("Transaction {} is too old to start", tag.txn_number),
                ));
            }
            if let Some(previous) = session.workspace.take() {
                log::debug!("Transaction {} superseded by {}", previous.txn_number(), tag.txn_number);
            }
            session.last_txn_number = tag.txn_number;
            session.workspace = Some(Workspace::new(tag.txn_number, self.clock.load(Ordering::SeqCst)));
        }

        let result = self.run_statement(command, tag, session);
        if result.is_err() {
            // a failed statement aborts its transaction
            if let Some(workspace) = session.workspace.take() {
                log::debug!("Transaction {} aborted by failed {}", workspace.txn_number(), command.name());
            }
        }
        result
    }

    fn run_statement(&self, command: &Command, tag: &TransactionTag, session: &mut ServerSession) -> DriverResult<Reply> {
        let workspace = self.live_workspace(tag, session)?;

        if matches!(command, Command::Create { .. } | Command::Drop { .. }) {
            return Err(server_error(
                CODE_OPERATION_NOT_SUPPORTED_IN_TRANSACTION,
                &format!("Cannot run '{}' in a multi-document transaction", command.name()),
            ));
        }

        let ns = namespace_of(command)?;
        let data = self.namespace(ns);
        let committed = match &data {
            Some(data) => data.read().snapshot(),
            None => OrdMap::new(),
        };
        let mut view = workspace.view(ns, committed);
        let (reply, changes) = plan::execute(command, &mut view)?;

        if let Some(data) = data {
            let data = data.read();
            check_conflicts(ns, &changes, &data, workspace.snapshot())?;
        }
        for (key, document) in changes {
            workspace.record(ns, key, document);
        }
        Ok(reply)
    }

    // The open workspace for `tag`, or the reason there is none.
    fn live_workspace<'a>(&self, tag: &TransactionTag, session: &'a mut ServerSession) -> DriverResult<&'a mut Workspace> {
        if session.committed_txn == Some(tag.txn_number) {
            return Err(server_error(
                CODE_TRANSACTION_COMMITTED,
                &format!("Transaction {} has been committed", tag.txn_number),
            ));
        }
        let expired = match &session.workspace {
            Some(workspace) if workspace.txn_number() == tag.txn_number => {
                workspace.is_expired(self.config.transaction_lifetime())
            }
            _ => {
                return Err(server_error(
                    CODE_NO_SUCH_TRANSACTION,
                    &format!("Transaction {} is not in progress", tag.txn_number),
                ))
            }
        };
        if expired {
            session.workspace = None;
            return Err(server_error(
                CODE_TRANSACTION_EXPIRED,
                &format!("Transaction {} exceeded its lifetime", tag.txn_number),
            ));
        }
        session.workspace.as_mut().ok_or_else(|| {
            DriverError::new("Transaction workspace vanished", ErrorKind::InternalError)
        })
    }

    fn commit(&self, tag: &TransactionTag) -> DriverResult<Reply> {
        let mut session = self.sessions.entry(tag.session_id.clone()).or_default();
        let session = session.value_mut();

        if session.committed_txn == Some(tag.txn_number) {
            // commit is idempotent
            return Ok(Reply::ok());
        }
        if tag.start_transaction && tag.txn_number > session.last_txn_number {
            // a transaction that ran nothing
            session.last_txn_number = tag.txn_number;
            session.workspace = None;
            session.committed_txn = Some(tag.txn_number);
            return Ok(Reply::ok());
        }

        self.live_workspace(tag, session)?;
        let workspace = match session.workspace.take() {
            Some(workspace) => workspace,
            None => return Err(server_error(CODE_NO_SUCH_TRANSACTION, "No transaction in progress")),
        };
        if !workspace.is_empty() {
            let snapshot = workspace.snapshot();
            self.apply(workspace.into_writes(), snapshot)?;
        }
        session.committed_txn = Some(tag.txn_number);
        log::debug!("Transaction {} of session {} committed", tag.txn_number, tag.session_id);
        Ok(Reply::ok())
    }

    fn apply(&self, writes: BTreeMap<Namespace, BTreeMap<String, Option<Document>>>, snapshot: u64) -> DriverResult<()> {
        // lock every namespace in order before checking anything
        let namespaces = writes
            .keys()
            .map(|ns| (ns, self.namespace_or_create(ns)))
            .collect_vec();
        let mut guards = namespaces.iter().map(|(ns, data)| (*ns, data.write())).collect_vec();

        for (ns, data) in &guards {
            if let Some(changes) = writes.get(*ns) {
                for key in changes.keys() {
                    if data.version(key) > snapshot {
                        return Err(write_conflict(ns, key));
                    }
                }
            }
        }

        let version = self.tick();
        for (ns, data) in guards.iter_mut() {
            if let Some(changes) = writes.get(*ns) {
                for (key, document) in changes {
                    data.apply(key.clone(), document.clone(), version);
                }
            }
        }
        Ok(())
    }

    fn abort(&self, tag: &TransactionTag) -> DriverResult<Reply> {
        let mut session = self.sessions.entry(tag.session_id.clone()).or_default();
        let session = session.value_mut();

        if tag.start_transaction && tag.txn_number > session.last_txn_number {
            session.last_txn_number = tag.txn_number;
            session.workspace = None;
            return Ok(Reply::ok());
        }
        // reports committed, unknown and expired transactions
        self.live_workspace(tag, session)?;
        session.workspace = None;
        log::debug!("Transaction {} of session {} aborted", tag.txn_number, tag.session_id);
        Ok(Reply::ok())
    }
}

fn namespace_of(command: &Command) -> DriverResult<&Namespace> {
    command.namespace().ok_or_else(|| {
        log::error!("{} has no namespace", command.name());
        DriverError::new(&format!("{} has no namespace", command.name()), ErrorKind::InvalidOperation)
    })
}

fn check_conflicts(ns: &Namespace, changes: &[Change], data: &NamespaceData, snapshot: u64) -> DriverResult<()> {
    match changes.iter().find(|(key, _)| data.version(key) > snapshot) {
        Some((key, _)) => Err(write_conflict(ns, key)),
        None => Ok(()),
    }
}

fn write_conflict(ns: &Namespace, key: &str) -> DriverError {
    server_error(CODE_WRITE_CONFLICT, &format!("WriteConflict on {} for {}", ns, key))
}

fn server_error(code: i32, message: &str) -> DriverError {
    log::error!("{} (code {})", message, code);
    DriverError::new(message, ErrorKind::Server(code))
}
