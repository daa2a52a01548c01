use crate::cluster::Cluster;
use crate::collection::Database;
use crate::command::{Command, CommandEnvelope, Reply, SessionId};
use crate::errors::{DriverError, DriverResult, ErrorKind};
use crate::transaction::{
    CommandTagger, TransactionController, TransactionState, TransactionStateMachine,
};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A logical session against a cluster.
///
/// A session groups the operations issued through it into at most one
/// transaction at a time. While a transaction is open every operation on a
/// collection obtained from this session is tagged with it; its writes are
/// visible to this session immediately and to other sessions only after
/// commit.
///
/// # Characteristics
/// - **Unique ID**: each session has its own UUID v4 identifier
/// - **Shared handle**: `clone()` returns another handle to the *same*
///   session; use [copy](Session::copy) for an independent one
/// - **Thread-safe**: start/commit/abort may race from several threads; each
///   transition has exactly one winner
/// - **Auto-cleanup**: dropping the last handle closes the session, aborting
///   an open transaction first
///
/// # Usage
/// ```ignore
/// let session = cluster.new_session();
/// let coll = session.db().collection("mycoll");
/// session.start_transaction()?;
/// coll.insert(doc! { "a": "a" })?;
/// session.commit_transaction()?;
/// session.close()?;
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(cluster: Cluster) -> Self {
        Session {
            inner: Arc::new(SessionInner::new(cluster)),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// The cluster this session was opened on.
    pub fn cluster(&self) -> &Cluster {
        &self.inner.cluster
    }

    /// Starts a transaction.
    ///
    /// # Errors
    /// * `TransactionAlreadyStarted` - a transaction is open or being resolved
    /// * `SessionClosed` - the session was closed
    pub fn start_transaction(&self) -> DriverResult<()> {
        self.inner.check_open()?;
        self.inner.controller.start()
    }

    /// Commits the open transaction, making its writes visible atomically.
    ///
    /// The session is idle when this returns, whether or not the commit
    /// succeeded.
    pub fn commit_transaction(&self) -> DriverResult<()> {
        self.inner.check_open()?;
        self.inner.controller.commit()
    }

    /// Aborts the open transaction, discarding its writes.
    ///
    /// The session is idle when this returns, even if the abort command
    /// could not be delivered.
    pub fn abort_transaction(&self) -> DriverResult<()> {
        self.inner.check_open()?;
        self.inner.controller.abort()
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_state() == TransactionState::Active
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.inner.machine.state()
    }

    /// Runs `f` inside a new transaction.
    ///
    /// Commits when `f` returns `Ok`, aborts and returns `f`'s error otherwise.
    ///
    /// ```ignore
    /// let id = session.with_transaction(|s| {
    ///     let coll = s.db().collection("mycoll");
    ///     coll.insert(doc! { "a": "a" })?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn with_transaction<T, F>(&self, f: F) -> DriverResult<T>
    where
        F: FnOnce(&Session) -> DriverResult<T>,
    {
        self.start_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = self.abort_transaction() {
                    log::warn!("Abort after failed transaction body also failed: {}", abort_err);
                }
                Err(err)
            }
        }
    }

    /// Opens a new session on the same cluster.
    ///
    /// The copy has its own id and starts idle; it never shares the
    /// transaction of this session.
    pub fn copy(&self) -> DriverResult<Session> {
        self.inner.check_open()?;
        Ok(Session::new(self.inner.cluster.clone()))
    }

    /// Closes the session.
    ///
    /// An open transaction is aborted first, then the server is told the
    /// session ended. Failures of either step are logged and ignored.
    /// Idempotent.
    pub fn close(&self) -> DriverResult<()> {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// The configured default database.
    pub fn db(&self) -> Database {
        let name = self.inner.cluster.config().default_database();
        Database::new(&name, self.clone())
    }

    pub fn database(&self, name: &str) -> DriverResult<Database> {
        if name.is_empty() {
            log::error!("Database name cannot be empty");
            return Err(DriverError::new(
                "Database name cannot be empty",
                ErrorKind::ValidationError,
            ));
        }
        Ok(Database::new(name, self.clone()))
    }

    /// Sends a command through the tagger.
    pub(crate) fn run(&self, command: Command) -> DriverResult<Reply> {
        self.inner.check_open()?;
        let envelope = self.inner.tagger.tag(command)?;
        envelope.send(self.inner.cluster.executor())
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

struct SessionInner {
    id: SessionId,
    closed: AtomicBool,
    cluster: Cluster,
    machine: Arc<TransactionStateMachine>,
    tagger: CommandTagger,
    controller: TransactionController,
}

impl SessionInner {
    fn new(cluster: Cluster) -> Self {
        let id = SessionId::generate();
        let machine = Arc::new(TransactionStateMachine::new());
        log::debug!("Session {} opened", id);
        SessionInner {
            tagger: CommandTagger::new(id.clone(), machine.clone()),
            controller: TransactionController::new(id.clone(), machine.clone(), cluster.clone()),
            id,
            closed: AtomicBool::new(false),
            cluster,
            machine,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> DriverResult<()> {
        if self.is_closed() {
            log::error!("Session {} is closed", self.id);
            return Err(DriverError::session_closed());
        }
        Ok(())
    }

    fn close(&self) -> DriverResult<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Already closed
            return Ok(());
        }

        if self.machine.state() == TransactionState::Active {
            match self.controller.abort() {
                Ok(()) => {}
                // resolved concurrently by another handle
                Err(err) if err.kind() == &ErrorKind::NoTransactionInProgress => {}
                Err(err) => log::warn!("Abort on close of session {} failed: {}", self.id, err),
            }
        }

        let end = Command::EndSessions {
            session_ids: vec![self.id.clone()],
        };
        if let Err(err) = CommandEnvelope::untagged(end).send(self.cluster.executor()) {
            log::warn!("Failed to end session {}: {}", self.id, err);
        }

        log::debug!("Session {} closed", self.id);
        Ok(())
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // Best-effort close - ignore errors
        let _ = self.close();
    }
}
