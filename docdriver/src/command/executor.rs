use crate::command::{Command, Reply, TransactionTag};
use crate::errors::DriverResult;
use std::ops::Deref;
use std::sync::Arc;

/// The command-execution layer the driver sits on.
///
/// Implementations deliver a command (optionally inside a transaction) and
/// return the server's structured reply. Server rejections come back as
/// `ErrorKind::Server(code)`; delivery failures as `ErrorKind::Network`.
///
/// # Implementations
/// - `MemoryServer`: in-memory reference server
/// - test doubles that record envelopes or inject failures
///
/// # Thread Safety
/// Implementers must be `Send + Sync`; one executor is shared by every session
/// of a cluster.
pub trait CommandExecutor: Send + Sync {
    /// Executes `command`, inside the transaction described by `tag` if present.
    fn execute(&self, command: &Command, tag: Option<&TransactionTag>) -> DriverResult<Reply>;
}

/// Shared handle to a [CommandExecutor]. Cloning only bumps a reference count.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<dyn CommandExecutor>,
}

impl Executor {
    pub fn new<T: CommandExecutor + 'static>(inner: T) -> Self {
        Executor { inner: Arc::new(inner) }
    }

    /// Wraps an executor the caller keeps a typed handle to.
    pub fn from_arc(inner: Arc<dyn CommandExecutor>) -> Self {
        Executor { inner }
    }
}

impl Deref for Executor {
    type Target = Arc<dyn CommandExecutor>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
