use crate::cluster::Cluster;
use crate::command::{Command, CommandEnvelope, SessionId, TransactionTag};
use crate::errors::DriverResult;
use crate::transaction::{TransactionContext, TransactionStateMachine};
use std::sync::Arc;

/// Start, commit and abort for one session.
///
/// The state machine decides who wins each transition; the controller sends
/// the commit/abort command outside the machine's lock and always returns the
/// machine to idle afterwards, whatever the outcome. Nothing is retried.
#[derive(Clone)]
pub struct TransactionController {
    session_id: SessionId,
    machine: Arc<TransactionStateMachine>,
    cluster: Cluster,
}

impl TransactionController {
    pub fn new(
        session_id: SessionId,
        machine: Arc<TransactionStateMachine>,
        cluster: Cluster,
    ) -> Self {
        TransactionController {
            session_id,
            machine,
            cluster,
        }
    }

    /// Opens a transaction. Nothing is sent until the next statement.
    pub fn start(&self) -> DriverResult<()> {
        self.machine.start().map(|_| ())
    }

    /// Commits the open transaction.
    ///
    /// # Errors
    /// * `NoTransactionInProgress` - nothing to commit
    /// * server rejections and network failures, returned as-is with the
    ///   session already back to idle
    pub fn commit(&self) -> DriverResult<()> {
        let resolving = self.begin_resolve()?;
        if self.elide(resolving.context()) {
            log::debug!("Transaction {} ran no statement, commit elided", resolving.txn_number());
            return Ok(());
        }

        let config = self.cluster.config();
        let command = Command::CommitTransaction {
            write_concern: config.write_concern(),
            max_time: config.commit_max_time(),
        };
        match self.send(command, resolving.context()) {
            Ok(_) => {
                log::debug!("Transaction {} committed", resolving.txn_number());
                Ok(())
            }
            Err(err) => {
                log::error!("Commit of transaction {} failed: {}", resolving.txn_number(), err);
                Err(err)
            }
        }
    }

    /// Aborts the open transaction.
    ///
    /// The session is idle afterwards even if the abort command fails. A
    /// network failure is logged and swallowed; a server rejection is returned.
    pub fn abort(&self) -> DriverResult<()> {
        let resolving = self.begin_resolve()?;
        if self.elide(resolving.context()) {
            log::debug!("Transaction {} ran no statement, abort elided", resolving.txn_number());
            return Ok(());
        }

        let command = Command::AbortTransaction {
            write_concern: self.cluster.config().write_concern(),
        };
        match self.send(command, resolving.context()) {
            Ok(_) => {
                log::debug!("Transaction {} aborted", resolving.txn_number());
                Ok(())
            }
            Err(err) if err.is_network() => {
                log::warn!("Abort of transaction {} was not delivered: {}", resolving.txn_number(), err);
                Ok(())
            }
            Err(err) => {
                log::error!("Abort of transaction {} failed: {}", resolving.txn_number(), err);
                Err(err)
            }
        }
    }

    fn begin_resolve(&self) -> DriverResult<Resolving<'_>> {
        let context = self.machine.begin_resolve()?;
        Ok(Resolving {
            machine: &self.machine,
            context,
        })
    }

    fn elide(&self, context: &TransactionContext) -> bool {
        context.statements() == 0 && self.cluster.config().elide_empty_transactions()
    }

    fn send(&self, command: Command, context: &TransactionContext) -> DriverResult<()> {
        // a transaction that ran nothing still needs startTransaction on the wire
        let tag = TransactionTag::new(
            self.session_id.clone(),
            context.txn_number(),
            context.is_first_statement(),
        );
        CommandEnvelope::new(command, Some(tag))
            .send(self.cluster.executor())
            .map(|_| ())
    }
}

// Returns the machine to idle when dropped, so an early return or a panic in
// the executor never leaves the session stuck resolving.
struct Resolving<'a> {
    machine: &'a TransactionStateMachine,
    context: TransactionContext,
}

impl Resolving<'_> {
    fn context(&self) -> &TransactionContext {
        &self.context
    }

    fn txn_number(&self) -> i64 {
        self.context.txn_number()
    }
}

impl Drop for Resolving<'_> {
    fn drop(&mut self) {
        self.machine.finish_resolve(self.context.txn_number());
    }
}
