use crate::command::{SessionId, TransactionTag};
use crate::errors::{DriverError, DriverResult};
use parking_lot::Mutex;

/// Publicly observable state of a session's transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// No transaction is open; commands are sent untagged
    Idle,
    /// A transaction is open, or its commit/abort is in flight
    Active,
}

/// Per-transaction bookkeeping owned by the state machine while a
/// transaction is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionContext {
    txn_number: i64,
    first_statement: bool,
    statements: u64,
}

impl TransactionContext {
    fn new(txn_number: i64) -> Self {
        TransactionContext {
            txn_number,
            first_statement: true,
            statements: 0,
        }
    }

    pub fn txn_number(&self) -> i64 {
        self.txn_number
    }

    /// Whether the next tagged statement will be the first of the transaction.
    pub fn is_first_statement(&self) -> bool {
        self.first_statement
    }

    /// Number of statements tagged with this transaction so far.
    pub fn statements(&self) -> u64 {
        self.statements
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    Active(TransactionContext),
    // commit or abort of this transaction is on the network
    Resolving(i64),
}

#[derive(Debug)]
struct MachineState {
    phase: Phase,
    last_txn_number: i64,
}

/// Lifecycle of the transaction of one session.
///
/// Every check-and-transition runs under a single mutex, so concurrent callers
/// see exactly one winner per transition:
///
/// ```text
///   Idle --start--> Active --begin_resolve--> Resolving --finish_resolve--> Idle
/// ```
///
/// `Resolving` is reported as [TransactionState::Active]; it rejects `start`
/// with "transaction already started", rejects a second commit/abort with
/// "no transaction in progress" and tags nothing. Transaction numbers start at
/// 1 and are never reused for the lifetime of the machine.
#[derive(Debug)]
pub struct TransactionStateMachine {
    state: Mutex<MachineState>,
}

impl TransactionStateMachine {
    pub fn new() -> Self {
        TransactionStateMachine {
            state: Mutex::new(MachineState {
                phase: Phase::Idle,
                last_txn_number: 0,
            }),
        }
    }

    /// Opens a new transaction and returns its number.
    ///
    /// # Errors
    /// `TransactionAlreadyStarted` unless the machine is idle.
    pub fn start(&self) -> DriverResult<i64> {
        let mut state = self.state.lock();
        match state.phase {
            Phase::Idle => {
                state.last_txn_number += 1;
                let txn_number = state.last_txn_number;
                state.phase = Phase::Active(TransactionContext::new(txn_number));
                log::debug!("Transaction {} started", txn_number);
                Ok(txn_number)
            }
            _ => {
                log::error!("Cannot start a transaction while another is active");
                Err(DriverError::already_started())
            }
        }
    }

    /// Claims the open transaction for commit or abort.
    ///
    /// The caller that wins owns the returned context and must call
    /// [finish_resolve](Self::finish_resolve) once the outcome is known.
    ///
    /// # Errors
    /// `NoTransactionInProgress` when idle or when another caller already
    /// claimed the transaction.
    pub fn begin_resolve(&self) -> DriverResult<TransactionContext> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut state.phase, Phase::Idle) {
            Phase::Active(context) => {
                state.phase = Phase::Resolving(context.txn_number);
                Ok(context)
            }
            other => {
                state.phase = other;
                log::error!("No transaction to resolve");
                Err(DriverError::no_transaction())
            }
        }
    }

    /// Returns to idle after the transaction `txn_number` was resolved,
    /// whatever the outcome of the commit/abort command.
    pub fn finish_resolve(&self, txn_number: i64) {
        let mut state = self.state.lock();
        if let Phase::Resolving(resolving) = state.phase {
            if resolving == txn_number {
                state.phase = Phase::Idle;
                log::debug!("Transaction {} resolved", txn_number);
            }
        }
    }

    /// Produces the tag for the next statement, or `None` when no transaction
    /// is open. The first call after `start` carries `start_transaction`.
    ///
    /// # Errors
    /// `TransactionResolving` while a commit or abort is in flight. Such a
    /// statement belongs to neither the closing transaction nor autocommit.
    pub fn tag_next(&self, session_id: &SessionId) -> DriverResult<Option<TransactionTag>> {
        let mut state = self.state.lock();
        match &mut state.phase {
            Phase::Idle => Ok(None),
            Phase::Active(context) => {
                let tag = TransactionTag::new(
                    session_id.clone(),
                    context.txn_number,
                    context.first_statement,
                );
                context.first_statement = false;
                context.statements += 1;
                Ok(Some(tag))
            }
            Phase::Resolving(txn_number) => {
                log::error!("Statement issued while transaction {} is resolving", txn_number);
                Err(DriverError::resolving())
            }
        }
    }

    pub fn state(&self) -> TransactionState {
        match self.state.lock().phase {
            Phase::Idle => TransactionState::Idle,
            _ => TransactionState::Active,
        }
    }

    /// A snapshot of the open transaction, if any.
    pub fn context(&self) -> Option<TransactionContext> {
        match &self.state.lock().phase {
            Phase::Active(context) => Some(context.clone()),
            _ => None,
        }
    }

    /// Number of the most recently started transaction, 0 if none was.
    pub fn last_txn_number(&self) -> i64 {
        self.state.lock().last_txn_number
    }
}

impl Default for TransactionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
