use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Message returned when a transaction is started on a session that already has one.
pub const TRANSACTION_ALREADY_STARTED: &str = "transaction already started";
/// Message returned when commit or abort is called on an idle session.
pub const NO_TRANSACTION_IN_PROGRESS: &str = "no transaction in progress";
/// Message returned when a statement is issued while commit or abort is in flight.
pub const TRANSACTION_RESOLVING: &str = "transaction is being committed or aborted";
/// Message returned when a single-document operation matches nothing.
pub const NOT_FOUND: &str = "not found";
/// Message returned when a closed session is used.
pub const SESSION_CLOSED: &str = "session is closed";

/// Error kinds for driver operations.
///
/// The first three variants are the protocol-state errors raised purely from the
/// local transaction state. `Server` carries the numeric code of a rejection
/// reported by the command-execution layer.
///
/// # Examples
///
/// ```rust,ignore
/// use docdriver::errors::{DriverError, ErrorKind, DriverResult};
///
/// fn example() -> DriverResult<()> {
///     Err(DriverError::new("write conflict", ErrorKind::Server(112)))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Protocol state errors
    /// A transaction is already active on the session
    TransactionAlreadyStarted,
    /// No transaction is active on the session
    NoTransactionInProgress,
    /// A statement arrived while the transaction was being committed or aborted
    TransactionResolving,

    // Session errors
    /// The session has been closed
    SessionClosed,

    // Server and transport errors
    /// The server rejected the command with the given code
    Server(i32),
    /// The command could not be delivered or its reply was lost
    Network,

    // Operation errors
    /// A single-document operation matched nothing
    NotFound,
    /// The operation is not valid in the current context
    InvalidOperation,
    /// A query document could not be interpreted
    InvalidQuery,
    /// An update document could not be interpreted
    InvalidUpdate,
    /// Configuration or argument validation failed
    ValidationError,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::TransactionAlreadyStarted => write!(f, "Transaction already started"),
            ErrorKind::NoTransactionInProgress => write!(f, "No transaction in progress"),
            ErrorKind::TransactionResolving => write!(f, "Transaction resolving"),
            ErrorKind::SessionClosed => write!(f, "Session closed"),
            ErrorKind::Server(code) => write!(f, "Server error {}", code),
            ErrorKind::Network => write!(f, "Network error"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::InvalidQuery => write!(f, "Invalid query"),
            ErrorKind::InvalidUpdate => write!(f, "Invalid update"),
            ErrorKind::ValidationError => write!(f, "Validation error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Driver error type.
///
/// `DriverError` carries a message, a kind, an optional cause and the backtrace
/// captured where it was created. `Display` prints only the message, so callers
/// can match on the stable strings exported by this module.
///
/// # Examples
///
/// ```rust,ignore
/// use docdriver::errors::{DriverError, ErrorKind};
///
/// let err = DriverError::new("no transaction in progress", ErrorKind::NoTransactionInProgress);
/// assert_eq!(err.to_string(), "no transaction in progress");
/// ```
#[derive(Clone)]
pub struct DriverError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DriverError>>,
    backtrace: Atomic<Backtrace>,
}

impl DriverError {
    /// Creates a new `DriverError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DriverError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new()),
        }
    }

    /// Creates a new `DriverError` wrapping a cause.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: DriverError) -> Self {
        DriverError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new()),
        }
    }

    pub(crate) fn already_started() -> Self {
        DriverError::new(TRANSACTION_ALREADY_STARTED, ErrorKind::TransactionAlreadyStarted)
    }

    pub(crate) fn no_transaction() -> Self {
        DriverError::new(NO_TRANSACTION_IN_PROGRESS, ErrorKind::NoTransactionInProgress)
    }

    pub(crate) fn resolving() -> Self {
        DriverError::new(TRANSACTION_RESOLVING, ErrorKind::TransactionResolving)
    }

    pub(crate) fn session_closed() -> Self {
        DriverError::new(SESSION_CLOSED, ErrorKind::SessionClosed)
    }

    pub(crate) fn not_found() -> Self {
        DriverError::new(NOT_FOUND, ErrorKind::NotFound)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DriverError> {
        self.cause.as_deref()
    }

    /// Returns the server code if this error is a server rejection.
    pub fn server_code(&self) -> Option<i32> {
        match self.error_kind {
            ErrorKind::Server(code) => Some(code),
            _ => None,
        }
    }

    /// Errors decided purely from local transaction state.
    pub fn is_protocol_state(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::TransactionAlreadyStarted
                | ErrorKind::NoTransactionInProgress
                | ErrorKind::TransactionResolving
        )
    }

    /// Errors reported by the server for a delivered command.
    pub fn is_server_rejection(&self) -> bool {
        matches!(self.error_kind, ErrorKind::Server(_))
    }

    pub fn is_network(&self) -> bool {
        self.error_kind == ErrorKind::Network
    }
}

impl Display for DriverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DriverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({})\nCaused by: {:?}", self.message, self.error_kind, cause),
            None => write!(f, "{} ({})\n{:?}", self.message, self.error_kind, self.backtrace.read()),
        }
    }
}

impl Error for DriverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

impl PartialEq for DriverError {
    fn eq(&self, other: &Self) -> bool {
        self.error_kind == other.error_kind && self.message == other.message
    }
}

/// A result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

impl From<regex::Error> for DriverError {
    fn from(err: regex::Error) -> Self {
        DriverError::new(&format!("Invalid regular expression: {}", err), ErrorKind::InvalidQuery)
    }
}

impl From<String> for DriverError {
    fn from(msg: String) -> Self {
        DriverError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for DriverError {
    fn from(msg: &str) -> Self {
        DriverError::new(msg, ErrorKind::InternalError)
    }
}
