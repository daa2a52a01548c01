/// Reserved identity field of every stored document.
pub const DOC_ID: &str = "_id";

/// Database used by `Session::db()` unless configured otherwise.
pub const DEFAULT_DATABASE: &str = "test";

// Envelope fields attached by the command tagger
pub const SESSION_ID_FIELD: &str = "lsid";
pub const TXN_NUMBER_FIELD: &str = "txnNumber";
pub const START_TRANSACTION_FIELD: &str = "startTransaction";
pub const AUTOCOMMIT_FIELD: &str = "autocommit";
pub const WRITE_CONCERN_FIELD: &str = "writeConcern";
pub const MAX_TIME_MS_FIELD: &str = "maxTimeMS";

// Server codes understood by the driver and produced by the in-memory server
pub const CODE_NAMESPACE_NOT_FOUND: i32 = 26;
pub const CODE_NAMESPACE_EXISTS: i32 = 48;
pub const CODE_WRITE_CONFLICT: i32 = 112;
pub const CODE_NO_SUCH_TRANSACTION: i32 = 251;
pub const CODE_TRANSACTION_COMMITTED: i32 = 256;
pub const CODE_OPERATION_NOT_SUPPORTED_IN_TRANSACTION: i32 = 263;
pub const CODE_TRANSACTION_EXPIRED: i32 = 290;
pub const CODE_DUPLICATE_KEY: i32 = 11000;
