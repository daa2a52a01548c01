use std::time::Duration;

/// Default lifetime of a server-side transaction.
pub const DEFAULT_TRANSACTION_LIFETIME: Duration = Duration::from_secs(60);

/// Configuration for a [MemoryServer](super::MemoryServer).
///
/// A transaction older than `transaction_lifetime` is aborted by the server
/// the next time it is used, and that use fails with code 290.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryServerConfig {
    transaction_lifetime: Duration,
}

impl MemoryServerConfig {
    pub fn new() -> Self {
        MemoryServerConfig {
            transaction_lifetime: DEFAULT_TRANSACTION_LIFETIME,
        }
    }

    pub fn with_transaction_lifetime(mut self, lifetime: Duration) -> Self {
        self.transaction_lifetime = lifetime;
        self
    }

    pub fn transaction_lifetime(&self) -> Duration {
        self.transaction_lifetime
    }
}

impl Default for MemoryServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
