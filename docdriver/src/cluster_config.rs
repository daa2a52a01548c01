use crate::command::WriteConcern;
use crate::common::DEFAULT_DATABASE;
use crate::errors::{DriverError, DriverResult, ErrorKind};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration shared by a cluster and every session it hands out.
///
/// `ClusterConfig` uses the PIMPL pattern: clones are cheap and share the same
/// settings. Setters are only accepted until the cluster is built; afterwards
/// the configuration is frozen and setters fail with `InvalidOperation`.
///
/// # Settings
/// - `default_database`: database returned by `Session::db()` (default `"test"`)
/// - `elide_empty_transactions`: skip the network commit/abort of a
///   transaction that ran no statement (default `true`)
/// - `commit_max_time`: sent as `maxTimeMS` with `commitTransaction`
/// - `write_concern`: attached to commit/abort and to writes sent outside a
///   transaction
#[derive(Clone)]
pub struct ClusterConfig {
    inner: Arc<ClusterConfigInner>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterConfig {
    pub fn new() -> Self {
        ClusterConfig {
            inner: Arc::new(ClusterConfigInner::new()),
        }
    }

    pub fn default_database(&self) -> String {
        self.inner.default_database()
    }

    pub fn set_default_database(&self, name: &str) -> DriverResult<()> {
        self.inner.set_default_database(name)
    }

    pub fn elide_empty_transactions(&self) -> bool {
        self.inner.elide_empty_transactions()
    }

    pub fn set_elide_empty_transactions(&self, elide: bool) -> DriverResult<()> {
        self.inner.set_elide_empty_transactions(elide)
    }

    pub fn commit_max_time(&self) -> Option<Duration> {
        self.inner.commit_max_time()
    }

    pub fn set_commit_max_time(&self, max_time: Duration) -> DriverResult<()> {
        self.inner.set_commit_max_time(max_time)
    }

    pub fn write_concern(&self) -> Option<WriteConcern> {
        self.inner.write_concern()
    }

    pub fn set_write_concern(&self, write_concern: WriteConcern) -> DriverResult<()> {
        self.inner.set_write_concern(write_concern)
    }

    pub fn is_configured(&self) -> bool {
        self.inner.configured.load(Ordering::Relaxed)
    }

    /// Freezes the configuration. Called once when the cluster is built.
    pub(crate) fn initialize(&self) {
        self.inner.configured.store(true, Ordering::Relaxed);
    }
}

struct ClusterConfigInner {
    configured: AtomicBool,
    default_database: RwLock<String>,
    elide_empty_transactions: AtomicBool,
    commit_max_time: RwLock<Option<Duration>>,
    write_concern: RwLock<Option<WriteConcern>>,
}

impl ClusterConfigInner {
    fn new() -> Self {
        ClusterConfigInner {
            configured: AtomicBool::new(false),
            default_database: RwLock::new(DEFAULT_DATABASE.to_string()),
            elide_empty_transactions: AtomicBool::new(true),
            commit_max_time: RwLock::new(None),
            write_concern: RwLock::new(None),
        }
    }

    fn check_not_configured(&self, setting: &str) -> DriverResult<()> {
        if self.configured.load(Ordering::Relaxed) {
            log::error!("{} cannot be changed after the cluster is built", setting);
            return Err(DriverError::new(
                &format!("{} cannot be changed after the cluster is built", setting),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }

    fn default_database(&self) -> String {
        self.default_database.read().clone()
    }

    fn set_default_database(&self, name: &str) -> DriverResult<()> {
        self.check_not_configured("Default database")?;
        if name.is_empty() {
            log::error!("Default database name cannot be empty");
            return Err(DriverError::new(
                "Default database name cannot be empty",
                ErrorKind::ValidationError,
            ));
        }
        *self.default_database.write() = name.to_string();
        Ok(())
    }

    fn elide_empty_transactions(&self) -> bool {
        self.elide_empty_transactions.load(Ordering::Relaxed)
    }

    fn set_elide_empty_transactions(&self, elide: bool) -> DriverResult<()> {
        self.check_not_configured("Empty transaction elision")?;
        self.elide_empty_transactions.store(elide, Ordering::Relaxed);
        Ok(())
    }

    fn commit_max_time(&self) -> Option<Duration> {
        *self.commit_max_time.read()
    }

    fn set_commit_max_time(&self, max_time: Duration) -> DriverResult<()> {
        self.check_not_configured("Commit max time")?;
        if max_time.is_zero() {
            log::error!("Commit max time must be positive");
            return Err(DriverError::new(
                "Commit max time must be positive",
                ErrorKind::ValidationError,
            ));
        }
        *self.commit_max_time.write() = Some(max_time);
        Ok(())
    }

    fn write_concern(&self) -> Option<WriteConcern> {
        *self.write_concern.read()
    }

    fn set_write_concern(&self, write_concern: WriteConcern) -> DriverResult<()> {
        self.check_not_configured("Write concern")?;
        // negative w is reserved for "majority"
        if write_concern.w < 0 && write_concern != WriteConcern::majority() {
            log::error!("Invalid write concern w: {}", write_concern.w);
            return Err(DriverError::new(
                &format!("Invalid write concern w: {}", write_concern.w),
                ErrorKind::ValidationError,
            ));
        }
        *self.write_concern.write() = Some(write_concern);
        Ok(())
    }
}
