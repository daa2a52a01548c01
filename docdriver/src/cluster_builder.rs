use crate::cluster::Cluster;
use crate::cluster_config::ClusterConfig;
use crate::command::{CommandExecutor, Executor, WriteConcern};
use crate::errors::{DriverError, DriverResult};
use std::time::Duration;

/// Builder for a [Cluster].
///
/// Follows the builder pattern and captures the first configuration error,
/// which is returned from [build](ClusterBuilder::build).
///
/// # Examples
///
/// ```rust,ignore
/// use docdriver::cluster::Cluster;
/// use docdriver::server::memory::MemoryServer;
///
/// let cluster = Cluster::builder()
///     .default_database("mydb")
///     .commit_max_time(Duration::from_secs(5))
///     .build(MemoryServer::new())?;
/// ```
#[derive(Default)]
pub struct ClusterBuilder {
    error: Option<DriverError>,
    config: ClusterConfig,
}

impl ClusterBuilder {
    pub fn new() -> Self {
        ClusterBuilder {
            error: None,
            config: ClusterConfig::new(),
        }
    }

    /// Database returned by `Session::db()`. Must not be empty.
    pub fn default_database(mut self, name: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_default_database(name) {
                self.error = Some(e);
            }
        }
        self
    }

    /// When `true` (the default), committing or aborting a transaction that
    /// ran no statement sends nothing to the server.
    pub fn elide_empty_transactions(mut self, elide: bool) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_elide_empty_transactions(elide) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Server-side time limit for `commitTransaction`.
    pub fn commit_max_time(mut self, max_time: Duration) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_commit_max_time(max_time) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_write_concern(write_concern) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Builds the cluster on top of `executor`.
    ///
    /// # Errors
    ///
    /// Returns the first error captured while configuring.
    pub fn build<T: CommandExecutor + 'static>(self, executor: T) -> DriverResult<Cluster> {
        self.build_with(Executor::new(executor))
    }

    /// Builds the cluster on top of an already shared executor handle.
    pub fn build_with(self, executor: Executor) -> DriverResult<Cluster> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.config.initialize();
        Ok(Cluster::new(executor, self.config))
    }
}
