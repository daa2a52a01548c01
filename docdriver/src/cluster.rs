use crate::cluster_builder::ClusterBuilder;
use crate::cluster_config::ClusterConfig;
use crate::command::Executor;
use crate::transaction::Session;
use std::sync::Arc;

/// Shared handle to a deployment: the command-execution layer plus the
/// driver configuration.
///
/// A cluster is never owned by a session. Every session, including copies,
/// holds a clone of the same handle, and cloning only bumps a reference count.
///
/// ```rust,ignore
/// let cluster = Cluster::builder().build(MemoryServer::new())?;
/// let session = cluster.new_session();
/// let coll = session.db().collection("mycoll");
/// ```
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

impl Cluster {
    pub(crate) fn new(executor: Executor, config: ClusterConfig) -> Self {
        Cluster {
            inner: Arc::new(ClusterInner { executor, config }),
        }
    }

    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::new()
    }

    /// Opens a new session in the idle state.
    pub fn new_session(&self) -> Session {
        Session::new(self.clone())
    }

    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.inner.config
    }

    /// Whether two handles refer to the same cluster.
    pub fn same_as(&self, other: &Cluster) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

struct ClusterInner {
    executor: Executor,
    config: ClusterConfig,
}
