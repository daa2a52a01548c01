//! # docdriver - session-scoped transactions for a document-database driver
//!
//! A session groups a sequence of reads and writes into one atomic unit. The
//! writes are visible inside the session as soon as they run and become
//! visible to every other session only when the transaction commits. An
//! aborted transaction leaves no trace.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docdriver::cluster::Cluster;
//! use docdriver::doc;
//! use docdriver::server::memory::MemoryServer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cluster = Cluster::builder().build(MemoryServer::new())?;
//! let session = cluster.new_session();
//! let coll = session.db().collection("mycoll");
//!
//! session.start_transaction()?;
//! coll.insert(doc! { "a": "a" })?;
//! session.commit_transaction()?;
//!
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## How commands flow
//!
//! Every CRUD call on a [`collection::Collection`] becomes a
//! [`command::Command`]. While the session has a transaction in progress the
//! [`transaction::CommandTagger`] attaches a [`command::TransactionTag`]
//! (session id, transaction number, first-statement flag) before the command
//! reaches the [`command::CommandExecutor`]. Commit and abort are issued by the
//! [`transaction::TransactionController`].
//!
//! ## Module Organization
//!
//! - [`cluster`] - Shared deployment handle, hands out sessions
//! - [`cluster_builder`] / [`cluster_config`] - Driver configuration
//! - [`collection`] - Documents, databases and the CRUD surface
//! - [`command`] - Commands, replies, transaction tags and the executor seam
//! - [`common`] - Values, constants and helpers
//! - [`errors`] - Error types and result definitions
//! - [`server`] - In-memory command execution
//! - [`transaction`] - Sessions and the transaction state machine

pub mod cluster;
pub mod cluster_builder;
pub mod cluster_config;
pub mod collection;
pub mod command;
pub mod common;
pub mod errors;
pub mod server;
pub mod transaction;
