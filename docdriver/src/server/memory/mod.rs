//! In-memory command execution, used to exercise sessions end to end.

mod config;
mod matcher;
mod plan;
mod projection;
#[allow(clippy::module_inception)]
mod server;
mod store;
mod update;
mod workspace;

pub use config::*;
pub use server::*;
