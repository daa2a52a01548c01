//! Commands, replies and the command-execution layer the driver sends them through.

#[allow(clippy::module_inception)]
mod command;
mod envelope;
mod executor;
mod reply;

pub use command::*;
pub use envelope::*;
pub use executor::*;
pub use reply::*;
