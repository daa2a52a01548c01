//! Session-scoped transactions: the state machine, the command tagger, the
//! start/commit/abort controller and the session that ties them together.

mod controller;
mod core;
mod session;
mod tagger;

pub use self::core::*;
pub use controller::*;
pub use session::*;
pub use tagger::*;
