mod change_info;
#[allow(clippy::module_inception)]
mod collection;
mod database;
mod document;

pub use change_info::*;
pub use collection::*;
pub use database::*;
pub use document::*;
