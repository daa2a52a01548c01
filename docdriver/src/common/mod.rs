mod constants;
mod type_utils;
mod value;

pub use constants::*;
pub use type_utils::*;
pub use value::*;
