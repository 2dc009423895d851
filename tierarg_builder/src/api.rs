mod command;
mod core;
mod parameter;

pub use self::core::*;
pub use command::*;
pub use parameter::*;
