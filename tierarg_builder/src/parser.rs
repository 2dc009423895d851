mod argument;
mod base;
mod command;
mod interface;
mod middleware;

pub use base::*;
pub use command::NodeId;
pub(crate) use command::{CommandNode, CommandTree, NodeSettings};
pub(crate) use interface::*;
pub(crate) use middleware::*;
