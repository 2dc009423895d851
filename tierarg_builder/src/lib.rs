//! Builder module for `tierarg`.
//! See [documentation root](https://docs.rs/tierarg/latest/tierarg/index.html) for full details.
#![deny(missing_docs)]
mod api;
mod data;
mod dispatch;
mod model;
mod parser;
#[allow(missing_docs)]
pub mod prelude;
mod resolve;

pub use api::*;
pub use data::{ArgumentData, Bucket, Source};
pub use dispatch::{die, stop, Callback, Context, Flow, Parsed, ParserData};
pub use model::*;
pub use parser::{ConfigError, NodeId, ResolveError};

#[cfg(test)]
#[macro_use]
extern crate assert_matches;
