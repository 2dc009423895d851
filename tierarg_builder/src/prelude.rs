//! Items which, typically, may be imported without concern: `use tierarg::prelude::*`.

pub use crate::dispatch::{die, stop};

/// Behaviour for documenting choices on an `ArgumentSpec`.
// Needs to be imported in order to document choices.
pub trait Choices<T> {
    fn choice(self, variant: T, description: impl Into<String>) -> Self;
}
