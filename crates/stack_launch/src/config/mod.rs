//! Stack configuration

mod stack;

pub use stack::*;
