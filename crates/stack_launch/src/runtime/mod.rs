//! Runtime components for process management

pub mod launcher;
pub mod process;
pub mod readiness;

pub use launcher::*;
pub use process::*;
pub use readiness::*;
