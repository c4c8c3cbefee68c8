//! Request handlers for sync operations.

mod initial;
mod sync;

pub use initial::*;
pub use sync::*;
