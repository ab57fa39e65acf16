//! Output state-transaction core of a tag-based tiling Wayland compositor.
//!
//! Outputs and views stage their changes in `pending` state. The transaction coordinator captures
//! the pending state of every output, waits for layout generators and clients to catch up, and
//! then commits all outputs at once, so that no frame ever shows a half-applied change. Session
//! locking tracks what each output actually presented before reporting the session as locked.

#[macro_use]
extern crate tracing;

pub mod backend;
pub mod layer;
pub mod layout;
pub mod lock;
pub mod mode;
pub mod output;
pub mod root;
pub mod scene;
pub mod stack;
pub mod transaction;
pub mod utils;
pub mod view;

pub use crate::root::Root;

#[cfg(test)]
mod tests;
