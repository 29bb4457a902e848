//! Input: window events folded into one snapshot per frame, mapped to actions.
//!
//! # Invariants
//! - The snapshot is consumed once per frame; `end_frame` clears edge state
//!   (pressed keys, mouse delta, pending resize) but keeps held keys.
//! - Consumers see actions, never raw platform key codes.

pub mod action;
pub mod snapshot;

pub use action::{Action, ActionMap};
pub use snapshot::{InputSnapshot, Key};

pub fn crate_info() -> &'static str {
    "prism-input v0.1.0"
}
