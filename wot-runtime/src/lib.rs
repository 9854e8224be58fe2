//! WoT Explorer Runtime
//!
//! Exploration sessions: one store, one controller and the UI-facing state
//! per root identity.

pub mod session;

pub use session::*;
