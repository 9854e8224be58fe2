//! WoT Explorer - graph expansion over external trust data
//!
//! Connects the synchronous core to the outside world:
//! - Follow-list/trust provider seam with an HTTP bridge
//! - Durable key-value storage and the versioned local cache
//! - Shared single-writer store handle
//! - Profile loading and the expansion controller

pub mod config;
pub mod storage;
pub mod cache;
pub mod provider;
pub mod store;
pub mod profiles;
pub mod expansion;

pub use config::*;
pub use storage::*;
pub use cache::*;
pub use provider::*;
pub use store::*;
pub use profiles::*;
pub use expansion::*;
