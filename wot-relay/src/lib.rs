//! WoT Explorer Relay Layer
//!
//! Provides realtime relay access for graph exploration:
//! - Relay wire protocol and WebSocket transport
//! - Concurrent fan-out with dedup and hard time budgets
//! - Backward feed pagination
//! - In-memory relays for offline runs

pub mod config;
pub mod message;
pub mod transport;
pub mod memory;
pub mod fetcher;
pub mod feed;

pub use config::*;
pub use message::*;
pub use transport::*;
pub use memory::*;
pub use fetcher::*;
pub use feed::*;
