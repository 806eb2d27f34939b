//! Streaming price layer.
//!
//! One connection task per venue and market type, with reconnect,
//! subscription replay and a last-price cache the engine reads instead
//! of hitting REST when streaming is active.

pub mod dialect;
pub mod manager;

pub use manager::WsManager;
