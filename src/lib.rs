//! Multi-venue arbitrage detection engine.
//!
//! Continuously polls prices for the same asset across centralized
//! exchanges and DEX price sources, detects cross-venue spreads, gates
//! them on liquidity, and pushes qualifying opportunities to Telegram
//! and the analytics store.

pub mod adapters;
pub mod config;
pub mod core;
pub mod dex;
pub mod error;
pub mod notifier;
pub mod rate_limit;
pub mod storage;
pub mod ws;

pub use error::AppError;
