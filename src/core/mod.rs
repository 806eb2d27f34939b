//! Detection pipeline: spread math, liquidity gating and the cycle loop.

pub mod engine;
pub mod liquidity;
pub mod spread;
pub mod types;

pub use engine::Engine;
pub use liquidity::LiquidityAnalyzer;
pub use types::{LiquiditySnapshot, MarketType, Opportunity, SpreadHit};
