//! On-chain price sources.
//!
//! DexScreener is the primary source (any chain, includes liquidity);
//! Jupiter supplements it with swap-quote prices for Solana mints.

pub mod dexscreener;
pub mod jupiter;

pub use dexscreener::{DexScreener, DexTokenData};
pub use jupiter::Jupiter;

use async_trait::async_trait;

/// On-chain lookup seam the engine and liquidity analyzer work against.
#[async_trait]
pub trait DexSource: Send + Sync {
    async fn search_token(&self, symbol: &str) -> Option<DexTokenData>;
    async fn close(&self);
}

#[async_trait]
impl DexSource for DexScreener {
    async fn search_token(&self, symbol: &str) -> Option<DexTokenData> {
        DexScreener::search_token(self, symbol).await
    }

    async fn close(&self) {
        DexScreener::close(self).await;
    }
}
