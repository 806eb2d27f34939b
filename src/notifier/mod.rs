//! Alert delivery.

pub mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;

use crate::adapters::DepositWithdrawInfo;
use crate::core::types::Opportunity;
use crate::error::Result;

/// Outbound alert channel. `send_message` reports delivery as a bool so
/// a failed send never aborts a detection cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<bool>;
    async fn close(&self);
}

/// A notifier that drops everything, used when alerting is not configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send_message(&self, _text: &str) -> Result<bool> {
        Ok(false)
    }

    async fn close(&self) {}
}

/// Render an opportunity into the alert body.
pub fn render_opportunity(opp: &Opportunity, high_venue_info: Option<&DepositWithdrawInfo>) -> String {
    let hit = &opp.hit;
    let mut body = format!(
        "*Coin:* {}\n\n\
         *Spread:* {:.2}% between {} and {} ({})\n\n\
         *{} price:* {}\n\
         *{} price:* {}\n\n\
         *Liquidity:*\n\
         Total CEX Volume 24h: ${:.2}\n\
         DEX Liquidity: ${:.2}\n\
         Potential profit: ${:.2}\n",
        hit.symbol,
        hit.spread_percent,
        hit.low_venue,
        hit.high_venue,
        hit.market_type,
        hit.low_venue,
        hit.low_price,
        hit.high_venue,
        hit.high_price,
        opp.liquidity.total_cex_volume_24h,
        opp.liquidity.dex_liquidity_usd,
        opp.potential_profit_usd,
    );

    if let Some(info) = high_venue_info {
        body.push_str(&format!(
            "\n*{} info:*\n\
             Max Volume: {}\n\
             Deposit: {}\n\
             Withdraw: {}\n",
            hit.high_venue,
            info.max_volume.as_deref().unwrap_or("N/A"),
            info.deposit_status(),
            info.withdraw_status(),
        ));
    }

    if let Some(dex) = &hit.dex {
        body.push_str(&format!(
            "\n*Contract:* `{}`\n*Network:* {}\n[DexScreener]({})\n",
            dex.contract, dex.network, dex.dex_url
        ));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{LiquiditySnapshot, MarketType, SpreadHit};
    use crate::dex::DexTokenData;

    fn opportunity(with_dex: bool) -> Opportunity {
        let hit = SpreadHit {
            symbol: "FOO".into(),
            market_type: MarketType::Spot,
            high_venue: "OKX".into(),
            high_price: 1.05,
            low_venue: "MEXC".into(),
            low_price: 1.0,
            spread_percent: 5.0,
            dex: with_dex.then(|| DexTokenData {
                price: 1.04,
                contract: "0xabc".into(),
                network: "BSC".into(),
                dex_url: "https://dexscreener.com/bsc/p".into(),
                liquidity_usd: 600_000.0,
            }),
        };
        let liquidity = LiquiditySnapshot {
            symbol: "FOO".into(),
            total_cex_volume_24h: 1_500_000.0,
            dex_liquidity_usd: 600_000.0,
            sufficient: true,
        };
        Opportunity::new(hit, liquidity, 1000.0)
    }

    #[test]
    fn test_render_includes_profit_and_venues() {
        let body = render_opportunity(&opportunity(false), None);
        assert!(body.contains("FOO"));
        assert!(body.contains("5.00%"));
        assert!(body.contains("MEXC"));
        assert!(body.contains("$50.00"));
        assert!(!body.contains("Contract"));
    }

    #[test]
    fn test_render_includes_dex_block_and_venue_info() {
        let info = DepositWithdrawInfo {
            max_volume: Some("900".into()),
            deposit_enabled: Some(true),
            withdraw_enabled: Some(false),
            withdraw_fee: None,
            chain: Some("BSC".into()),
        };
        let body = render_opportunity(&opportunity(true), Some(&info));
        assert!(body.contains("0xabc"));
        assert!(body.contains("Deposit: Enabled"));
        assert!(body.contains("Withdraw: Disabled"));
        assert!(body.contains("Max Volume: 900"));
    }
}
