//! Best-effort persistence.
//!
//! Storage never blocks detection: every call logs its own failure and
//! returns, so a flaky backend costs history, not alerts.

pub mod supabase;

pub use supabase::{SupabaseConfig, SupabaseStore};

use async_trait::async_trait;

use crate::core::types::Opportunity;

/// Summary of persisted history, used in the startup notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryStats {
    pub total_opportunities: u64,
    pub avg_spread_percent: f64,
}

/// An executed (or attempted) two-leg trade. Kept for operators running
/// the detector alongside manual execution.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub token: String,
    pub buy_venue: String,
    pub buy_price: f64,
    pub sell_venue: String,
    pub sell_price: f64,
    pub amount: f64,
    pub profit_usd: f64,
    pub status: String,
    pub error: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn log_opportunity(&self, opp: &Opportunity);
    async fn log_trade(&self, trade: &TradeRecord);
    async fn log_price(&self, token: &str, venue: &str, market_type: &str, price: f64);
    async fn log_metric(&self, metric: &str, value: f64);
    async fn summary_stats(&self) -> Option<SummaryStats>;
    async fn close(&self);
}

/// Used when persistence is not configured.
pub struct NullStore;

#[async_trait]
impl Store for NullStore {
    async fn log_opportunity(&self, _opp: &Opportunity) {}
    async fn log_trade(&self, _trade: &TradeRecord) {}
    async fn log_price(&self, _token: &str, _venue: &str, _market_type: &str, _price: f64) {}
    async fn log_metric(&self, _metric: &str, _value: f64) {}
    async fn summary_stats(&self) -> Option<SummaryStats> {
        None
    }
    async fn close(&self) {}
}
