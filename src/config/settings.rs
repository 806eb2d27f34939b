//! Runtime settings, loaded once at startup from environment variables.
//!
//! A malformed numeric value falls back to its default with a warning
//! rather than aborting — only structural problems (no venue configured
//! at all) are fatal, and that check happens when the exchange manager
//! is built.

use std::time::Duration;

use tracing::warn;

/// API credentials for one venue.
///
/// The passphrase is only used by venues that require one (OKX, KuCoin,
/// BitGet).
#[derive(Debug, Clone)]
pub struct VenueCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
}

impl VenueCredentials {
    /// Read `<PREFIX>_API_KEY` / `<PREFIX>_API_SECRET` (and optionally
    /// `<PREFIX>_API_PASSPHRASE`). Returns `None` unless both key and
    /// secret are present and non-empty — a venue without credentials is
    /// simply disabled.
    fn from_env(prefix: &str, needs_passphrase: bool) -> Option<Self> {
        let api_key = non_empty_env(&format!("{prefix}_API_KEY"))?;
        let api_secret = non_empty_env(&format!("{prefix}_API_SECRET"))?;
        let passphrase = non_empty_env(&format!("{prefix}_API_PASSPHRASE"));
        if needs_passphrase && passphrase.is_none() {
            warn!(venue = prefix, "credentials present but passphrase missing, venue disabled");
            return None;
        }
        Some(Self {
            api_key,
            api_secret,
            passphrase,
        })
    }
}

/// Telegram notifier configuration.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

/// All environment-sourced configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Spread threshold as a percentage (2.0 = 2%).
    pub arbitrage_threshold: f64,
    /// Symbols processed concurrently per batch.
    pub batch_size: usize,
    /// Seconds between full detection cycles.
    pub update_interval: Duration,
    /// Minimum aggregate 24h CEX volume in USD.
    pub min_cex_24h_volume: f64,
    /// Minimum DEX pool liquidity in USD.
    pub min_dex_liquidity: f64,
    /// Network retry attempts per adapter call.
    pub max_retries: u32,
    /// Base retry delay in seconds.
    pub retry_delay: Duration,
    /// Notional in USD used to estimate potential profit in alerts.
    pub trade_notional_usd: f64,

    pub telegram: Option<TelegramSettings>,

    pub mexc: Option<VenueCredentials>,
    pub okx: Option<VenueCredentials>,
    pub bitget: Option<VenueCredentials>,
    pub gateio: Option<VenueCredentials>,
    pub kucoin: Option<VenueCredentials>,
    pub bybit: Option<VenueCredentials>,
    pub binance: Option<VenueCredentials>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            arbitrage_threshold: float_env("ARBITRAGE_THRESHOLD", 2.0),
            batch_size: int_env("BATCH_SIZE", 10) as usize,
            update_interval: Duration::from_secs(int_env("UPDATE_INTERVAL", 30)),
            min_cex_24h_volume: float_env("MIN_CEX_24H_VOLUME", 1_000_000.0),
            min_dex_liquidity: float_env("MIN_DEX_LIQUIDITY", 500_000.0),
            max_retries: int_env("MAX_RETRIES", 3) as u32,
            retry_delay: Duration::from_secs(int_env("RETRY_DELAY", 5)),
            trade_notional_usd: float_env("TRADE_NOTIONAL_USD", 1_000.0),
            telegram: telegram_from_env(),
            mexc: VenueCredentials::from_env("MEXC", false),
            okx: VenueCredentials::from_env("OKX", true),
            bitget: VenueCredentials::from_env("BITGET", true),
            gateio: VenueCredentials::from_env("GATEIO", false),
            kucoin: VenueCredentials::from_env("KUCOIN", true),
            bybit: VenueCredentials::from_env("BYBIT", false),
            binance: VenueCredentials::from_env("BINANCE", false),
        }
    }
}

fn telegram_from_env() -> Option<TelegramSettings> {
    let bot_token = non_empty_env("TELEGRAM_BOT_TOKEN")?;
    let chat_id = non_empty_env("TELEGRAM_CHAT_ID")?;
    Some(TelegramSettings { bot_token, chat_id })
}

fn non_empty_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn float_env(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(v) => match v.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => parsed,
            _ => {
                warn!(key, value = %v, default, "invalid float in environment, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn int_env(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(v) => match v.trim().parse::<u64>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(key, value = %v, default, "invalid integer in environment, using default");
                default
            }
        },
        Err(_) => default,
    }
}
