//! DexScreener search client.

use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapters::RestClient;

const RATE_KEY: &str = "dexscreener";

/// Best on-chain market found for a token symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct DexTokenData {
    pub price: f64,
    pub contract: String,
    pub network: String,
    pub dex_url: String,
    pub liquidity_usd: f64,
}

pub struct DexScreener {
    rest: RestClient,
    base: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pairs: Vec<Pair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    #[serde(default)]
    chain_id: String,
    #[serde(default)]
    pair_address: String,
    #[serde(default)]
    price_usd: Option<String>,
    base_token: Option<BaseToken>,
    liquidity: Option<Liquidity>,
}

#[derive(Debug, Deserialize)]
struct BaseToken {
    #[serde(default)]
    address: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct Liquidity {
    #[serde(default)]
    usd: f64,
}

impl Pair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().map(|l| l.usd).unwrap_or(0.0)
    }
}

impl DexScreener {
    pub fn new(rest: RestClient) -> Self {
        Self::with_base(rest, "https://api.dexscreener.com".into())
    }

    pub(crate) fn with_base(rest: RestClient, base: String) -> Self {
        Self { rest, base }
    }

    /// Search for a token by base symbol. Among pairs whose base symbol
    /// matches exactly (case-insensitive), the deepest pool wins.
    pub async fn search_token(&self, symbol: &str) -> Option<DexTokenData> {
        let url = format!("{}/latest/dex/search", self.base);
        let response: Option<SearchResponse> = match self
            .rest
            .get_json(RATE_KEY, &url, &[("q", symbol)], HeaderMap::new())
            .await
        {
            Ok(r) => r,
            Err(err) => {
                warn!(%symbol, %err, "DexScreener search failed");
                return None;
            }
        };

        let wanted = symbol.to_uppercase();
        let best = response?
            .pairs
            .into_iter()
            .filter(|p| {
                p.base_token
                    .as_ref()
                    .map(|b| b.symbol.to_uppercase() == wanted)
                    .unwrap_or(false)
            })
            .max_by(|a, b| {
                a.liquidity_usd()
                    .partial_cmp(&b.liquidity_usd())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;

        let price = best
            .price_usd
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| *p > 0.0)?;
        let base_token = best.base_token.as_ref()?;

        let data = DexTokenData {
            price,
            contract: base_token.address.clone(),
            network: best.chain_id.to_uppercase(),
            dex_url: format!(
                "https://dexscreener.com/{}/{}",
                best.chain_id.to_lowercase(),
                best.pair_address
            ),
            liquidity_usd: best.liquidity_usd(),
        };
        debug!(%symbol, price = data.price, liquidity = data.liquidity_usd, "DexScreener hit");
        Some(data)
    }

    pub async fn close(&self) {
        debug!("DexScreener client closed");
    }
}
