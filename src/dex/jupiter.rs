//! Jupiter swap-quote client for Solana mints.
//!
//! Prices are derived by quoting a swap into USDC. With the default
//! amount of one whole token unit, the USDC out-amount is the price.

use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::adapters::RestClient;

const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
const USDC_DECIMALS_FACTOR: f64 = 1_000_000.0;
const RATE_KEY: &str = "default_market";

pub struct Jupiter {
    rest: RestClient,
    base: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    out_amount: Option<String>,
}

impl Jupiter {
    pub fn new(rest: RestClient) -> Self {
        Self::with_base(rest, "https://api.jup.ag".into())
    }

    pub(crate) fn with_base(rest: RestClient, base: String) -> Self {
        Self { rest, base }
    }

    /// Quote `amount` smallest units of `mint` against USDC and return
    /// the implied USD price, or `None` when the route cannot be quoted.
    pub async fn quote_price(&self, mint: &str, amount: u64) -> Option<f64> {
        let url = format!("{}/swap/v1/quote", self.base);
        let amount_str = amount.to_string();
        let quote: Option<QuoteResponse> = match self
            .rest
            .get_json(
                RATE_KEY,
                &url,
                &[
                    ("inputMint", mint),
                    ("outputMint", USDC_MINT),
                    ("amount", amount_str.as_str()),
                    ("slippageBps", "50"),
                    ("restrictIntermediateTokens", "true"),
                ],
                HeaderMap::new(),
            )
            .await
        {
            Ok(q) => q,
            Err(err) => {
                warn!(%mint, %err, "Jupiter quote failed");
                return None;
            }
        };

        let price = quote?
            .out_amount?
            .parse::<f64>()
            .ok()
            .map(|out| out / USDC_DECIMALS_FACTOR)
            .filter(|p| *p > 0.0)?;
        debug!(%mint, price, "Jupiter quote");
        Some(price)
    }

    pub async fn close(&self) {
        debug!("Jupiter client closed");
    }
}
