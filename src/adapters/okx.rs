//! OKX adapter.
//!
//! Spot instruments are `BTC-USDT`, perpetual swaps `BTC-USDT-SWAP`.
//! Private endpoints use the OK-ACCESS header scheme with a base64
//! HMAC-SHA256 signature over `timestamp + method + path`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::adapters::errors::ExchangeResult;
use crate::adapters::rest::RestClient;
use crate::adapters::{parse_price, pick_chain, Cex, DepositWithdrawInfo};
use crate::config::VenueCredentials;

const MARKET_KEY: &str = "okx_market";
const PRIVATE_KEY: &str = "okx_private";

pub struct Okx {
    creds: VenueCredentials,
    rest: RestClient,
    base: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

impl<T> Envelope<T> {
    fn ok_data(self) -> Vec<T> {
        if self.code == "0" {
            self.data
        } else {
            Vec::new()
        }
    }
}

#[derive(Debug, Deserialize)]
struct Ticker {
    #[serde(default)]
    last: String,
    #[serde(rename = "volCcy24h", default)]
    vol_ccy_24h: String,
}

#[derive(Debug, Deserialize)]
struct MarkPrice {
    #[serde(rename = "markPx", default)]
    mark_px: String,
}

#[derive(Debug, Deserialize)]
struct Instrument {
    #[serde(rename = "instId", default)]
    inst_id: String,
}

/// One entry per currency×chain, e.g. `{"ccy":"USDT","chain":"USDT-BSC"}`.
#[derive(Debug, Deserialize)]
struct Currency {
    #[serde(default)]
    ccy: String,
    #[serde(default)]
    chain: String,
    #[serde(rename = "canDep", default)]
    can_dep: bool,
    #[serde(rename = "canWd", default)]
    can_wd: bool,
    #[serde(rename = "maxWd", default)]
    max_wd: Option<String>,
    #[serde(rename = "minFee", default)]
    min_fee: Option<String>,
}

impl Okx {
    pub fn new(creds: VenueCredentials, rest: RestClient) -> Self {
        Self::with_base(creds, rest, "https://www.okx.com".into())
    }

    pub(crate) fn with_base(creds: VenueCredentials, rest: RestClient, base: String) -> Self {
        Self { creds, rest, base }
    }

    fn spot_inst(symbol: &str) -> String {
        format!("{symbol}-USDT")
    }

    fn swap_inst(symbol: &str) -> String {
        format!("{symbol}-USDT-SWAP")
    }

    fn signed_headers(&self, method: &str, request_path: &str) -> HeaderMap {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        let message = format!("{timestamp}{method}{request_path}");
        let mut mac = Hmac::<Sha256>::new_from_slice(self.creds.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(message.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        let mut put = |name: &'static str, value: &str| {
            if let Ok(v) = HeaderValue::from_str(value) {
                headers.insert(name, v);
            }
        };
        put("OK-ACCESS-KEY", &self.creds.api_key);
        put("OK-ACCESS-SIGN", &signature);
        put("OK-ACCESS-TIMESTAMP", &timestamp);
        put(
            "OK-ACCESS-PASSPHRASE",
            self.creds.passphrase.as_deref().unwrap_or_default(),
        );
        headers
    }

    async fn instruments(&self, inst_type: &str, suffix: &str) -> ExchangeResult<Vec<String>> {
        let url = format!("{}/api/v5/public/instruments", self.base);
        let body: Option<Envelope<Instrument>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("instType", inst_type)], HeaderMap::new())
            .await?;
        let symbols = body
            .map(Envelope::ok_data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|i| i.inst_id.strip_suffix(suffix).map(str::to_string))
            .collect::<Vec<_>>();
        debug!(inst_type, count = symbols.len(), "OKX instruments");
        Ok(symbols)
    }
}

#[async_trait]
impl Cex for Okx {
    fn name(&self) -> &'static str {
        "OKX"
    }

    async fn spot_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let inst = Self::spot_inst(symbol);
        let url = format!("{}/api/v5/market/ticker", self.base);
        let body: Option<Envelope<Ticker>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("instId", inst.as_str())], HeaderMap::new())
            .await?;
        Ok(body
            .map(Envelope::ok_data)
            .unwrap_or_default()
            .first()
            .and_then(|t| parse_price(&t.last)))
    }

    async fn futures_price(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let inst = Self::swap_inst(symbol);
        let url = format!("{}/api/v5/public/mark-price", self.base);
        let body: Option<Envelope<MarkPrice>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("instId", inst.as_str())], HeaderMap::new())
            .await?;
        Ok(body
            .map(Envelope::ok_data)
            .unwrap_or_default()
            .first()
            .and_then(|t| parse_price(&t.mark_px)))
    }

    async fn spot_symbols(&self) -> ExchangeResult<Vec<String>> {
        self.instruments("SPOT", "-USDT").await
    }

    async fn futures_symbols(&self) -> ExchangeResult<Vec<String>> {
        self.instruments("SWAP", "-USDT-SWAP").await
    }

    async fn volume_24h(&self, symbol: &str) -> ExchangeResult<Option<f64>> {
        let inst = Self::spot_inst(symbol);
        let url = format!("{}/api/v5/market/ticker", self.base);
        let body: Option<Envelope<Ticker>> = self
            .rest
            .get_json(MARKET_KEY, &url, &[("instId", inst.as_str())], HeaderMap::new())
            .await?;
        // volCcy24h is already quoted in USDT for -USDT pairs.
        Ok(body
            .map(Envelope::ok_data)
            .unwrap_or_default()
            .first()
            .and_then(|t| t.vol_ccy_24h.parse::<f64>().ok())
            .filter(|v| *v > 0.0))
    }

    async fn deposit_withdraw_info(&self, symbol: &str) -> ExchangeResult<DepositWithdrawInfo> {
        let request_path = "/api/v5/asset/currencies";
        let headers = self.signed_headers("GET", request_path);
        let url = format!("{}{}", self.base, request_path);
        let body: Option<Envelope<Currency>> = self
            .rest
            .get_json(PRIVATE_KEY, &url, &[], headers)
            .await?;

        let entries: Vec<Currency> = body
            .map(Envelope::ok_data)
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c.ccy == symbol)
            .collect();

        let Some(entry) = pick_chain(
            &entries,
            |c| c.chain.to_uppercase().ends_with("BSC"),
            |c| c.can_dep,
        ) else {
            return Ok(DepositWithdrawInfo::default());
        };

        Ok(DepositWithdrawInfo {
            max_volume: entry.max_wd.clone(),
            deposit_enabled: Some(entry.can_dep),
            withdraw_enabled: Some(entry.can_wd),
            withdraw_fee: entry.min_fee.clone(),
            chain: Some(entry.chain.clone()),
        })
    }

    async fn close(&self) {
        debug!("OKX adapter closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rest::RetryPolicy;
    use crate::rate_limit::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter(server: &mockito::ServerGuard) -> Okx {
        let rest = RestClient::new(
            Arc::new(RateLimiter::new()),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        );
        Okx::with_base(
            VenueCredentials {
                api_key: "key".into(),
                api_secret: "secret".into(),
                passphrase: Some("pass".into()),
            },
            rest,
            server.url(),
        )
    }

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(Okx::spot_inst("FOO"), "FOO-USDT");
        assert_eq!(Okx::swap_inst("FOO"), "FOO-USDT-SWAP");
    }

    #[tokio::test]
    async fn test_futures_price_reads_mark_px() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v5/public/mark-price")
            .match_query(mockito::Matcher::UrlEncoded(
                "instId".into(),
                "FOO-USDT-SWAP".into(),
            ))
            .with_body(r#"{"code":"0","data":[{"markPx":"3.14"}]}"#)
            .create_async()
            .await;

        let price = adapter(&server).futures_price("FOO").await.unwrap();
        assert_eq!(price, Some(3.14));
    }

    #[tokio::test]
    async fn test_error_code_yields_no_data() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v5/market/ticker")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"code":"51001","msg":"Instrument ID does not exist","data":[]}"#)
            .create_async()
            .await;

        let price = adapter(&server).spot_price("NOPE").await.unwrap();
        assert!(price.is_none());
    }

    #[tokio::test]
    async fn test_deposit_withdraw_prefers_bsc_entry() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v5/asset/currencies")
            .match_header("OK-ACCESS-KEY", "key")
            .with_body(
                r#"{"code":"0","data":[
                    {"ccy":"FOO","chain":"FOO-ERC20","canDep":true,"canWd":true,"maxWd":"100","minFee":"5"},
                    {"ccy":"FOO","chain":"FOO-BSC","canDep":false,"canWd":true,"maxWd":"900","minFee":"0.1"},
                    {"ccy":"BAR","chain":"BAR-BSC","canDep":true,"canWd":true,"maxWd":"1","minFee":"1"}
                ]}"#,
            )
            .create_async()
            .await;

        let info = adapter(&server).deposit_withdraw_info("FOO").await.unwrap();
        assert_eq!(info.chain.as_deref(), Some("FOO-BSC"));
        assert_eq!(info.max_volume.as_deref(), Some("900"));
        assert_eq!(info.deposit_enabled, Some(false));
    }
}
