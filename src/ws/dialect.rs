//! Per-venue wire dialects for the public ticker streams.
//!
//! Each venue speaks its own subscribe grammar and tick shape; this
//! module normalizes both so the manager can stay venue-agnostic.
//! Symbols at this seam are base symbols (`BTC`), always quoted in USDT.

use serde_json::{json, Value};

use crate::core::types::MarketType;

/// Stream endpoint for a venue and market, `None` when the venue has no
/// public stream for that market (KuCoin needs a token handshake and is
/// REST-only here; Binance futures likewise).
pub fn stream_url(venue: &str, market: MarketType) -> Option<String> {
    let url = match (venue, market) {
        ("mexc", MarketType::Spot) => "wss://wbs.mexc.com/ws",
        ("mexc", MarketType::Futures) => "wss://contract.mexc.com/ws",
        ("okx", _) => "wss://ws.okx.com:8443/ws/v5/public",
        ("gateio", MarketType::Spot) => "wss://api.gateio.ws/ws/v4/",
        ("gateio", MarketType::Futures) => "wss://fx-ws.gateio.ws/v4/ws/usdt",
        ("bybit", MarketType::Spot) => "wss://stream.bybit.com/v5/public/spot",
        ("bybit", MarketType::Futures) => "wss://stream.bybit.com/v5/public/linear",
        ("bitget", MarketType::Spot) => "wss://ws.bitget.com/spot/v1/stream",
        ("bitget", MarketType::Futures) => "wss://ws.bitget.com/mix/v1/stream",
        ("binance", MarketType::Spot) => "wss://stream.binance.com:9443/ws",
        _ => return None,
    };
    Some(url.to_string())
}

pub fn subscribe_frame(venue: &str, market: MarketType, symbol: &str) -> Option<String> {
    frame(venue, market, symbol, true)
}

pub fn unsubscribe_frame(venue: &str, market: MarketType, symbol: &str) -> Option<String> {
    frame(venue, market, symbol, false)
}

fn frame(venue: &str, market: MarketType, symbol: &str, sub: bool) -> Option<String> {
    let msg = match (venue, market) {
        ("mexc", MarketType::Spot) => json!({
            "method": if sub { "SUBSCRIPTION" } else { "UNSUBSCRIPTION" },
            "params": [format!("spot@public.deals.v3.api@{symbol}USDT")],
        }),
        ("mexc", MarketType::Futures) => json!({
            "method": if sub { "sub.deal" } else { "unsub.deal" },
            "param": { "symbol": format!("{symbol}_USDT") },
        }),
        ("okx", MarketType::Spot) => json!({
            "op": if sub { "subscribe" } else { "unsubscribe" },
            "args": [{ "channel": "tickers", "instId": format!("{symbol}-USDT") }],
        }),
        ("okx", MarketType::Futures) => json!({
            "op": if sub { "subscribe" } else { "unsubscribe" },
            "args": [{ "channel": "tickers", "instId": format!("{symbol}-USDT-SWAP") }],
        }),
        ("gateio", MarketType::Spot) => json!({
            "time": chrono::Utc::now().timestamp(),
            "channel": "spot.tickers",
            "event": if sub { "subscribe" } else { "unsubscribe" },
            "payload": [format!("{symbol}_USDT")],
        }),
        ("gateio", MarketType::Futures) => json!({
            "time": chrono::Utc::now().timestamp(),
            "channel": "futures.tickers",
            "event": if sub { "subscribe" } else { "unsubscribe" },
            "payload": [format!("{symbol}_USDT")],
        }),
        ("bybit", _) => json!({
            "op": if sub { "subscribe" } else { "unsubscribe" },
            "args": [format!("tickers.{symbol}USDT")],
        }),
        ("bitget", MarketType::Spot) => json!({
            "op": if sub { "subscribe" } else { "unsubscribe" },
            "args": [{ "instType": "sp", "channel": "ticker", "instId": format!("{symbol}USDT") }],
        }),
        ("bitget", MarketType::Futures) => json!({
            "op": if sub { "subscribe" } else { "unsubscribe" },
            "args": [{ "instType": "mc", "channel": "ticker", "instId": format!("{symbol}USDT_UMCBL") }],
        }),
        ("binance", MarketType::Spot) => json!({
            "method": if sub { "SUBSCRIBE" } else { "UNSUBSCRIBE" },
            "params": [format!("{}usdt@ticker", symbol.to_lowercase())],
            "id": 1,
        }),
        _ => return None,
    };
    Some(msg.to_string())
}

/// Demux one inbound text frame to `(base_symbol, price)`.
///
/// Non-tick frames (acks, pings, heartbeats) and zero prices yield `None`.
pub fn parse_tick(venue: &str, market: MarketType, text: &str) -> Option<(String, f64)> {
    let v: Value = serde_json::from_str(text).ok()?;
    let (raw_symbol, price) = match (venue, market) {
        ("mexc", MarketType::Spot) => {
            v.get("c")?.as_str().filter(|c| c.contains("deals"))?;
            (v.get("s")?.as_str()?.to_string(), num(v.get("p")?)?)
        }
        ("mexc", MarketType::Futures) => (
            v.get("symbol")?.as_str()?.to_string(),
            num(v.get("data")?.get("lastPrice").or(v.get("data")?.get("p"))?)?,
        ),
        ("okx", _) => {
            let tick = v.get("data")?.as_array()?.first()?;
            (
                tick.get("instId")?.as_str()?.to_string(),
                num(tick.get("last")?)?,
            )
        }
        ("gateio", MarketType::Spot) => {
            let result = v.get("result")?;
            (
                result.get("currency_pair")?.as_str()?.to_string(),
                num(result.get("last")?)?,
            )
        }
        ("gateio", MarketType::Futures) => {
            let result = v.get("result")?;
            (
                result.get("contract")?.as_str()?.to_string(),
                num(result.get("last")?)?,
            )
        }
        ("bybit", _) => {
            v.get("topic")?.as_str().filter(|t| t.starts_with("tickers."))?;
            let data = v.get("data")?;
            (
                data.get("symbol")?.as_str()?.to_string(),
                num(data.get("lastPrice")?)?,
            )
        }
        ("bitget", m) => {
            let inst_id = v.get("arg")?.get("instId")?.as_str()?.to_string();
            let tick = v.get("data")?.as_array()?.first()?;
            let price = match m {
                MarketType::Spot => num(tick.get("close")?)?,
                MarketType::Futures => num(tick.get("last")?)?,
            };
            (inst_id, price)
        }
        ("binance", MarketType::Spot) => {
            (v.get("s")?.as_str()?.to_string(), num(v.get("c")?)?)
        }
        _ => return None,
    };

    if price <= 0.0 || !price.is_finite() {
        return None;
    }
    Some((base_symbol(&raw_symbol), price))
}

fn num(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Strip venue decoration back to the base symbol.
fn base_symbol(raw: &str) -> String {
    raw.trim_end_matches("_UMCBL")
        .trim_end_matches("-SWAP")
        .trim_end_matches("-USDT")
        .trim_end_matches("_USDT")
        .trim_end_matches("USDT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_symbol_strips_venue_decoration() {
        assert_eq!(base_symbol("BTCUSDT"), "BTC");
        assert_eq!(base_symbol("BTC_USDT"), "BTC");
        assert_eq!(base_symbol("BTC-USDT"), "BTC");
        assert_eq!(base_symbol("BTC-USDT-SWAP"), "BTC");
        assert_eq!(base_symbol("BTCUSDT_UMCBL"), "BTC");
    }

    #[test]
    fn test_okx_tick() {
        let text = r#"{"arg":{"channel":"tickers","instId":"FOO-USDT-SWAP"},
                       "data":[{"instId":"FOO-USDT-SWAP","last":"2.5"}]}"#;
        assert_eq!(
            parse_tick("okx", MarketType::Futures, text),
            Some(("FOO".into(), 2.5))
        );
    }

    #[test]
    fn test_bybit_tick_and_ack() {
        let tick = r#"{"topic":"tickers.FOOUSDT","data":{"symbol":"FOOUSDT","lastPrice":"1.25"}}"#;
        assert_eq!(
            parse_tick("bybit", MarketType::Spot, tick),
            Some(("FOO".into(), 1.25))
        );
        let ack = r#"{"op":"subscribe","success":true}"#;
        assert_eq!(parse_tick("bybit", MarketType::Spot, ack), None);
    }

    #[test]
    fn test_gateio_spot_tick() {
        let text = r#"{"channel":"spot.tickers","event":"update",
                       "result":{"currency_pair":"FOO_USDT","last":"0.33"}}"#;
        assert_eq!(
            parse_tick("gateio", MarketType::Spot, text),
            Some(("FOO".into(), 0.33))
        );
    }

    #[test]
    fn test_binance_tick_ignores_zero_price() {
        let text = r#"{"s":"FOOUSDT","c":"0"}"#;
        assert_eq!(parse_tick("binance", MarketType::Spot, text), None);
    }

    #[test]
    fn test_subscribe_frames_per_venue() {
        let f = subscribe_frame("bybit", MarketType::Futures, "FOO").unwrap();
        assert!(f.contains("tickers.FOOUSDT"));
        let f = subscribe_frame("okx", MarketType::Spot, "FOO").unwrap();
        assert!(f.contains("FOO-USDT"));
        let f = subscribe_frame("mexc", MarketType::Futures, "FOO").unwrap();
        assert!(f.contains("sub.deal") && f.contains("FOO_USDT"));
        assert!(subscribe_frame("kucoin", MarketType::Spot, "FOO").is_none());
    }

    #[test]
    fn test_unsubscribe_frame_mirrors_subscribe() {
        let f = unsubscribe_frame("binance", MarketType::Spot, "FOO").unwrap();
        assert!(f.contains("UNSUBSCRIBE") && f.contains("foousdt@ticker"));
    }

    #[test]
    fn test_stream_urls() {
        assert!(stream_url("bybit", MarketType::Spot).unwrap().contains("spot"));
        assert!(stream_url("bybit", MarketType::Futures).unwrap().contains("linear"));
        assert!(stream_url("binance", MarketType::Futures).is_none());
        assert!(stream_url("kucoin", MarketType::Spot).is_none());
    }
}
