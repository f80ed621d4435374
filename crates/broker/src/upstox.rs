//! Upstox v2 REST client implementing the [`Broker`] capability.
//!
//! Instrument keys contain `|` (e.g. `NSE_INDEX|Nifty 50`) and must be
//! percent-encoded in path segments; quote responses sometimes echo the key
//! back with `:` instead, so lookups try both spellings.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Utc};
use optrade_core::config::UpstoxConfig;
use optrade_core::traits::Broker;
use optrade_core::types::{BrokerPosition, Candle, MarketQuote, OrderSide, OrderType};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{Result, UpstoxError};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Days of history requested so intraday gaps and holidays still leave
/// enough candles for the longest indicator window.
const CANDLE_HISTORY_DAYS: i64 = 5;

const ORDER_TAG: &str = "optrade";

#[derive(Debug, Clone)]
pub struct UpstoxClient {
    http: Client,
    base_url: Url,
    access_token: String,
    product: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CandlePayload {
    candles: Vec<RawCandle>,
}

/// Upstox candle arrays: [timestamp, open, high, low, close, volume, oi].
#[derive(Debug, Deserialize)]
struct RawCandle(
    DateTime<FixedOffset>,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    #[allow(dead_code)] Decimal,
);

#[derive(Debug, Deserialize)]
struct RawQuote {
    last_price: Decimal,
    #[serde(default)]
    depth: Option<RawDepth>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDepth {
    #[serde(default)]
    buy: Vec<RawDepthLevel>,
    #[serde(default)]
    sell: Vec<RawDepthLevel>,
}

#[derive(Debug, Deserialize)]
struct RawDepthLevel {
    price: Decimal,
    quantity: Decimal,
}

#[derive(Debug, Serialize)]
struct PlaceOrderRequest<'a> {
    quantity: i64,
    product: &'a str,
    validity: &'a str,
    price: Decimal,
    tag: &'a str,
    instrument_token: &'a str,
    order_type: String,
    transaction_type: String,
    disclosed_quantity: i64,
    trigger_price: Decimal,
    is_amo: bool,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderData {
    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    instrument_token: String,
    quantity: i64,
}

impl UpstoxClient {
    /// # Errors
    ///
    /// `Configuration` when the base URL is invalid or the access token is
    /// empty; transport construction failures surface as `Network`.
    pub fn new(cfg: &UpstoxConfig) -> Result<Self> {
        if cfg.access_token.is_empty() {
            return Err(UpstoxError::Configuration(
                "access token is empty; set OPTRADE_UPSTOX__ACCESS_TOKEN".to_string(),
            ));
        }
        let base_url = Url::parse(&cfg.api_url)
            .map_err(|e| UpstoxError::Configuration(format!("invalid api_url: {e}")))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url,
            access_token: cfg.access_token.clone(),
            product: cfg.product.clone(),
        })
    }

    /// Joins percent-encoded path segments onto the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|()| UpstoxError::Configuration("api_url cannot be a base".to_string()))?;
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<ApiResponse<T>> {
        debug!(url = %url, "GET");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .header("accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstoxError::api(status.as_u16(), body));
        }
        Ok(response.json().await?)
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<MarketQuote>> {
        let mut url = self.endpoint(&["market-quote", "quotes"])?;
        url.query_pairs_mut().append_pair("instrument_key", symbol);

        let resp: ApiResponse<HashMap<String, RawQuote>> = self.get_json(url).await?;
        let Some(mut data) = resp.data else {
            return Ok(None);
        };

        // The response key may use ':' where the request used '|'.
        let alt_key = symbol.replace('|', ":");
        let raw = data
            .remove(symbol)
            .or_else(|| data.remove(&alt_key))
            .or_else(|| {
                if data.len() == 1 {
                    data.into_values().next()
                } else {
                    None
                }
            });
        let Some(raw) = raw else {
            warn!(symbol, "quote response had no matching instrument");
            return Ok(None);
        };

        let depth = raw.depth.unwrap_or_default();
        let best_bid = depth.buy.first();
        let best_ask = depth.sell.first();
        Ok(Some(MarketQuote {
            symbol: symbol.to_string(),
            last_price: raw.last_price,
            bid_price: best_bid.map_or(Decimal::ZERO, |l| l.price),
            ask_price: best_ask.map_or(Decimal::ZERO, |l| l.price),
            bid_qty: best_bid.map_or(Decimal::ZERO, |l| l.quantity),
            ask_qty: best_ask.map_or(Decimal::ZERO, |l| l.quantity),
            timestamp: Utc::now(),
        }))
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let to_date = Utc::now().date_naive();
        let from_date = to_date - ChronoDuration::days(CANDLE_HISTORY_DAYS);
        let url = self.endpoint(&[
            "historical-candle",
            symbol,
            interval,
            &to_date.format("%Y-%m-%d").to_string(),
            &from_date.format("%Y-%m-%d").to_string(),
        ])?;

        let resp: ApiResponse<CandlePayload> = self.get_json(url).await?;
        if resp.status.as_deref() != Some("success") {
            warn!(symbol, status = ?resp.status, "candle response not successful");
            return Ok(Vec::new());
        }
        let Some(payload) = resp.data else {
            return Ok(Vec::new());
        };

        // Upstox returns newest-first; consumers need oldest-first.
        let mut candles: Vec<Candle> = payload
            .candles
            .into_iter()
            .map(|raw| Candle {
                timestamp: raw.0.with_timezone(&Utc),
                open: raw.1,
                high: raw.2,
                low: raw.3,
                close: raw.4,
                volume: raw.5,
            })
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > count {
            candles.drain(..candles.len() - count);
        }
        Ok(candles)
    }

    async fn submit_order(
        &self,
        symbol: &str,
        quantity: i64,
        side: OrderSide,
        order_type: OrderType,
    ) -> Result<Option<String>> {
        let url = self.endpoint(&["order", "place"])?;
        let payload = PlaceOrderRequest {
            quantity,
            product: &self.product,
            validity: "DAY",
            price: Decimal::ZERO,
            tag: ORDER_TAG,
            instrument_token: symbol,
            order_type: order_type.to_string(),
            transaction_type: side.to_string(),
            disclosed_quantity: 0,
            trigger_price: Decimal::ZERO,
            is_amo: false,
        };

        info!(symbol, quantity, side = %side, "placing order");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(symbol, status = status.as_u16(), body, "order placement failed");
            return Ok(None);
        }
        let resp: ApiResponse<PlaceOrderData> = response.json().await?;
        Ok(resp.data.and_then(|d| d.order_id))
    }

    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>> {
        let url = self.endpoint(&["portfolio", "get-positions"])?;
        let resp: ApiResponse<Vec<RawPosition>> = self.get_json(url).await?;
        Ok(resp
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|p| BrokerPosition {
                symbol: p.instrument_token,
                quantity: p.quantity,
            })
            .collect())
    }
}

#[async_trait]
impl Broker for UpstoxClient {
    async fn get_quote(&self, symbol: &str) -> anyhow::Result<Option<MarketQuote>> {
        Ok(self.fetch_quote(symbol).await?)
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        Ok(self.fetch_candles(symbol, interval, count).await?)
    }

    async fn place_order(
        &self,
        symbol: &str,
        quantity: i64,
        side: OrderSide,
        order_type: OrderType,
    ) -> anyhow::Result<Option<String>> {
        Ok(self.submit_order(symbol, quantity, side, order_type).await?)
    }

    async fn get_positions(&self) -> anyhow::Result<Vec<BrokerPosition>> {
        Ok(self.fetch_positions().await?)
    }

    async fn square_off_all(&self) -> anyhow::Result<()> {
        let positions = self.fetch_positions().await?;
        for pos in positions {
            if pos.quantity == 0 {
                continue;
            }
            let side = if pos.quantity > 0 {
                OrderSide::Sell
            } else {
                OrderSide::Buy
            };
            let placed = self
                .submit_order(&pos.symbol, pos.quantity.abs(), side, OrderType::Market)
                .await?;
            match placed {
                Some(order_id) => info!(symbol = %pos.symbol, order_id, "square-off order placed"),
                None => error!(symbol = %pos.symbol, "square-off order rejected"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> UpstoxClient {
        UpstoxClient::new(&UpstoxConfig {
            api_url: base_url.to_string(),
            access_token: "test-token".to_string(),
            product: "I".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn empty_token_is_a_configuration_error() {
        let err = UpstoxClient::new(&UpstoxConfig::default()).unwrap_err();
        assert!(matches!(err, UpstoxError::Configuration(_)));
    }

    #[tokio::test]
    async fn quote_lookup_tolerates_the_colon_key_variant() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/market-quote/quotes"))
            .and(query_param("instrument_key", "NSE_INDEX|Nifty 50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "NSE_INDEX:Nifty 50": {
                        "last_price": 24512.35,
                        "depth": {
                            "buy": [{"price": 24512.30, "quantity": 150}],
                            "sell": [{"price": 24512.40, "quantity": 90}]
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let quote = client(&server.uri())
            .fetch_quote("NSE_INDEX|Nifty 50")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(quote.last_price, dec!(24512.35));
        assert_eq!(quote.bid_qty, dec!(150));
        assert_eq!(quote.ask_qty, dec!(90));
    }

    #[tokio::test]
    async fn candles_come_back_oldest_first_and_trimmed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "candles": [
                        ["2025-08-29T09:17:00+05:30", 103.0, 104.0, 102.0, 103.5, 500, 0],
                        ["2025-08-29T09:16:00+05:30", 102.0, 103.0, 101.0, 102.5, 400, 0],
                        ["2025-08-29T09:15:00+05:30", 101.0, 102.0, 100.0, 101.5, 300, 0]
                    ]
                }
            })))
            .mount(&server)
            .await;

        let candles = client(&server.uri())
            .fetch_candles("NSE_INDEX|Nifty 50", "1minute", 2)
            .await
            .unwrap();
        assert_eq!(candles.len(), 2);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[1].close, dec!(103.5));
    }

    #[tokio::test]
    async fn rejected_order_returns_none_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/order/place"))
            .respond_with(ResponseTemplate::new(400).set_body_string("margin shortfall"))
            .mount(&server)
            .await;

        let placed = client(&server.uri())
            .submit_order("NSE_FO|12345", 50, OrderSide::Buy, OrderType::Market)
            .await
            .unwrap();
        assert_eq!(placed, None);
    }

    #[tokio::test]
    async fn server_error_on_quotes_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .fetch_quote("NSE_INDEX|Nifty 50")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
