use std::num::NonZeroU32;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;

use crate::exchange::signing::build_jwt;
use crate::exchange::{Exchange, MarketInfo, Order, OrderState, OrderbookTop, Ticker};
use crate::models::Candle;
use crate::Result;

const UPBIT_API_BASE: &str = "https://api.upbit.com/v1";

/// Requests per second across all endpoints, kept under the exchange's
/// public rate limit. Every call waits on the limiter, which also paces
/// the concurrent candle fan-out during enrichment.
const REQUESTS_PER_SEC: u32 = 8;

/// REST client for the Upbit exchange.
///
/// Public market-data endpoints are unauthenticated; order endpoints are
/// signed with an HS256 JWT carrying a SHA512 hash of the query string.
pub struct UpbitClient {
    client: Client,
    access_key: String,
    secret_key: String,
    limiter: DefaultDirectRateLimiter,
    base_url: String,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct MarketRaw {
    market: String,
    korean_name: String,
    #[serde(default)]
    market_event: Option<MarketEventRaw>,
}

#[derive(Debug, Deserialize)]
struct MarketEventRaw {
    #[serde(default)]
    warning: bool,
    /// Map of caution categories to flags; any true value marks the market.
    #[serde(default)]
    caution: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TickerRaw {
    market: String,
    trade_price: f64,
    signed_change_rate: f64,
    acc_trade_price_24h: f64,
}

#[derive(Debug, Deserialize)]
struct OrderbookRaw {
    orderbook_units: Vec<OrderbookUnitRaw>,
}

#[derive(Debug, Deserialize)]
struct OrderbookUnitRaw {
    ask_price: f64,
    bid_price: f64,
}

#[derive(Debug, Deserialize)]
struct CandleRaw {
    market: String,
    /// Milliseconds since epoch.
    timestamp: i64,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    candle_acc_trade_volume: f64,
}

// Order-endpoint numbers arrive as JSON strings.
#[derive(Debug, Deserialize)]
struct OrderRaw {
    uuid: String,
    state: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    executed_volume: Option<String>,
    #[serde(default)]
    trades: Option<Vec<OrderTradeRaw>>,
}

#[derive(Debug, Deserialize)]
struct OrderTradeRaw {
    price: String,
    volume: String,
}

// ============== Conversions ==============

impl From<MarketRaw> for MarketInfo {
    fn from(raw: MarketRaw) -> Self {
        let (warning, caution) = match raw.market_event {
            Some(ev) => {
                let caution = ev
                    .caution
                    .as_ref()
                    .and_then(|v| v.as_object())
                    .map(|flags| flags.values().any(|v| v.as_bool() == Some(true)))
                    .unwrap_or(false);
                (ev.warning, caution)
            }
            None => (false, false),
        };
        MarketInfo {
            market: raw.market,
            display_name: raw.korean_name,
            warning,
            caution,
        }
    }
}

impl From<TickerRaw> for Ticker {
    fn from(raw: TickerRaw) -> Self {
        Ticker {
            market: raw.market,
            last_price: raw.trade_price,
            signed_change_rate: raw.signed_change_rate,
            acc_trade_value_24h: raw.acc_trade_price_24h,
        }
    }
}

impl From<CandleRaw> for Candle {
    fn from(raw: CandleRaw) -> Self {
        Candle {
            market: raw.market,
            timestamp: DateTime::<Utc>::from_timestamp_millis(raw.timestamp)
                .unwrap_or_else(Utc::now),
            open: raw.opening_price,
            high: raw.high_price,
            low: raw.low_price,
            close: raw.trade_price,
            volume: raw.candle_acc_trade_volume,
        }
    }
}

fn parse_num(field: Option<&String>) -> Option<f64> {
    field.and_then(|s| s.parse::<f64>().ok())
}

impl OrderRaw {
    fn into_order(self) -> Result<Order> {
        let state = match self.state.as_str() {
            "wait" | "watch" => OrderState::Wait,
            "done" => OrderState::Done,
            "cancel" => OrderState::Cancel,
            other => return Err(format!("Unknown order state: {}", other).into()),
        };

        // Volume-weighted average over reported fills, if any
        let avg_fill_price = self.trades.as_ref().and_then(|trades| {
            let mut value = 0.0;
            let mut volume = 0.0;
            for t in trades {
                let (p, v) = (t.price.parse::<f64>().ok()?, t.volume.parse::<f64>().ok()?);
                value += p * v;
                volume += v;
            }
            if volume > 0.0 {
                Some(value / volume)
            } else {
                None
            }
        });

        Ok(Order {
            id: self.uuid,
            state,
            price: parse_num(self.price.as_ref()),
            executed_volume: parse_num(self.executed_volume.as_ref()).unwrap_or(0.0),
            avg_fill_price,
        })
    }
}

// ============== Implementation ==============

impl UpbitClient {
    pub fn new(access_key: String, secret_key: String) -> Self {
        Self {
            client: Client::new(),
            access_key,
            secret_key,
            limiter: RateLimiter::direct(Quota::per_second(
                NonZeroU32::new(REQUESTS_PER_SEC).expect("nonzero rate"),
            )),
            base_url: UPBIT_API_BASE.to_string(),
        }
    }

    /// Point the client at a different host (HTTP-mock tests).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn get_public<T: serde::de::DeserializeOwned>(&self, path_and_query: &str) -> Result<T> {
        self.limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(format!("Upbit API error: {}", response.status()).into());
        }

        Ok(response.json().await?)
    }

    fn auth_header(&self, query: Option<&str>) -> Result<String> {
        let jwt = build_jwt(&self.access_key, &self.secret_key, query)?;
        Ok(format!("Bearer {}", jwt))
    }

    async fn post_order(&self, params: &[(&str, String)]) -> Result<Order> {
        self.limiter.until_ready().await;

        let query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let query = query.join("&");

        let body: serde_json::Map<String, serde_json::Value> = params
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
            .collect();

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .header("Authorization", self.auth_header(Some(&query))?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Upbit order error {}: {}", status, body).into());
        }

        let raw: OrderRaw = response.json().await?;
        raw.into_order()
    }
}

#[async_trait]
impl Exchange for UpbitClient {
    async fn markets(&self) -> Result<Vec<MarketInfo>> {
        let raw: Vec<MarketRaw> = self.get_public("/market/all?is_details=true").await?;
        Ok(raw.into_iter().map(MarketInfo::from).collect())
    }

    async fn tickers(&self, markets: &[String]) -> Result<Vec<Ticker>> {
        if markets.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<TickerRaw> = self
            .get_public(&format!("/ticker?markets={}", markets.join(",")))
            .await?;
        Ok(raw.into_iter().map(Ticker::from).collect())
    }

    async fn orderbook(&self, market: &str) -> Result<OrderbookTop> {
        let mut raw: Vec<OrderbookRaw> = self
            .get_public(&format!("/orderbook?markets={}", market))
            .await?;
        let book = raw.pop().ok_or("Empty orderbook response")?;
        let top = book
            .orderbook_units
            .first()
            .ok_or("Orderbook has no levels")?;
        Ok(OrderbookTop {
            best_bid: top.bid_price,
            best_ask: top.ask_price,
        })
    }

    async fn minute_candles(&self, market: &str, unit: u32, count: u32) -> Result<Vec<Candle>> {
        let raw: Vec<CandleRaw> = self
            .get_public(&format!(
                "/candles/minutes/{}?market={}&count={}",
                unit, market, count
            ))
            .await?;
        // Upbit already returns newest-first
        Ok(raw.into_iter().map(Candle::from).collect())
    }

    async fn last_price(&self, market: &str) -> Result<f64> {
        let tickers = self.tickers(&[market.to_string()]).await?;
        tickers
            .first()
            .map(|t| t.last_price)
            .ok_or_else(|| format!("No ticker for {}", market).into())
    }

    async fn place_limit_buy(&self, market: &str, price: f64, volume: f64) -> Result<Order> {
        self.post_order(&[
            ("market", market.to_string()),
            ("side", "bid".to_string()),
            ("ord_type", "limit".to_string()),
            ("price", format!("{}", price)),
            ("volume", format!("{}", volume)),
        ])
        .await
    }

    async fn place_market_buy(&self, market: &str, notional: f64) -> Result<Order> {
        self.post_order(&[
            ("market", market.to_string()),
            ("side", "bid".to_string()),
            ("ord_type", "price".to_string()),
            ("price", format!("{}", notional)),
        ])
        .await
    }

    async fn place_market_sell(&self, market: &str, volume: f64) -> Result<Order> {
        self.post_order(&[
            ("market", market.to_string()),
            ("side", "ask".to_string()),
            ("ord_type", "market".to_string()),
            ("volume", format!("{}", volume)),
        ])
        .await
    }

    async fn order_status(&self, order_id: &str) -> Result<Order> {
        self.limiter.until_ready().await;

        let query = format!("uuid={}", order_id);
        let response = self
            .client
            .get(format!("{}/order?{}", self.base_url, query))
            .header("Authorization", self.auth_header(Some(&query))?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Upbit order lookup error: {}", response.status()).into());
        }

        let raw: OrderRaw = response.json().await?;
        raw.into_order()
    }

    async fn cancel_order(&self, order_id: &str) -> Result<Order> {
        self.limiter.until_ready().await;

        let query = format!("uuid={}", order_id);
        let response = self
            .client
            .delete(format!("{}/order?{}", self.base_url, query))
            .header("Authorization", self.auth_header(Some(&query))?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Upbit cancel error: {}", response.status()).into());
        }

        let raw: OrderRaw = response.json().await?;
        raw.into_order()
    }
}
