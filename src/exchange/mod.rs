// Exchange collaborator: instrument listing, market data and order flow.
// Signing and rate limiting live in the concrete client; everything else
// in the crate talks to the `Exchange` trait so tests can script fills.

pub mod signing;
pub mod upbit;

pub use upbit::UpbitClient;

use crate::models::Candle;
use crate::Result;
use async_trait::async_trait;

/// One listed instrument with the exchange's risk-flag metadata.
#[derive(Debug, Clone)]
pub struct MarketInfo {
    pub market: String,
    pub display_name: String,
    /// Flagged by the exchange as a warning (high-risk) market.
    pub warning: bool,
    /// Flagged by the exchange as a caution (high-volatility) market.
    pub caution: bool,
}

impl MarketInfo {
    pub fn is_flagged(&self) -> bool {
        self.warning || self.caution
    }
}

/// Latest ticker for one market.
#[derive(Debug, Clone)]
pub struct Ticker {
    pub market: String,
    pub last_price: f64,
    /// Signed 24h change as a fraction (0.05 = +5%).
    pub signed_change_rate: f64,
    /// 24h traded value in the quote currency.
    pub acc_trade_value_24h: f64,
}

/// Best bid/ask of the order book.
#[derive(Debug, Clone, Copy)]
pub struct OrderbookTop {
    pub best_bid: f64,
    pub best_ask: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    /// Resting, not fully filled.
    Wait,
    /// Fully filled.
    Done,
    /// Cancelled (possibly after partial fills).
    Cancel,
}

/// An order as reported by the exchange.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub state: OrderState,
    /// Limit price, when the order has one.
    pub price: Option<f64>,
    pub executed_volume: f64,
    /// Volume-weighted fill price, when any fills are reported.
    pub avg_fill_price: Option<f64>,
}

impl Order {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, OrderState::Done | OrderState::Cancel)
    }
}

/// Exchange capability consumed by the scanner, the trade engine and the
/// scheduler. Authentication and request pacing are the implementor's
/// responsibility.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// All listed instruments, in the exchange's default ordering.
    async fn markets(&self) -> Result<Vec<MarketInfo>>;

    /// Tickers for the given market codes, same order as requested.
    async fn tickers(&self, markets: &[String]) -> Result<Vec<Ticker>>;

    /// Top-of-book for one market.
    async fn orderbook(&self, market: &str) -> Result<OrderbookTop>;

    /// Newest-first minute candles.
    async fn minute_candles(&self, market: &str, unit: u32, count: u32) -> Result<Vec<Candle>>;

    /// Last traded price for one market.
    async fn last_price(&self, market: &str) -> Result<f64>;

    /// Place a limit buy of `volume` at `price`.
    async fn place_limit_buy(&self, market: &str, price: f64, volume: f64) -> Result<Order>;

    /// Place a market buy spending `notional` of the quote currency.
    async fn place_market_buy(&self, market: &str, notional: f64) -> Result<Order>;

    /// Place a market sell of `volume` of the base currency.
    async fn place_market_sell(&self, market: &str, volume: f64) -> Result<Order>;

    /// Look up an order by id.
    async fn order_status(&self, order_id: &str) -> Result<Order>;

    /// Cancel an order by id.
    async fn cancel_order(&self, order_id: &str) -> Result<Order>;
}
