use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OHLCV candlestick, one per interval.
///
/// Series fetched from the exchange are ordered newest-first; every
/// consumer in this crate (indicators, oracle summaries) expects that
/// ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub market: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Everything known about one candidate pair at scan time.
/// Rebuilt from scratch on every scan; never persisted.
#[derive(Debug, Clone)]
pub struct PairSnapshot {
    pub market: String,
    pub display_name: String,
    /// Newest-first candle series.
    pub candles: Vec<Candle>,
    pub best_bid: f64,
    pub best_ask: f64,
    pub last_price: f64,
    /// Signed 24h change, in percent.
    pub change_rate_pct: f64,
    /// 24h traded value in the quote currency.
    pub volume_24h: f64,
}

impl PairSnapshot {
    /// Close prices, newest first.
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

/// The oracle's answer to "which pair, if any, should we trade?".
///
/// Low-confidence entries are normalized to `NoEntry` by the adapter, so
/// downstream code only ever sees tradeable verdicts here.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionVerdict {
    NoEntry {
        reason: String,
    },
    Entry {
        market: String,
        display_name: String,
        confidence: f64,
        reason: String,
        expected_return_pct: f64,
    },
}

/// Price targets for one trade on the selected pair.
///
/// `take_profit > buy_price > stop_loss` is expected but not enforced
/// here; the oracle is trusted for magnitudes and the state machine for
/// execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePlan {
    pub buy_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub analysis: String,
}

/// Lifecycle of a persisted trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Pending,
    BuySent,
    Bought,
    TakeProfit,
    StopLoss,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::BuySent => "BUY_SENT",
            TradeStatus::Bought => "BOUGHT",
            TradeStatus::TakeProfit => "TAKE_PROFIT",
            TradeStatus::StopLoss => "STOP_LOSS",
            TradeStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(TradeStatus::Pending),
            "BUY_SENT" => Some(TradeStatus::BuySent),
            "BOUGHT" => Some(TradeStatus::Bought),
            "TAKE_PROFIT" => Some(TradeStatus::TakeProfit),
            "STOP_LOSS" => Some(TradeStatus::StopLoss),
            "CLOSED" => Some(TradeStatus::Closed),
            _ => None,
        }
    }
}

/// Persisted record of one trade, created at `Pending` and mutated at
/// each transition. Retention is the store's concern; the core never
/// deletes these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub market: String,
    pub status: TradeStatus,
    pub plan_buy_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub analysis: String,
    pub buy_order_id: Option<String>,
    pub buy_price: Option<f64>,
    pub buy_volume: Option<f64>,
    pub bought_at: Option<DateTime<Utc>>,
    pub sell_order_id: Option<String>,
    pub sell_price: Option<f64>,
    pub profit_rate: Option<f64>,
    pub profit_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    pub fn new(market: String, plan: &TradePlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            market,
            status: TradeStatus::Pending,
            plan_buy_price: plan.buy_price,
            take_profit: plan.take_profit,
            stop_loss: plan.stop_loss,
            analysis: plan.analysis.clone(),
            buy_order_id: None,
            buy_price: None,
            buy_volume: None,
            bought_at: None,
            sell_order_id: None,
            sell_price: None,
            profit_rate: None,
            profit_amount: None,
            created_at: Utc::now(),
            closed_at: None,
        }
    }
}

/// How a single trade ended, as seen by the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeOutcome {
    TakeProfit { profit_rate: f64 },
    StopLoss { profit_rate: f64 },
    /// Anything that aborted the trade sequence. Profit rate is zero.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_record_starts_pending() {
        let plan = TradePlan {
            buy_price: 100.0,
            take_profit: 103.0,
            stop_loss: 98.0,
            analysis: "range break".to_string(),
        };
        let record = TradeRecord::new("KRW-BTC".to_string(), &plan);

        assert_eq!(record.status, TradeStatus::Pending);
        assert_eq!(record.plan_buy_price, 100.0);
        assert!(record.buy_order_id.is_none());
        assert!(record.closed_at.is_none());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TradeStatus::Pending,
            TradeStatus::BuySent,
            TradeStatus::Bought,
            TradeStatus::TakeProfit,
            TradeStatus::StopLoss,
            TradeStatus::Closed,
        ] {
            assert_eq!(TradeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TradeStatus::parse("OPEN"), None);
    }
}
