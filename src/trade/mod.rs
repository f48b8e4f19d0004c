// Order execution engine. Walks a single trade through its lifecycle:
// limit buy, fill polling with a market-buy fallback, price monitoring,
// and market sell, persisting the record at each status change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep, Duration, Instant};

use crate::config::Config;
use crate::db::TradeStore;
use crate::exchange::{Exchange, Order, OrderState};
use crate::models::{TradeOutcome, TradePlan, TradeRecord, TradeStatus};
use crate::Result;

/// Repeating tick with an optional overall deadline.
///
/// `tick` sleeps one interval and reports whether the deadline has passed,
/// so polling loops read as `while timer.tick().await { ... }`.
pub struct PollTimer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl PollTimer {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn with_timeout(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Sleep one interval; false once the deadline has been reached.
    pub async fn tick(&mut self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return false;
            }
        }
        sleep(self.interval).await;
        match self.deadline {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

pub struct TradeRequest {
    pub market: String,
    pub plan: TradePlan,
    pub capital: f64,
}

pub struct TradeEngine {
    exchange: Arc<dyn Exchange>,
    store: Option<Arc<TradeStore>>,
    fee_rate: f64,
    buy_fill_timeout: Duration,
    fill_poll_interval: Duration,
    monitor_interval: Duration,
    settle_delay: Duration,
    confirm_retry_delay: Duration,
    /// Guards the one-position-at-a-time invariant.
    active: AtomicBool,
}

impl TradeEngine {
    pub fn new(exchange: Arc<dyn Exchange>, store: Option<Arc<TradeStore>>, cfg: &Config) -> Self {
        Self {
            exchange,
            store,
            fee_rate: cfg.fee_rate,
            buy_fill_timeout: cfg.buy_fill_timeout,
            fill_poll_interval: cfg.fill_poll_interval,
            monitor_interval: cfg.monitor_interval,
            settle_delay: cfg.settle_delay,
            confirm_retry_delay: cfg.confirm_retry_delay,
            active: AtomicBool::new(false),
        }
    }

    /// Run one trade to completion.
    ///
    /// Any error inside the trade is caught here and reported as
    /// `TradeOutcome::Error` together with the record as far as it got.
    /// Rejects (with an error outcome) if a trade is already running.
    pub async fn execute(&self, request: TradeRequest) -> (TradeOutcome, TradeRecord) {
        let mut record = TradeRecord::new(request.market.clone(), &request.plan);

        if self.active.swap(true, Ordering::SeqCst) {
            tracing::error!(market = %request.market, "Trade rejected: a position is already open");
            return (TradeOutcome::Error, record);
        }

        let outcome = match self.run_trade(&request, &mut record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    market = %request.market,
                    trade_id = %record.id,
                    error = %e,
                    "Trade failed"
                );
                TradeOutcome::Error
            }
        };

        self.active.store(false, Ordering::SeqCst);
        (outcome, record)
    }

    async fn run_trade(
        &self,
        request: &TradeRequest,
        record: &mut TradeRecord,
    ) -> Result<TradeOutcome> {
        let plan = &request.plan;
        self.persist(record).await;

        // Order volume leaves room for the buy-side fee
        let volume = request.capital * (1.0 - self.fee_rate) / plan.buy_price;

        tracing::info!(
            market = %request.market,
            buy_price = plan.buy_price,
            take_profit = plan.take_profit,
            stop_loss = plan.stop_loss,
            volume,
            "Placing limit buy"
        );

        let buy = self
            .exchange
            .place_limit_buy(&request.market, plan.buy_price, volume)
            .await?;
        record.buy_order_id = Some(buy.id.clone());
        record.status = TradeStatus::BuySent;
        self.persist(record).await;

        let filled = self.await_buy_fill(request, record, &buy.id).await?;
        record.buy_price = Some(filled.avg_fill_price.unwrap_or(plan.buy_price));
        record.buy_volume = Some(if filled.executed_volume > 0.0 {
            filled.executed_volume
        } else {
            volume
        });
        record.bought_at = Some(Utc::now());
        record.status = TradeStatus::Bought;
        self.persist(record).await;

        let buy_price = record.buy_price.unwrap_or(plan.buy_price);
        tracing::info!(
            market = %request.market,
            buy_price,
            volume = record.buy_volume,
            "Position open, monitoring"
        );

        let exit_price = self.monitor(request, buy_price).await?;
        record.status = if exit_price >= plan.take_profit {
            TradeStatus::TakeProfit
        } else {
            TradeStatus::StopLoss
        };
        self.persist(record).await;

        let sell_volume = record.buy_volume.unwrap_or(volume);
        let sell = self.sell_and_confirm(&request.market, sell_volume).await?;
        record.sell_order_id = Some(sell.id.clone());

        let sell_price = sell.avg_fill_price.unwrap_or(exit_price);
        let profit_rate = profit_rate_pct(buy_price, sell_price, self.fee_rate);
        record.sell_price = Some(sell_price);
        record.profit_rate = Some(profit_rate);
        record.profit_amount = Some(buy_price * sell_volume * profit_rate / 100.0);
        record.closed_at = Some(Utc::now());

        let outcome = if record.status == TradeStatus::TakeProfit {
            TradeOutcome::TakeProfit { profit_rate }
        } else {
            TradeOutcome::StopLoss { profit_rate }
        };

        record.status = TradeStatus::Closed;
        self.persist(record).await;

        tracing::info!(
            market = %request.market,
            buy_price,
            sell_price,
            profit_rate,
            "Trade closed"
        );

        Ok(outcome)
    }

    /// Poll the limit buy until it fills or the timeout expires. On timeout
    /// or cancellation, replace it with a market buy for the full capital.
    async fn await_buy_fill(
        &self,
        request: &TradeRequest,
        record: &mut TradeRecord,
        order_id: &str,
    ) -> Result<Order> {
        let mut timer = PollTimer::with_timeout(self.fill_poll_interval, self.buy_fill_timeout);
        while timer.tick().await {
            let order = self.exchange.order_status(order_id).await?;
            match order.state {
                OrderState::Done => return Ok(order),
                OrderState::Cancel => break,
                OrderState::Wait => {}
            }
        }

        tracing::info!(
            market = %request.market,
            order_id,
            "Limit buy did not fill, falling back to market buy"
        );

        // Cancel may race with a fill; a failure here is not fatal
        if let Err(e) = self.exchange.cancel_order(order_id).await {
            tracing::warn!(order_id, error = %e, "Cancel of stale limit buy failed");
        }

        let market_buy = self
            .exchange
            .place_market_buy(&request.market, request.capital)
            .await?;
        record.buy_order_id = Some(market_buy.id.clone());
        self.persist(record).await;

        sleep(self.settle_delay).await;
        self.exchange.order_status(&market_buy.id).await
    }

    /// Watch the last trade price until it crosses take-profit or stop-loss.
    /// Returns the price that triggered the exit.
    async fn monitor(&self, request: &TradeRequest, buy_price: f64) -> Result<f64> {
        let plan = &request.plan;
        let mut timer = PollTimer::every(self.monitor_interval);
        loop {
            timer.tick().await;
            let price = self.exchange.last_price(&request.market).await?;
            let unrealized_pct = (price - buy_price) / buy_price * 100.0;
            tracing::debug!(market = %request.market, price, unrealized_pct, "Monitor tick");

            if price >= plan.take_profit || price <= plan.stop_loss {
                return Ok(price);
            }
        }
    }

    /// Market-sell the position and wait for the fill to settle. If the
    /// order is still unconfirmed after a retry the last known state is
    /// returned; the exchange fills market sells, just not always promptly.
    async fn sell_and_confirm(&self, market: &str, volume: f64) -> Result<Order> {
        let sell = self.exchange.place_market_sell(market, volume).await?;

        sleep(self.settle_delay).await;
        let confirmed = self.exchange.order_status(&sell.id).await?;
        if confirmed.state == OrderState::Done {
            return Ok(confirmed);
        }

        tracing::warn!(market, order_id = %sell.id, "Sell not yet confirmed, retrying once");
        sleep(self.confirm_retry_delay).await;
        self.exchange.order_status(&sell.id).await
    }

    /// Persistence is best-effort mid-trade; a failed write must not abort
    /// a live position.
    async fn persist(&self, record: &TradeRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_trade(record).await {
                tracing::warn!(trade_id = %record.id, error = %e, "Trade record write failed");
            }
        }
    }
}

/// Net return in percent with taker fees on both legs.
pub fn profit_rate_pct(buy_price: f64, sell_price: f64, fee_rate: f64) -> f64 {
    let buy_fee = buy_price * fee_rate;
    let sell_fee = sell_price * fee_rate;
    (sell_price - buy_price - buy_fee - sell_fee) / buy_price * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profit_rate_with_both_leg_fees() {
        let rate = profit_rate_pct(100.0, 105.0, 0.0005);
        assert!((rate - 4.8975).abs() < 1e-9);
    }

    #[test]
    fn test_profit_rate_negative_on_loss() {
        let rate = profit_rate_pct(100.0, 98.0, 0.0005);
        assert!(rate < -2.0);
        // Fees push the loss below the raw -2%
        assert!((rate - (-2.099)).abs() < 1e-9);
    }

    #[test]
    fn test_flat_exit_still_pays_fees() {
        let rate = profit_rate_pct(100.0, 100.0, 0.0005);
        assert!((rate - (-0.1)).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timer_respects_deadline() {
        let mut timer =
            PollTimer::with_timeout(Duration::from_secs(1), Duration::from_secs(3));
        let mut ticks = 0;
        while timer.tick().await {
            ticks += 1;
            assert!(ticks < 100, "timer never expired");
        }
        assert_eq!(ticks, 2);
    }
}
