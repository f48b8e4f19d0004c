// Cycle scheduler: the outer loop tying scanner, oracle, trade engine
// and circuit breaker together into repeating trading cycles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{sleep, Instant};

use crate::config::Config;
use crate::db::TradeStore;
use crate::exchange::Exchange;
use crate::mirror::TradeMirror;
use crate::models::{SelectionVerdict, TradeOutcome, TradePlan};
use crate::oracle::{DecisionOracle, PairSummary};
use crate::risk::{BreakerDecision, CircuitBreaker};
use crate::scanner::MarketScanner;
use crate::trade::{TradeEngine, TradeRequest};
use crate::Result;

pub struct CycleScheduler {
    scanner: MarketScanner,
    oracle: Arc<dyn DecisionOracle>,
    exchange: Arc<dyn Exchange>,
    engine: TradeEngine,
    mirror: Option<TradeMirror>,
    cfg: Config,
    running: Arc<AtomicBool>,
}

impl CycleScheduler {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        oracle: Arc<dyn DecisionOracle>,
        store: Option<Arc<TradeStore>>,
        mirror: Option<TradeMirror>,
        cfg: Config,
        running: Arc<AtomicBool>,
    ) -> Self {
        let scanner = MarketScanner::new(exchange.clone(), &cfg);
        let engine = TradeEngine::new(exchange.clone(), store, &cfg);
        Self {
            scanner,
            oracle,
            exchange,
            engine,
            mirror,
            cfg,
            running,
        }
    }

    /// Main loop. Runs scan cycles until the running flag is cleared.
    /// Cycle-level errors are logged and answered with a backoff sleep;
    /// the loop itself never gives up.
    pub async fn run(&mut self) {
        tracing::info!(
            cycle_minutes = self.cfg.cycle_duration.as_secs() / 60,
            capital = self.cfg.capital,
            "Scheduler started"
        );

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.run_scan_cycle().await {
                tracing::error!(error = %e, "Cycle failed, backing off");
                sleep(self.cfg.error_backoff).await;
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// One full cycle: scan, enrich, ask the oracle for a pair, then trade
    /// it for the rest of the cycle window.
    pub async fn run_scan_cycle(&mut self) -> Result<()> {
        let candidates = self.scanner.scan().await?;
        if candidates.is_empty() {
            tracing::info!(
                retry_secs = self.cfg.scan_retry_interval.as_secs(),
                "No candidates, deferring scan"
            );
            sleep(self.cfg.scan_retry_interval).await;
            return Ok(());
        }

        let snapshots = self.scanner.enrich(&candidates).await;
        if snapshots.is_empty() {
            tracing::warn!("All candidates dropped during enrichment, deferring scan");
            sleep(self.cfg.scan_retry_interval).await;
            return Ok(());
        }

        let summaries: Vec<PairSummary> =
            snapshots.iter().map(PairSummary::from_snapshot).collect();

        match self.oracle.select_pair(&summaries).await? {
            SelectionVerdict::NoEntry { reason } => {
                tracing::info!(reason, "Oracle declined to enter, sleeping out the cycle");
                sleep(self.cfg.cycle_duration).await;
            }
            SelectionVerdict::Entry {
                market,
                display_name,
                confidence,
                reason,
                expected_return_pct,
            } => {
                tracing::info!(
                    market,
                    display_name,
                    confidence,
                    expected_return_pct,
                    reason,
                    "Oracle selected a pair"
                );
                self.run_episode(&market).await;
            }
        }

        Ok(())
    }

    /// Trade the selected pair repeatedly until the cycle window closes,
    /// the circuit breaker trips, or a trade errors out.
    async fn run_episode(&mut self, market: &str) {
        let mut breaker = CircuitBreaker::new(self.cfg.max_consecutive_losses);
        let started = Instant::now();

        tracing::info!(market, "Trade episode started");

        while started.elapsed() < self.cfg.cycle_duration && self.running.load(Ordering::SeqCst) {
            let outcome = self.run_one_trade(market).await;

            match breaker.apply(&outcome) {
                BreakerDecision::Continue => sleep(self.cfg.trade_pause).await,
                BreakerDecision::Suspend => {
                    tracing::warn!(market, "Episode suspended for the rest of the cycle");
                    sleep(self.cfg.cycle_duration).await;
                    return;
                }
                BreakerDecision::EndEpisode => {
                    tracing::warn!(market, "Episode ended after trade error");
                    return;
                }
            }
        }

        tracing::info!(market, "Trade episode finished, rescanning");
    }

    async fn run_one_trade(&mut self, market: &str) -> TradeOutcome {
        let plan = match self.fetch_plan(market).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(market, error = %e, "Failed to obtain a trade plan");
                return TradeOutcome::Error;
            }
        };

        let request = TradeRequest {
            market: market.to_string(),
            plan,
            capital: self.cfg.capital,
        };
        let (outcome, record) = self.engine.execute(request).await;

        if let Some(mirror) = &mut self.mirror {
            if record.closed_at.is_some() {
                if let Err(e) = mirror.append(&record).await {
                    tracing::warn!(trade_id = %record.id, error = %e, "Trade mirror write failed");
                }
            }
        }

        outcome
    }

    /// Fresh market data plus the oracle's price targets for one trade.
    async fn fetch_plan(&self, market: &str) -> Result<TradePlan> {
        let candles = self
            .exchange
            .minute_candles(market, self.cfg.candle_unit, self.cfg.candle_count)
            .await?;
        let book = self.exchange.orderbook(market).await?;
        let plan = self.oracle.plan_prices(market, &candles, book).await?;
        Ok(plan)
    }
}
