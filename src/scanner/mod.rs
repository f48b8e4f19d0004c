// Market scanner: narrows the full instrument list down to a handful of
// volatile candidates and builds per-pair snapshots for the oracle.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::Config;
use crate::exchange::{Exchange, MarketInfo};
use crate::models::PairSnapshot;
use crate::Result;

pub struct MarketScanner {
    exchange: Arc<dyn Exchange>,
    quote_prefix: String,
    fallback_top_n: usize,
    min_volatility_pct: f64,
    candle_unit: u32,
    candle_count: u32,
}

impl MarketScanner {
    pub fn new(exchange: Arc<dyn Exchange>, cfg: &Config) -> Self {
        Self {
            exchange,
            quote_prefix: format!("{}-", cfg.quote_currency),
            fallback_top_n: cfg.fallback_top_n,
            min_volatility_pct: cfg.min_volatility_pct,
            candle_unit: cfg.candle_unit,
            candle_count: cfg.candle_count,
        }
    }

    /// Candidate pairs, ordered, possibly empty.
    ///
    /// Primary filter: instruments the exchange itself flags as warning or
    /// caution markets. When none are flagged, fall back to the top-N by
    /// listing order whose |24h change| clears the volatility threshold.
    /// An empty result is a normal answer; callers defer the scan.
    pub async fn scan(&self) -> Result<Vec<MarketInfo>> {
        let all = self.exchange.markets().await?;
        let quote: Vec<MarketInfo> = all
            .into_iter()
            .filter(|m| m.market.starts_with(&self.quote_prefix))
            .collect();

        let flagged: Vec<MarketInfo> = quote.iter().filter(|m| m.is_flagged()).cloned().collect();
        if !flagged.is_empty() {
            tracing::info!(count = flagged.len(), "Scan: using exchange-flagged markets");
            return Ok(flagged);
        }

        // Fallback: volatility screen over the head of the listing
        let top: Vec<MarketInfo> = quote.into_iter().take(self.fallback_top_n).collect();
        let codes: Vec<String> = top.iter().map(|m| m.market.clone()).collect();
        let tickers = self.exchange.tickers(&codes).await?;

        let candidates: Vec<MarketInfo> = top
            .into_iter()
            .filter(|m| {
                tickers
                    .iter()
                    .find(|t| t.market == m.market)
                    .map(|t| (t.signed_change_rate * 100.0).abs() >= self.min_volatility_pct)
                    .unwrap_or(false)
            })
            .collect();

        tracing::info!(
            count = candidates.len(),
            threshold_pct = self.min_volatility_pct,
            "Scan: fallback volatility screen"
        );
        Ok(candidates)
    }

    /// Fetch candles, orderbook and ticker for each candidate, fanned out
    /// and joined. Pairs whose detail fetch fails are logged and dropped;
    /// input order is preserved for the survivors.
    pub async fn enrich(&self, markets: &[MarketInfo]) -> Vec<PairSnapshot> {
        let mut tasks: JoinSet<(usize, Result<PairSnapshot>)> = JoinSet::new();

        for (idx, market) in markets.iter().enumerate() {
            let exchange = self.exchange.clone();
            let market = market.clone();
            let (unit, count) = (self.candle_unit, self.candle_count);

            tasks.spawn(async move {
                let result = fetch_snapshot(exchange, &market, unit, count).await;
                (idx, result)
            });
        }

        let mut indexed: Vec<(usize, PairSnapshot)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(snapshot))) => indexed.push((idx, snapshot)),
                Ok((idx, Err(e))) => {
                    tracing::warn!(
                        market = %markets[idx].market,
                        error = %e,
                        "Dropping candidate: detail fetch failed"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "Snapshot task panicked"),
            }
        }

        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, s)| s).collect()
    }
}

async fn fetch_snapshot(
    exchange: Arc<dyn Exchange>,
    market: &MarketInfo,
    unit: u32,
    count: u32,
) -> Result<PairSnapshot> {
    let candles = exchange.minute_candles(&market.market, unit, count).await?;
    let book = exchange.orderbook(&market.market).await?;
    let tickers = exchange.tickers(&[market.market.clone()]).await?;
    let ticker = tickers
        .into_iter()
        .next()
        .ok_or_else(|| format!("No ticker for {}", market.market))?;

    Ok(PairSnapshot {
        market: market.market.clone(),
        display_name: market.display_name.clone(),
        candles,
        best_bid: book.best_bid,
        best_ask: book.best_ask,
        last_price: ticker.last_price,
        change_rate_pct: ticker.signed_change_rate * 100.0,
        volume_24h: ticker.acc_trade_value_24h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Order, OrderbookTop, Ticker};
    use crate::models::Candle;
    use async_trait::async_trait;

    struct StubExchange {
        markets: Vec<MarketInfo>,
        tickers: Vec<Ticker>,
    }

    #[async_trait]
    impl Exchange for StubExchange {
        async fn markets(&self) -> Result<Vec<MarketInfo>> {
            Ok(self.markets.clone())
        }
        async fn tickers(&self, markets: &[String]) -> Result<Vec<Ticker>> {
            Ok(self
                .tickers
                .iter()
                .filter(|t| markets.contains(&t.market))
                .cloned()
                .collect())
        }
        async fn orderbook(&self, _market: &str) -> Result<OrderbookTop> {
            Ok(OrderbookTop {
                best_bid: 99.0,
                best_ask: 100.0,
            })
        }
        async fn minute_candles(&self, market: &str, _u: u32, _c: u32) -> Result<Vec<Candle>> {
            if market == "KRW-BROKEN" {
                return Err("candle fetch failed".into());
            }
            Ok(Vec::new())
        }
        async fn last_price(&self, _market: &str) -> Result<f64> {
            Ok(100.0)
        }
        async fn place_limit_buy(&self, _m: &str, _p: f64, _v: f64) -> Result<Order> {
            unimplemented!("not used in scanner tests")
        }
        async fn place_market_buy(&self, _m: &str, _n: f64) -> Result<Order> {
            unimplemented!("not used in scanner tests")
        }
        async fn place_market_sell(&self, _m: &str, _v: f64) -> Result<Order> {
            unimplemented!("not used in scanner tests")
        }
        async fn order_status(&self, _id: &str) -> Result<Order> {
            unimplemented!("not used in scanner tests")
        }
        async fn cancel_order(&self, _id: &str) -> Result<Order> {
            unimplemented!("not used in scanner tests")
        }
    }

    fn market(code: &str, warning: bool, caution: bool) -> MarketInfo {
        MarketInfo {
            market: code.to_string(),
            display_name: code.to_string(),
            warning,
            caution,
        }
    }

    fn ticker(code: &str, change_rate: f64) -> Ticker {
        Ticker {
            market: code.to_string(),
            last_price: 100.0,
            signed_change_rate: change_rate,
            acc_trade_value_24h: 1_000_000.0,
        }
    }

    fn scanner(exchange: StubExchange) -> MarketScanner {
        let cfg = Config {
            min_volatility_pct: 5.0,
            fallback_top_n: 10,
            ..Config::from_env()
        };
        MarketScanner::new(Arc::new(exchange), &cfg)
    }

    #[tokio::test]
    async fn test_flagged_markets_win() {
        let exchange = StubExchange {
            markets: vec![
                market("KRW-AAA", false, false),
                market("KRW-BBB", true, false),
                market("BTC-CCC", true, false),
                market("KRW-DDD", false, true),
            ],
            tickers: vec![],
        };

        let candidates = scanner(exchange).scan().await.unwrap();
        let codes: Vec<&str> = candidates.iter().map(|m| m.market.as_str()).collect();
        // BTC-quoted market excluded even though flagged
        assert_eq!(codes, vec!["KRW-BBB", "KRW-DDD"]);
    }

    #[tokio::test]
    async fn test_fallback_volatility_screen() {
        let exchange = StubExchange {
            markets: vec![
                market("KRW-AAA", false, false),
                market("KRW-BBB", false, false),
                market("KRW-CCC", false, false),
            ],
            tickers: vec![
                ticker("KRW-AAA", 0.02),  // +2%, below threshold
                ticker("KRW-BBB", -0.08), // -8%, passes on magnitude
                ticker("KRW-CCC", 0.06),  // +6%
            ],
        };

        let candidates = scanner(exchange).scan().await.unwrap();
        let codes: Vec<&str> = candidates.iter().map(|m| m.market.as_str()).collect();
        assert_eq!(codes, vec!["KRW-BBB", "KRW-CCC"]);
    }

    #[tokio::test]
    async fn test_empty_scan_is_not_an_error() {
        let exchange = StubExchange {
            markets: vec![market("KRW-AAA", false, false)],
            tickers: vec![ticker("KRW-AAA", 0.001)],
        };

        let candidates = scanner(exchange).scan().await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_drops_failing_pair() {
        let exchange = StubExchange {
            markets: vec![],
            tickers: vec![ticker("KRW-AAA", 0.06), ticker("KRW-BROKEN", 0.09)],
        };
        let scanner = scanner(exchange);

        let snapshots = scanner
            .enrich(&[
                market("KRW-AAA", true, false),
                market("KRW-BROKEN", true, false),
            ])
            .await;

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].market, "KRW-AAA");
    }
}
