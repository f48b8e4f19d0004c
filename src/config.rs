use std::time::Duration;

/// Runtime knobs, environment-driven with coded defaults.
///
/// The two positional CLI parameters (capital, cycle minutes) override
/// whatever this produces; everything else is env-only.
#[derive(Debug, Clone)]
pub struct Config {
    /// Quote currency markets are restricted to (e.g. "KRW").
    pub quote_currency: String,
    /// Minute-candle granularity fetched for enrichment and planning.
    pub candle_unit: u32,
    pub candle_count: u32,
    /// Fallback scan: how many instruments (listing order) to consider.
    pub fallback_top_n: usize,
    /// Fallback scan: minimum |24h change| in percent.
    pub min_volatility_pct: f64,
    /// Capital allocated to each trade, in the quote currency.
    pub capital: f64,
    /// Upper bound on one pair-selection episode.
    pub cycle_duration: Duration,
    /// Taker fee per leg, as a fraction.
    pub fee_rate: f64,
    /// How long a limit buy may rest before the market-buy fallback.
    pub buy_fill_timeout: Duration,
    pub fill_poll_interval: Duration,
    pub monitor_interval: Duration,
    /// Wait before reading a market order's fill.
    pub settle_delay: Duration,
    /// Longer second wait when a sell has not confirmed.
    pub confirm_retry_delay: Duration,
    /// Pause between trades within one episode.
    pub trade_pause: Duration,
    /// Sleep when a scan finds no candidates.
    pub scan_retry_interval: Duration,
    /// Backoff after an uncaught per-scan error.
    pub error_backoff: Duration,
    /// Consecutive stop-losses that suspend the episode.
    pub max_consecutive_losses: u32,
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            quote_currency: std::env::var("SCALP_QUOTE").unwrap_or_else(|_| "KRW".to_string()),
            candle_unit: env_u64("SCALP_CANDLE_UNIT", 1) as u32,
            candle_count: env_u64("SCALP_CANDLE_COUNT", 30) as u32,
            fallback_top_n: env_u64("SCALP_FALLBACK_TOP_N", 30) as usize,
            min_volatility_pct: env_f64("SCALP_MIN_VOLATILITY_PCT", 5.0),
            capital: env_f64("SCALP_CAPITAL", 100_000.0),
            cycle_duration: Duration::from_secs(env_u64("SCALP_CYCLE_MINUTES", 60) * 60),
            fee_rate: env_f64("SCALP_FEE_RATE", 0.0005),
            buy_fill_timeout: Duration::from_secs(env_u64("SCALP_BUY_TIMEOUT_SECS", 10)),
            fill_poll_interval: Duration::from_secs(1),
            monitor_interval: Duration::from_millis(500),
            settle_delay: Duration::from_secs(2),
            confirm_retry_delay: Duration::from_secs(5),
            trade_pause: Duration::from_secs(5),
            scan_retry_interval: Duration::from_secs(env_u64("SCALP_SCAN_RETRY_SECS", 30)),
            error_backoff: Duration::from_secs(env_u64("SCALP_ERROR_BACKOFF_SECS", 60)),
            max_consecutive_losses: 2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
