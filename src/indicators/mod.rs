// Technical indicators module
// Implements RSI, SMA/EMA, Bollinger Bands and MACD over newest-first
// close series. All functions are pure and return None instead of
// failing when the series is too short.

pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use bollinger::{calculate_bollinger, Bollinger};
pub use macd::{calculate_macd, Macd};
pub use moving_average::{calculate_ema, calculate_sma};
pub use rsi::calculate_rsi;

/// The full indicator summary attached to one pair snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub rsi: Option<f64>,
    pub sma_5: Option<f64>,
    pub sma_20: Option<f64>,
    pub bollinger: Option<Bollinger>,
    pub macd: Option<Macd>,
}

impl IndicatorSet {
    /// Compute the standard set from newest-first closes.
    pub fn from_closes(closes: &[f64]) -> Self {
        Self {
            rsi: calculate_rsi(closes, 14),
            sma_5: calculate_sma(closes, 5),
            sma_20: calculate_sma(closes, 20),
            bollinger: calculate_bollinger(closes, 20, 2.0),
            macd: calculate_macd(closes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_set_short_series() {
        let closes = vec![100.0, 101.0, 99.5];
        let set = IndicatorSet::from_closes(&closes);

        assert!(set.rsi.is_none());
        assert!(set.sma_5.is_none());
        assert!(set.sma_20.is_none());
        assert!(set.bollinger.is_none());
        assert!(set.macd.is_none());
    }

    #[test]
    fn test_indicator_set_full_series() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let set = IndicatorSet::from_closes(&closes);

        assert!(set.rsi.is_some());
        assert!(set.sma_5.is_some());
        assert!(set.sma_20.is_some());
        assert!(set.bollinger.is_some());
        assert!(set.macd.is_some());
    }
}
