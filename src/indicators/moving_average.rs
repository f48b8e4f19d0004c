/// Calculate Simple Moving Average (SMA)
///
/// `closes` is newest-first, so the window is simply the first `period`
/// values.
pub fn calculate_sma(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period {
        return None;
    }

    let sum: f64 = closes.iter().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA)
///
/// The seed is the mean of the *oldest* `period` closes in the series and
/// the recurrence then walks toward the newest close. This warm-up differs
/// from the textbook EMA (which seeds on the first `period` values of the
/// full history only); changing it shifts every MACD value handed to the
/// decision oracle, so it stays as-is.
pub fn calculate_ema(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Seed on the oldest window (series tail, since closes are newest-first)
    let seed_start = closes.len() - period;
    let mut ema: f64 = closes[seed_start..].iter().sum::<f64>() / period as f64;

    // Walk from older to newer closes
    for price in closes[..seed_start].iter().rev() {
        ema = (price - ema) * multiplier + ema;
    }

    Some(ema)
}
