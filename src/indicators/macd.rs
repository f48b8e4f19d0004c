use crate::indicators::calculate_ema;

/// MACD line with its component EMAs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub ema_12: f64,
    pub ema_26: f64,
}

/// Calculate MACD: EMA(12) − EMA(26). Needs at least 26 closes.
pub fn calculate_macd(closes: &[f64]) -> Option<Macd> {
    let ema_12 = calculate_ema(closes, 12)?;
    let ema_26 = calculate_ema(closes, 26)?;

    Some(Macd {
        line: ema_12 - ema_26,
        ema_12,
        ema_26,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_positive_in_uptrend() {
        // Rising toward the newest close: short EMA above long EMA
        let closes: Vec<f64> = (0..30).map(|i| 130.0 - i as f64).collect();
        let macd = calculate_macd(&closes).unwrap();

        assert!(macd.line > 0.0);
        assert!(macd.ema_12 > macd.ema_26);
    }

    #[test]
    fn test_macd_negative_in_downtrend() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let macd = calculate_macd(&closes).unwrap();

        assert!(macd.line < 0.0);
    }

    #[test]
    fn test_macd_insufficient_data() {
        let closes = vec![100.0; 25];
        assert!(calculate_macd(&closes).is_none());
    }
}
