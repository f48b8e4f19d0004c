use crate::indicators::calculate_sma;

/// Bollinger Bands over the most recent `period` closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// (upper - lower) / middle, in percent. A volatility proxy.
    pub bandwidth_pct: f64,
}

impl Bollinger {
    /// Where `price` sits between the bands, in percent (0 = lower band,
    /// 100 = upper band). Degenerate bands report 50.
    pub fn position_pct(&self, price: f64) -> f64 {
        let range = self.upper - self.lower;
        if range == 0.0 {
            return 50.0;
        }
        (price - self.lower) / range * 100.0
    }
}

/// Calculate Bollinger Bands: SMA ± k population standard deviations.
pub fn calculate_bollinger(closes: &[f64], period: usize, k: f64) -> Option<Bollinger> {
    if closes.len() < period {
        return None;
    }

    let middle = calculate_sma(closes, period)?;

    let variance: f64 = closes
        .iter()
        .take(period)
        .map(|c| (c - middle).powi(2))
        .sum::<f64>()
        / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + k * std_dev;
    let lower = middle - k * std_dev;
    let bandwidth_pct = if middle != 0.0 {
        (upper - lower) / middle * 100.0
    } else {
        0.0
    };

    Some(Bollinger {
        upper,
        middle,
        lower,
        bandwidth_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands_ordered() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + ((i * 7) % 11) as f64).collect();
        let bands = calculate_bollinger(&closes, 20, 2.0).unwrap();

        assert!(bands.upper >= bands.middle);
        assert!(bands.middle >= bands.lower);
        assert!(bands.bandwidth_pct > 0.0);
    }

    #[test]
    fn test_constant_window_collapses_bands() {
        let closes = vec![42.0; 20];
        let bands = calculate_bollinger(&closes, 20, 2.0).unwrap();

        assert_eq!(bands.upper, 42.0);
        assert_eq!(bands.middle, 42.0);
        assert_eq!(bands.lower, 42.0);
        assert_eq!(bands.bandwidth_pct, 0.0);
        assert_eq!(bands.position_pct(42.0), 50.0);
    }

    #[test]
    fn test_insufficient_data() {
        let closes = vec![100.0; 19];
        assert!(calculate_bollinger(&closes, 20, 2.0).is_none());
    }

    #[test]
    fn test_position_pct() {
        let bands = Bollinger {
            upper: 110.0,
            middle: 100.0,
            lower: 90.0,
            bandwidth_pct: 20.0,
        };
        assert_eq!(bands.position_pct(90.0), 0.0);
        assert_eq!(bands.position_pct(100.0), 50.0);
        assert_eq!(bands.position_pct(110.0), 100.0);
    }
}
