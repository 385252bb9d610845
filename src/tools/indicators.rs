//! Price indicators used by the analysis tools

use serde::Serialize;
use std::fmt;

const RSI_WINDOW: usize = 14;
const SIGNAL_CHANGE_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        };
        write!(f, "{}", s)
    }
}

/// Percent change from the first to the last close
pub fn percent_change(closes: &[f64]) -> Option<f64> {
    let first = *closes.first()?;
    let last = *closes.last()?;
    if first == 0.0 {
        return None;
    }
    Some((last - first) / first * 100.0)
}

/// Sample standard deviation over mean, in percent
pub fn volatility(closes: &[f64]) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }

    let n = closes.len() as f64;
    let mean = closes.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return None;
    }

    let variance = closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt() / mean * 100.0)
}

/// Simple RSI over the first 14 moves of the window
pub fn rsi(closes: &[f64]) -> f64 {
    let (gains, losses) = closes
        .windows(2)
        .take(RSI_WINDOW)
        .fold((0.0, 0.0), |(gains, losses), pair| {
            let delta = pair[1] - pair[0];
            (gains + delta.max(0.0), losses + (-delta).max(0.0))
        });

    // Offset keeps an all-gain window finite
    100.0 - 100.0 / (1.0 + gains / (losses + 0.001))
}

pub fn signal(rsi: f64, change_pct: f64) -> Signal {
    if rsi < 30.0 || change_pct > SIGNAL_CHANGE_PCT {
        Signal::Buy
    } else if rsi > 70.0 || change_pct < -SIGNAL_CHANGE_PCT {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(&[100.0, 90.0, 110.0]), Some(10.0));
        assert_eq!(percent_change(&[]), None);
        assert_eq!(percent_change(&[0.0, 1.0]), None);
    }

    #[test]
    fn test_volatility_is_sample_based() {
        // mean 3, sample std 1.5811...
        let v = volatility(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!((v - 52.70).abs() < 0.01, "{}", v);
        assert_eq!(volatility(&[5.0]), None);
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert!(rsi(&rising) > 99.0);

        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert!(rsi(&falling) < 1.0);

        let flat = vec![50.0, 51.0, 50.0, 51.0, 50.0];
        assert!((rsi(&flat) - 50.0).abs() < 1.0);
    }

    #[test]
    fn test_signal_thresholds() {
        assert_eq!(signal(25.0, 0.0), Signal::Buy);
        assert_eq!(signal(50.0, 6.0), Signal::Buy);
        assert_eq!(signal(75.0, 0.0), Signal::Sell);
        assert_eq!(signal(50.0, -6.0), Signal::Sell);
        assert_eq!(signal(50.0, 2.0), Signal::Hold);
    }
}
