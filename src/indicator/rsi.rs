use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices};
use crate::model::Bar;

/// RSI (Relative Strength Index) over a plain rolling mean of gains and losses,
/// not Wilder's smoothing.
///
/// A bar gets a value once `period` deltas precede it, so a value depends only
/// on the bars up to its own row and never changes when later bars are added.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    /// One value per bar from bar `period` onward.
    fn calculate(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        let prices = close_prices(bars);
        if prices.len() < self.required_candles() {
            bail!(IndicatorError::InsufficientData {
                required: self.required_candles(),
                available: prices.len(),
            });
        }

        let gains: Vec<f64> = prices.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
        let losses: Vec<f64> = prices
            .windows(2)
            .map(|w| (w[0] - w[1]).max(0.0))
            .collect();

        let period = self.period as f64;
        let results = gains
            .windows(self.period)
            .zip(losses.windows(self.period))
            .map(|(g, l)| {
                let avg_gain = g.iter().sum::<f64>() / period;
                let avg_loss = l.iter().sum::<f64>() / period;
                rsi_value(avg_gain, avg_loss)
            })
            .collect();

        Ok(results)
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::bars_from_closes;

    #[test]
    fn rsi_insufficient_data() {
        let rsi = Rsi::new(14).unwrap();
        assert!(rsi.calculate(&bars_from_closes(&[1.0; 10])).is_err());
    }

    #[test]
    fn rsi_period_zero_invalid() {
        assert!(Rsi::new(0).is_err());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let rsi = Rsi::new(3).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert!(values.iter().all(|&v| v == 100.0));
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = Rsi::new(3).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[4.0, 3.0, 2.0, 1.0])).unwrap();
        for v in &values {
            assert!(v.abs() < 1e-9);
        }
    }

    #[test]
    fn rsi_flat_prices_returns_100() {
        // no losses at all, so avg_loss is zero
        let rsi = Rsi::new(3).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[5.0; 6])).unwrap();
        assert!(values.iter().all(|&v| v == 100.0));
    }

    #[test]
    fn rsi_values_unchanged_when_bars_appended() {
        let rsi = Rsi::new(14).unwrap();
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + ((i * 5) % 9) as f64).collect();
        let short = rsi.calculate(&bars_from_closes(&closes[..20])).unwrap();
        let long = rsi.calculate(&bars_from_closes(&closes)).unwrap();
        // both start at bar 14
        assert_eq!(short.len(), 6);
        assert_eq!(long.len(), 16);
        assert_eq!(short[..], long[..6]);
    }

    #[test]
    fn rsi_window_drops_old_deltas() {
        // period 2: deltas -1, +1, +1 -> windows [-1, +1] and [+1, +1]
        let rsi = Rsi::new(2).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[3.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(values.len(), 2);
        assert!((values[0] - 50.0).abs() < 1e-9);
        assert_eq!(values[1], 100.0);
    }

    #[test]
    fn rsi_output_length() {
        let rsi = Rsi::new(14).unwrap();
        let values = rsi.calculate(&bars_from_closes(&[100.0_f64; 20])).unwrap();
        assert_eq!(values.len(), 6);
    }

    #[test]
    fn rsi_stays_in_bounds() {
        let rsi = Rsi::new(5).unwrap();
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 7) % 11) as f64 - 5.0).collect();
        let values = rsi.calculate(&bars_from_closes(&closes)).unwrap();
        assert!(values.iter().all(|&v| (0.0..=100.0).contains(&v)));
    }
}
