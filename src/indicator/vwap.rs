use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices, volumes};
use crate::model::Bar;

/// Cumulative volume-weighted average of the close price since the first bar.
pub struct Vwap;

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn required_candles(&self) -> usize {
        1
    }

    /// Returns one value per bar from the first bar with non-zero cumulative
    /// volume onward. Leading zero-volume bars have no value.
    fn calculate(&self, bars: &[Bar]) -> Result<Vec<f64>, Report<IndicatorError>> {
        if bars.is_empty() {
            bail!(IndicatorError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let prices = close_prices(bars);
        let vols = volumes(bars);

        let mut price_volume = 0.0;
        let mut volume = 0.0;
        let mut results = Vec::with_capacity(bars.len());
        for (price, vol) in prices.iter().zip(vols.iter()) {
            price_volume += price * vol;
            volume += vol;
            if volume > 0.0 {
                results.push(price_volume / volume);
            }
        }

        if results.is_empty() {
            bail!(IndicatorError::InsufficientData {
                required: 1,
                available: 0,
            });
        }
        Ok(results)
    }
}
