use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::close_prices;
use crate::model::Bar;

/// One row of MACD output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }

    /// Calculate one `MacdPoint` per bar.
    ///
    /// All EMAs are seeded with their first input, so there is no warm-up gap
    /// and the output has the same length as `bars`.
    pub fn calculate_full(&self, bars: &[Bar]) -> Result<Vec<MacdPoint>, Report<IndicatorError>> {
        let prices = close_prices(bars);
        if prices.is_empty() {
            bail!(IndicatorError::InsufficientData {
                required: 1,
                available: 0,
            });
        }

        let fast_ema = Ema::new(self.fast_period)?.calculate_prices(&prices)?;
        let slow_ema = Ema::new(self.slow_period)?.calculate_prices(&prices)?;

        let macd_line: Vec<f64> = fast_ema
            .iter()
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();

        let signal_line = Ema::new(self.signal_period)?.calculate_prices(&macd_line)?;

        let result = fast_ema
            .iter()
            .zip(slow_ema.iter())
            .zip(macd_line.iter().zip(signal_line.iter()))
            .map(|((&fast_ema, &slow_ema), (&line, &signal))| MacdPoint {
                fast_ema,
                slow_ema,
                line,
                signal,
                histogram: line - signal,
            })
            .collect();

        Ok(result)
    }
}
