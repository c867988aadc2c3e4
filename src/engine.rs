use error_stack::Report;
use tracing::debug;

use crate::error::IndicatorError;
use crate::indicator::Indicator;
use crate::indicator::bollinger::BollingerBands;
use crate::indicator::fibonacci::{RetracementLevels, retracement_levels};
use crate::indicator::ma::Sma;
use crate::indicator::macd::Macd;
use crate::indicator::rsi::Rsi;
use crate::indicator::vwap::Vwap;
use crate::model::{Bar, EnrichedBar, ensure_finite};

const SMA_SHORT_PERIOD: usize = 5;
const SMA_LONG_PERIOD: usize = 20;
const EMA_FAST_PERIOD: usize = 12;
const EMA_SLOW_PERIOD: usize = 26;
const MACD_SIGNAL_PERIOD: usize = 9;
const RSI_PERIOD: usize = 14;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_MULTIPLIER: f64 = 2.0;

/// Compute every derived column for `bars` plus the retracement grid.
///
/// The input is never modified; the output has one row per input bar in the
/// same order. Short series produce `None` columns, never an error. The only
/// failure is a bar with a non-finite price.
pub fn enrich(
    bars: &[Bar],
) -> Result<(Vec<EnrichedBar>, RetracementLevels), Report<IndicatorError>> {
    ensure_finite(bars)?;
    let len = bars.len();

    let sma_short = column(&Sma::new(SMA_SHORT_PERIOD)?, bars)?;
    let sma_long = column(&Sma::new(SMA_LONG_PERIOD)?, bars)?;
    let rsi = column(&Rsi::new(RSI_PERIOD)?, bars)?;
    let vwap = column(&Vwap, bars)?;
    let macd = align_series(
        len,
        tolerate_insufficient(
            Macd::new(EMA_FAST_PERIOD, EMA_SLOW_PERIOD, MACD_SIGNAL_PERIOD)?.calculate_full(bars),
        )?,
    );
    let bands = align_series(
        len,
        tolerate_insufficient(
            BollingerBands::new(BOLLINGER_PERIOD, BOLLINGER_MULTIPLIER)?.calculate_bands(bars),
        )?,
    );

    let series: Vec<EnrichedBar> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let mut row = EnrichedBar::new(bar.clone());
            row.sma_short = sma_short[i];
            row.sma_long = sma_long[i];
            row.rsi_14 = rsi[i];
            row.vwap_cumulative = vwap[i];
            if let Some(point) = macd[i] {
                row.ema_12 = Some(point.fast_ema);
                row.ema_26 = Some(point.slow_ema);
                row.macd_line = Some(point.line);
                row.macd_signal = Some(point.signal);
                row.macd_hist = Some(point.histogram);
            }
            if let Some((upper, _, lower)) = bands[i] {
                row.bollinger_upper = Some(upper);
                row.bollinger_lower = Some(lower);
            }
            row
        })
        .collect();

    let levels = retracement_levels(bars);
    debug!(rows = len, levels = levels.len(), "series enriched");

    Ok((series, levels))
}

fn column(
    indicator: &dyn Indicator,
    bars: &[Bar],
) -> Result<Vec<Option<f64>>, Report<IndicatorError>> {
    let values = tolerate_insufficient(indicator.calculate(bars))?;
    if values.is_empty() {
        debug!(
            indicator = indicator.name(),
            required = indicator.required_candles(),
            available = bars.len(),
            "not enough history, column left empty"
        );
    }
    Ok(align_series(bars.len(), values))
}

/// Insufficient history is not an error here: it becomes an empty column.
fn tolerate_insufficient<T>(
    result: Result<Vec<T>, Report<IndicatorError>>,
) -> Result<Vec<T>, Report<IndicatorError>> {
    match result {
        Err(report)
            if matches!(
                report.current_context(),
                IndicatorError::InsufficientData { .. }
            ) =>
        {
            Ok(Vec::new())
        }
        other => other,
    }
}

fn align_series<T: Copy>(total_len: usize, values: Vec<T>) -> Vec<Option<T>> {
    let offset = total_len.saturating_sub(values.len());
    let mut output = vec![None; total_len];
    for (index, value) in values.into_iter().enumerate() {
        output[offset + index] = Some(value);
    }
    output
}
