use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use error_stack::Report;
use serde::{Deserialize, Serialize};

use crate::error::IndicatorError;

/// Look-back window offered for the technical view.
///
/// String representations match the CLI/config format (e.g. `"3m"`, `"1y"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisPeriod {
    #[serde(rename = "3m")]
    Months3,
    #[serde(rename = "6m")]
    Months6,
    #[serde(rename = "1y")]
    Year1,
    #[serde(rename = "2y")]
    Year2,
}

impl AnalysisPeriod {
    /// Parse a CLI-format string into an `AnalysisPeriod`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "3m" => Some(Self::Months3),
            "6m" => Some(Self::Months6),
            "1y" => Some(Self::Year1),
            "2y" => Some(Self::Year2),
            _ => None,
        }
    }

    /// Map a stored day count back to a period.
    pub fn from_days(days: i64) -> Option<Self> {
        match days {
            90 => Some(Self::Months3),
            180 => Some(Self::Months6),
            365 => Some(Self::Year1),
            730 => Some(Self::Year2),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Months3 => "3m",
            Self::Months6 => "6m",
            Self::Year1 => "1y",
            Self::Year2 => "2y",
        }
    }

    pub fn days(self) -> i64 {
        match self {
            Self::Months3 => 90,
            Self::Months6 => 180,
            Self::Year1 => 365,
            Self::Year2 => 730,
        }
    }
}

impl fmt::Display for AnalysisPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One trading day of a listed stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    fn non_finite_field(&self) -> Option<&'static str> {
        [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ]
        .into_iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(name, _)| name)
    }
}

/// A bar as received from a collaborator, before any field is trusted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBar {
    pub date: Option<NaiveDate>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// Turn raw rows into bars, rejecting missing or non-numeric fields.
///
/// Ordering and duplicate dates are the caller's responsibility and are not
/// checked here.
pub fn validate_bars(raw: &[RawBar]) -> Result<Vec<Bar>, Report<IndicatorError>> {
    raw.iter()
        .enumerate()
        .map(|(row, r)| validate_bar(row, r))
        .collect()
}

fn validate_bar(row: usize, raw: &RawBar) -> Result<Bar, Report<IndicatorError>> {
    let malformed = |field: &str, problem: &str| {
        Report::new(IndicatorError::MalformedInput {
            reason: format!("row {row}: {field} {problem}"),
        })
    };
    let price = |field: &'static str, value: Option<f64>| match value {
        None => Err(malformed(field, "is missing")),
        Some(v) if !v.is_finite() => Err(malformed(field, "is not a finite number")),
        Some(v) => Ok(v),
    };

    let date = raw.date.ok_or_else(|| malformed("date", "is missing"))?;
    let volume = match raw.volume {
        None => return Err(malformed("volume", "is missing")),
        Some(v) if !v.is_finite() || v < 0.0 || v.fract() != 0.0 => {
            return Err(malformed("volume", "is not a non-negative integer"));
        }
        Some(v) => v as u64,
    };

    Ok(Bar {
        date,
        open: price("open", raw.open)?,
        high: price("high", raw.high)?,
        low: price("low", raw.low)?,
        close: price("close", raw.close)?,
        volume,
    })
}

/// Reject bars that cannot be fed to the indicator families.
pub fn ensure_finite(bars: &[Bar]) -> Result<(), Report<IndicatorError>> {
    for (row, bar) in bars.iter().enumerate() {
        if let Some(field) = bar.non_finite_field() {
            return Err(Report::new(IndicatorError::MalformedInput {
                reason: format!("row {row}: {field} is not a finite number"),
            }));
        }
    }
    Ok(())
}

/// A bar plus every derived column. A column is `None` on rows that lack the
/// history it needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedBar {
    #[serde(flatten)]
    pub bar: Bar,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub rsi_14: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub vwap_cumulative: Option<f64>,
}

impl EnrichedBar {
    pub fn new(bar: Bar) -> Self {
        Self {
            bar,
            sma_short: None,
            sma_long: None,
            ema_12: None,
            ema_26: None,
            macd_line: None,
            macd_signal: None,
            macd_hist: None,
            rsi_14: None,
            bollinger_upper: None,
            bollinger_lower: None,
            vwap_cumulative: None,
        }
    }
}

/// An entry of the local stock directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockInfo {
    pub symbol: String,
    pub name: String,
    pub corp_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRecord {
    pub symbol: String,
    pub company_name: String,
    pub searched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(close: Option<f64>, volume: Option<f64>) -> RawBar {
        RawBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2),
            open: Some(100.0),
            high: Some(110.0),
            low: Some(90.0),
            close,
            volume,
        }
    }

    #[test]
    fn period_round_trip() {
        let periods = [
            ("3m", 90, AnalysisPeriod::Months3),
            ("6m", 180, AnalysisPeriod::Months6),
            ("1y", 365, AnalysisPeriod::Year1),
            ("2y", 730, AnalysisPeriod::Year2),
        ];
        for (s, days, period) in periods {
            assert_eq!(AnalysisPeriod::from_str(s), Some(period));
            assert_eq!(AnalysisPeriod::from_days(days), Some(period));
            assert_eq!(period.as_str(), s);
            assert_eq!(period.days(), days);
            assert_eq!(serde_json::to_value(period).unwrap(), s);
        }
    }

    #[test]
    fn period_invalid_values_return_none() {
        assert_eq!(AnalysisPeriod::from_str("5y"), None);
        assert_eq!(AnalysisPeriod::from_days(30), None);
    }

    #[test]
    fn valid_raw_bar_converts() {
        let bars = validate_bars(&[raw(Some(105.0), Some(1200.0))]).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[0].volume, 1200);
    }

    #[test]
    fn missing_close_is_malformed() {
        let err = validate_bars(&[raw(Some(1.0), Some(1.0)), raw(None, Some(1.0))]).unwrap_err();
        match err.current_context() {
            IndicatorError::MalformedInput { reason } => {
                assert!(reason.contains("row 1"));
                assert!(reason.contains("close"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nan_price_is_malformed() {
        assert!(validate_bars(&[raw(Some(f64::NAN), Some(1.0))]).is_err());
    }

    #[test]
    fn negative_or_fractional_volume_is_malformed() {
        assert!(validate_bars(&[raw(Some(1.0), Some(-5.0))]).is_err());
        assert!(validate_bars(&[raw(Some(1.0), Some(2.5))]).is_err());
    }

    #[test]
    fn ensure_finite_flags_infinite_high() {
        let bar = Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 1.0,
            high: f64::INFINITY,
            low: 1.0,
            close: 1.0,
            volume: 0,
        };
        assert!(ensure_finite(&[bar]).is_err());
    }

    #[test]
    fn enriched_bar_serializes_flat() {
        let bar = Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10,
        };
        let json = serde_json::to_value(EnrichedBar::new(bar)).unwrap();
        assert_eq!(json["close"], 1.5);
        assert!(json["rsi_14"].is_null());
    }
}
