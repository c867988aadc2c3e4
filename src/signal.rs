use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::format::group_thousands;
use crate::indicator::fibonacci::RetracementLevels;
use crate::model::EnrichedBar;

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

/// Indicator family a signal came from. The derived ordering is the order in
/// which signals are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SignalSource {
    Vwap,
    Bollinger,
    Rsi,
    Macd,
    Fibonacci,
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vwap => "VWAP",
            Self::Bollinger => "Bollinger",
            Self::Rsi => "RSI",
            Self::Macd => "MACD",
            Self::Fibonacci => "Fibonacci",
        };
        f.write_str(name)
    }
}

/// A plain-text reading of one indicator on the latest bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub source: SignalSource,
    pub message: String,
}

impl Signal {
    fn new(source: SignalSource, message: String) -> Self {
        Self { source, message }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.message)
    }
}

/// Read the latest enriched bar into signals, one rule per indicator family.
///
/// Rules whose inputs are missing on `latest` contribute nothing. The result
/// is always ordered VWAP, Bollinger, RSI, MACD, Fibonacci. `series` is the
/// full enriched history `latest` was taken from.
pub fn interpret_technical(
    latest: &EnrichedBar,
    series: &[EnrichedBar],
    levels: &RetracementLevels,
) -> Vec<Signal> {
    let signals: Vec<Signal> = [
        vwap_signal(latest),
        bollinger_signal(latest),
        rsi_signal(latest),
        macd_signal(latest),
        fibonacci_signal(latest, levels),
    ]
    .into_iter()
    .flatten()
    .collect();

    debug!(
        history = series.len(),
        signals = signals.len(),
        "technical signals interpreted"
    );
    signals
}

fn vwap_signal(latest: &EnrichedBar) -> Option<Signal> {
    let vwap = latest.vwap_cumulative?;
    let close = latest.bar.close;
    let message = if close > vwap {
        format!(
            "종가 {}원이 VWAP {}원 위에 있어 단기 매수세가 우위입니다.",
            group_thousands(close),
            group_thousands(vwap)
        )
    } else {
        format!(
            "종가 {}원이 VWAP {}원 이하에 있어 단기 매도세가 우위입니다.",
            group_thousands(close),
            group_thousands(vwap)
        )
    };
    Some(Signal::new(SignalSource::Vwap, message))
}

fn bollinger_signal(latest: &EnrichedBar) -> Option<Signal> {
    let upper = latest.bollinger_upper?;
    let lower = latest.bollinger_lower?;
    let close = latest.bar.close;
    let message = if close > upper {
        "볼린저 밴드 상단을 돌파했습니다. 과열 또는 강한 상승 추세일 수 있습니다."
    } else if close < lower {
        "볼린저 밴드 하단을 이탈했습니다. 과매도 구간일 수 있습니다."
    } else {
        "볼린저 밴드 안에서 움직이고 있어 뚜렷한 방향성이 없는 박스권입니다."
    };
    Some(Signal::new(SignalSource::Bollinger, message.into()))
}

fn rsi_signal(latest: &EnrichedBar) -> Option<Signal> {
    let rsi = latest.rsi_14?;
    let zone = if rsi > RSI_OVERBOUGHT {
        "과매수 구간입니다."
    } else if rsi < RSI_OVERSOLD {
        "과매도 구간입니다."
    } else {
        "중립 구간입니다."
    };
    Some(Signal::new(
        SignalSource::Rsi,
        format!("RSI(14)가 {rsi:.1}로 {zone}"),
    ))
}

fn macd_signal(latest: &EnrichedBar) -> Option<Signal> {
    let line = latest.macd_line?;
    let signal = latest.macd_signal?;
    let message = if line > signal {
        "MACD가 시그널선 위에 있어 상승 모멘텀이 우세합니다."
    } else {
        "MACD가 시그널선 아래에 있어 하락 모멘텀이 우세합니다."
    };
    Some(Signal::new(SignalSource::Macd, message.into()))
}

fn fibonacci_signal(latest: &EnrichedBar, levels: &RetracementLevels) -> Option<Signal> {
    if levels.is_empty() {
        return None;
    }
    let close = latest.bar.close;
    let sorted = levels.ascending_by_price();

    if let Some(band) = sorted
        .windows(2)
        .find(|pair| pair[0].price <= close && close <= pair[1].price)
    {
        return Some(Signal::new(
            SignalSource::Fibonacci,
            format!(
                "종가가 피보나치 {}~{} 구간({}원~{}원)에 있으며, 이 구간이 지지/저항대로 작용할 수 있습니다.",
                band[0].label,
                band[1].label,
                group_thousands(band[0].price),
                group_thousands(band[1].price)
            ),
        ));
    }

    let (lowest, highest) = (sorted.first()?, sorted.last()?);
    let message = if close > highest.price {
        format!(
            "종가가 피보나치 최상단 레벨({})을 돌파했습니다. 상단 저항을 넘어선 흐름입니다.",
            highest.label
        )
    } else if close < lowest.price {
        format!(
            "종가가 피보나치 최하단 레벨({})을 이탈했습니다. 하단 지지가 무너진 흐름입니다.",
            lowest.label
        )
    } else {
        return None;
    };
    Some(Signal::new(SignalSource::Fibonacci, message))
}

/// One-line moving-average posture of the latest bar, if both averages exist.
pub fn trend_summary(latest: &EnrichedBar) -> Option<String> {
    let short = latest.sma_short?;
    let long = latest.sma_long?;
    let close = latest.bar.close;
    let posture = if short > long && close > short {
        "단기 상승 추세이며 종가가 단기 이동평균 위에 있습니다. (골든 크로스 근접 또는 발생 가능성)"
    } else if short < long && close < short {
        "단기 하락 추세이며 종가가 단기 이동평균 아래에 있습니다. (데드 크로스 근접 또는 발생 가능성)"
    } else {
        "이동평균선이 혼조세이거나 주가가 이평선 사이에 있어 방향성 탐색 구간입니다."
    };
    Some(format!(
        "5일 이동평균 {}원, 20일 이동평균 {}원: {posture}",
        group_thousands(short),
        group_thousands(long)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::enrich;
    use crate::indicator::bars_from_closes;
    use crate::indicator::fibonacci::retracement_levels;
    use crate::model::Bar;

    fn latest_with(close: f64) -> EnrichedBar {
        let mut row = EnrichedBar::new(bars_from_closes(&[close]).remove(0));
        row.vwap_cumulative = Some(100.0);
        row.bollinger_upper = Some(110.0);
        row.bollinger_lower = Some(90.0);
        row.rsi_14 = Some(50.0);
        row.macd_line = Some(1.0);
        row.macd_signal = Some(0.5);
        row
    }

    fn swing_levels() -> RetracementLevels {
        let mut bars: Vec<Bar> = bars_from_closes(&[100.0, 150.0, 120.0]);
        bars[0].low = 100.0;
        bars[1].high = 200.0;
        retracement_levels(&bars)
    }

    fn sources(signals: &[Signal]) -> Vec<SignalSource> {
        signals.iter().map(|s| s.source).collect()
    }

    #[test]
    fn all_rules_fire_in_fixed_order() {
        let signals = interpret_technical(&latest_with(105.0), &[], &swing_levels());
        assert_eq!(
            sources(&signals),
            vec![
                SignalSource::Vwap,
                SignalSource::Bollinger,
                SignalSource::Rsi,
                SignalSource::Macd,
                SignalSource::Fibonacci,
            ]
        );
    }

    #[test]
    fn missing_fields_suppress_rules() {
        let row = EnrichedBar::new(bars_from_closes(&[100.0]).remove(0));
        assert!(interpret_technical(&row, &[], &RetracementLevels::default()).is_empty());

        let mut partial = latest_with(105.0);
        partial.bollinger_lower = None;
        partial.rsi_14 = None;
        let signals = interpret_technical(&partial, &[], &RetracementLevels::default());
        assert_eq!(sources(&signals), vec![SignalSource::Vwap, SignalSource::Macd]);
    }

    #[test]
    fn vwap_above_and_at_level() {
        let above = vwap_signal(&latest_with(101.0)).unwrap();
        assert!(above.message.contains("매수세"));
        let at = vwap_signal(&latest_with(100.0)).unwrap();
        assert!(at.message.contains("매도세"));
    }

    #[test]
    fn bollinger_three_zones() {
        assert!(bollinger_signal(&latest_with(111.0)).unwrap().message.contains("상단"));
        assert!(bollinger_signal(&latest_with(89.0)).unwrap().message.contains("하단"));
        assert!(bollinger_signal(&latest_with(110.0)).unwrap().message.contains("박스권"));
    }

    #[test]
    fn rsi_thresholds_are_strict() {
        let mut row = latest_with(100.0);
        row.rsi_14 = Some(70.5);
        assert!(rsi_signal(&row).unwrap().message.contains("과매수"));
        row.rsi_14 = Some(70.0);
        assert!(rsi_signal(&row).unwrap().message.contains("중립"));
        row.rsi_14 = Some(29.9);
        assert!(rsi_signal(&row).unwrap().message.contains("과매도"));
        row.rsi_14 = Some(30.0);
        assert!(rsi_signal(&row).unwrap().message.contains("중립"));
    }

    #[test]
    fn macd_equal_lines_is_bearish() {
        let mut row = latest_with(100.0);
        row.macd_signal = Some(1.0);
        assert!(macd_signal(&row).unwrap().message.contains("하락"));
        row.macd_signal = Some(0.0);
        assert!(macd_signal(&row).unwrap().message.contains("상승"));
    }

    #[test]
    fn fibonacci_names_bounding_labels() {
        // levels: 200, 176.4, 161.8, 150, 138.2, 121.4, 100
        let signal = fibonacci_signal(&latest_with(145.0), &swing_levels()).unwrap();
        assert!(signal.message.contains("61.8%~50.0%"));
    }

    #[test]
    fn fibonacci_close_on_level_picks_first_band() {
        // 150 is the 50.0% level; the lower band [61.8%, 50.0%] is found first
        let signal = fibonacci_signal(&latest_with(150.0), &swing_levels()).unwrap();
        assert!(signal.message.contains("61.8%~50.0%"));
    }

    #[test]
    fn fibonacci_outside_range() {
        let above = fibonacci_signal(&latest_with(250.0), &swing_levels()).unwrap();
        assert!(above.message.contains("돌파"));
        assert!(above.message.contains("0.0%"));
        let below = fibonacci_signal(&latest_with(50.0), &swing_levels()).unwrap();
        assert!(below.message.contains("이탈"));
        assert!(below.message.contains("100.0%"));
    }

    #[test]
    fn fibonacci_empty_levels_contribute_nothing() {
        assert!(fibonacci_signal(&latest_with(100.0), &RetracementLevels::default()).is_none());
    }

    #[test]
    fn rising_series_reads_overbought_and_bullish() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        let (series, levels) = enrich(&bars_from_closes(&closes)).unwrap();
        let latest = series.last().unwrap();
        let signals = interpret_technical(latest, &series, &levels);
        let rsi = signals.iter().find(|s| s.source == SignalSource::Rsi).unwrap();
        assert!(rsi.message.contains("과매수"));
        let macd = signals.iter().find(|s| s.source == SignalSource::Macd).unwrap();
        assert!(macd.message.contains("상승"));
        assert!(signals.windows(2).all(|w| w[0].source < w[1].source));
    }

    #[test]
    fn trend_summary_postures() {
        let mut row = latest_with(120.0);
        assert!(trend_summary(&row).is_none());

        row.sma_short = Some(110.0);
        row.sma_long = Some(100.0);
        assert!(trend_summary(&row).unwrap().contains("상승 추세"));

        row.bar.close = 80.0;
        row.sma_short = Some(90.0);
        assert!(trend_summary(&row).unwrap().contains("하락 추세"));

        row.bar.close = 95.0;
        assert!(trend_summary(&row).unwrap().contains("방향성 탐색"));
    }

    #[test]
    fn signal_display_tags_source() {
        let signal = rsi_signal(&latest_with(100.0)).unwrap();
        assert!(signal.to_string().starts_with("[RSI]"));
    }
}
