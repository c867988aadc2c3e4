use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::model::Bar;

const RETRACEMENT_RATIOS: [(&str, f64); 7] = [
    ("0.0%", 0.0),
    ("23.6%", 0.236),
    ("38.2%", 0.382),
    ("50.0%", 0.5),
    ("61.8%", 0.618),
    ("78.6%", 0.786),
    ("100.0%", 1.0),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetracementLevel {
    pub label: &'static str,
    pub ratio: f64,
    pub price: f64,
}

/// Fibonacci retracement grid between the highest high and lowest low of a
/// whole series. Empty when the series is empty or its range is zero.
///
/// Serializes as a map from label to price (`{"0.0%": 130.0, ...}`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetracementLevels {
    levels: Vec<RetracementLevel>,
}

impl RetracementLevels {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Levels in ratio order: `0.0%` (highest price) first.
    pub fn iter(&self) -> impl Iterator<Item = &RetracementLevel> {
        self.levels.iter()
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.levels
            .iter()
            .find(|l| l.label == label)
            .map(|l| l.price)
    }

    /// Levels sorted from the lowest price to the highest.
    pub fn ascending_by_price(&self) -> Vec<RetracementLevel> {
        let mut sorted = self.levels.clone();
        sorted.sort_by(|a, b| a.price.total_cmp(&b.price));
        sorted
    }
}

impl Serialize for RetracementLevels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.levels.len()))?;
        for level in &self.levels {
            map.serialize_entry(level.label, &level.price)?;
        }
        map.end()
    }
}

pub fn retracement_levels(bars: &[Bar]) -> RetracementLevels {
    if bars.is_empty() {
        return RetracementLevels::default();
    }

    let highest_high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let lowest_low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let range = highest_high - lowest_low;
    if range == 0.0 {
        return RetracementLevels::default();
    }

    let levels = RETRACEMENT_RATIOS
        .iter()
        .map(|&(label, ratio)| RetracementLevel {
            label,
            ratio,
            price: highest_high - range * ratio,
        })
        .collect();

    RetracementLevels { levels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::bars_from_closes;

    fn swing_bars() -> Vec<Bar> {
        let mut bars = bars_from_closes(&[100.0, 120.0, 110.0]);
        bars[0].low = 90.0;
        bars[1].high = 130.0;
        bars
    }

    #[test]
    fn empty_series_has_no_levels() {
        assert!(retracement_levels(&[]).is_empty());
    }

    #[test]
    fn flat_series_has_no_levels() {
        assert!(retracement_levels(&bars_from_closes(&[50.0; 4])).is_empty());
    }

    #[test]
    fn endpoints_match_extremes() {
        let levels = retracement_levels(&swing_bars());
        assert_eq!(levels.len(), 7);
        assert_eq!(levels.get("0.0%"), Some(130.0));
        assert_eq!(levels.get("100.0%"), Some(90.0));
    }

    #[test]
    fn interior_levels_strictly_inside() {
        let levels = retracement_levels(&swing_bars());
        for level in levels.iter().filter(|l| l.ratio > 0.0 && l.ratio < 1.0) {
            assert!(level.price > 90.0 && level.price < 130.0);
        }
        // 130 - 40 * 0.5
        assert!((levels.get("50.0%").unwrap() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn serializes_as_label_to_price_map() {
        let value = serde_json::to_value(retracement_levels(&swing_bars())).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 7);
        assert_eq!(map["0.0%"], 130.0);
        assert_eq!(map["100.0%"], 90.0);
        assert_eq!(map["50.0%"], 110.0);
    }

    #[test]
    fn empty_levels_serialize_as_empty_map() {
        let value = serde_json::to_value(RetracementLevels::default()).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn ascending_order_starts_at_lowest_low() {
        let sorted = retracement_levels(&swing_bars()).ascending_by_price();
        assert_eq!(sorted[0].label, "100.0%");
        assert_eq!(sorted[6].label, "0.0%");
        assert!(sorted.windows(2).all(|w| w[0].price <= w[1].price));
    }
}
