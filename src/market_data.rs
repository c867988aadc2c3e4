pub mod naver;

use chrono::NaiveDate;
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::MarketDataError;
use crate::model::Bar;

/// Abstraction over a daily price source for listed domestic stocks.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn MarketData`).
pub trait MarketData: Send + Sync {
    /// Human-readable name used in logs and errors.
    fn source_name(&self) -> &str;

    /// Fetch daily bars for `symbol` between `start` and `end` (inclusive),
    /// oldest first. An empty vector means no trading data in the range.
    fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<MarketDataError>>>;
}
