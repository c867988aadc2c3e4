use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::NaiveDate;
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::MarketDataConfig;
use crate::error::MarketDataError;
use crate::market_data::MarketData;
use crate::model::{Bar, RawBar, validate_bars};

const SOURCE_NAME: &str = "naver";

/// Daily chart endpoint of Naver's stock API.
pub struct NaverMarketData {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl NaverMarketData {
    pub fn new(config: &MarketDataConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(5u32));
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        }
    }

    fn source_error(&self) -> MarketDataError {
        MarketDataError::Request {
            source_name: SOURCE_NAME.into(),
        }
    }
}

impl MarketData for NaverMarketData {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<MarketDataError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            // Wait for rate limiter before making the request
            self.rate_limiter.until_ready().await;

            let url = format!("{}/chart/domestic/item/{}/day", self.base_url, symbol);
            let params = [
                ("startDateTime", format!("{}0000", start.format("%Y%m%d"))),
                ("endDateTime", format!("{}2359", end.format("%Y%m%d"))),
            ];
            info!(symbol = %symbol, %start, %end, "fetching daily bars");

            let response = self
                .client
                .get(&url)
                .query(&params)
                .send()
                .await
                .change_context_lazy(|| self.source_error())
                .attach_with(|| format!("symbol: {symbol}"))?;

            if !response.status().is_success() {
                return Err(Report::new(self.source_error())
                    .attach(format!("HTTP status: {}", response.status())));
            }

            let rows: Vec<NaverDailyRow> =
                response
                    .json()
                    .await
                    .change_context(MarketDataError::ResponseParse {
                        source_name: SOURCE_NAME.into(),
                    })?;

            let bars = rows_to_bars(rows)?;
            debug!(symbol = %symbol, rows = bars.len(), "daily bars received");
            Ok(bars)
        })
    }
}

fn rows_to_bars(rows: Vec<NaverDailyRow>) -> Result<Vec<Bar>, Report<MarketDataError>> {
    let raw: Vec<RawBar> = rows.into_iter().map(NaverDailyRow::into_raw).collect();
    let mut bars = validate_bars(&raw).change_context(MarketDataError::Malformed)?;
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    Ok(bars)
}

// ── REST response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NaverDailyRow {
    local_date: Option<String>,
    open_price: Option<f64>,
    high_price: Option<f64>,
    low_price: Option<f64>,
    close_price: Option<f64>,
    accumulated_trading_volume: Option<f64>,
}

impl NaverDailyRow {
    fn into_raw(self) -> RawBar {
        RawBar {
            date: self
                .local_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok()),
            open: self.open_price,
            high: self.high_price,
            low: self.low_price,
            close: self.close_price,
            volume: self.accumulated_trading_volume,
        }
    }
}
