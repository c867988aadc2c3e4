use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use error_stack::{Report, ResultExt};
use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::engine::enrich;
use crate::error::AnalysisError;
use crate::fundamentals::{
    CompanyDirectory, FundamentalsSource, RatioSheet, interpret_fundamentals,
    ratios_from_statement,
};
use crate::indicator::fibonacci::RetracementLevels;
use crate::market_data::MarketData;
use crate::model::{AnalysisPeriod, EnrichedBar, SearchRecord, StockInfo};
use crate::signal::{Signal, interpret_technical, trend_summary};
use crate::storage::{ANALYSIS_PERIOD_KEY, Storage};

const MAX_SEARCH_RESULTS: usize = 20;

/// One part of a report, or why it could not be produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Section<T> {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TechnicalView {
    pub bar_count: usize,
    pub latest: EnrichedBar,
    pub trend: Option<String>,
    pub signals: Vec<Signal>,
    pub levels: RetracementLevels,
}

#[derive(Debug, Clone, Serialize)]
pub struct FundamentalView {
    pub year: i32,
    pub sheet: RatioSheet,
    pub narrative: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub request_id: String,
    pub stock: StockInfo,
    pub period: AnalysisPeriod,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub technical: Section<TechnicalView>,
    pub fundamentals: Section<FundamentalView>,
}

/// Case-insensitive substring search over name and symbol.
pub fn search_stocks<'a>(directory: &'a [StockInfo], query: &str) -> Vec<&'a StockInfo> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    directory
        .iter()
        .filter(|s| s.name.to_lowercase().contains(&needle) || s.symbol.contains(&needle))
        .take(MAX_SEARCH_RESULTS)
        .collect()
}

/// Resolve a free-form query to one stock.
///
/// The configured directory is tried first, then the listed companies. In
/// each an exact symbol wins, then a unique search hit. A 6-digit query
/// missing from both is still accepted as a bare symbol.
pub fn resolve_stock(
    configured: &[StockInfo],
    listed: &[StockInfo],
    query: &str,
) -> Option<StockInfo> {
    let query = query.trim();
    find_stock(configured, query)
        .or_else(|| find_stock(listed, query))
        .or_else(|| bare_symbol(query))
}

fn find_stock(directory: &[StockInfo], query: &str) -> Option<StockInfo> {
    if let Some(stock) = directory.iter().find(|s| s.symbol == query) {
        return Some(stock.clone());
    }
    match search_stocks(directory, query).as_slice() {
        [only] => Some((*only).clone()),
        _ => None,
    }
}

fn bare_symbol(query: &str) -> Option<StockInfo> {
    (query.len() == 6 && query.bytes().all(|b| b.is_ascii_digit())).then(|| StockInfo {
        symbol: query.to_owned(),
        name: format!("종목({query})"),
        corp_code: None,
    })
}

/// Collaborators of one user session.
pub struct Analyzer {
    market_data: Arc<dyn MarketData>,
    fundamentals: Option<Arc<dyn FundamentalsSource>>,
    companies: Option<Arc<dyn CompanyDirectory>>,
    storage: Arc<dyn Storage>,
    directory: Vec<StockInfo>,
    user_id: String,
    default_period: AnalysisPeriod,
}

impl Analyzer {
    pub fn new(
        market_data: Arc<dyn MarketData>,
        fundamentals: Option<Arc<dyn FundamentalsSource>>,
        companies: Option<Arc<dyn CompanyDirectory>>,
        storage: Arc<dyn Storage>,
        directory: Vec<StockInfo>,
        user_id: &str,
        default_period: AnalysisPeriod,
    ) -> Self {
        Self {
            market_data,
            fundamentals,
            companies,
            storage,
            directory,
            user_id: user_id.to_owned(),
            default_period,
        }
    }

    /// Configured stocks first, then listed companies not already shown.
    pub async fn search(&self, query: &str) -> Vec<StockInfo> {
        let mut hits: Vec<StockInfo> = search_stocks(&self.directory, query)
            .into_iter()
            .cloned()
            .collect();
        if query.trim().is_empty() || hits.len() >= MAX_SEARCH_RESULTS {
            return hits;
        }

        let listed = self.listed_companies().await;
        for stock in search_stocks(&listed, query) {
            if hits.len() >= MAX_SEARCH_RESULTS {
                break;
            }
            if !hits.iter().any(|hit| hit.symbol == stock.symbol) {
                hits.push(stock.clone());
            }
        }
        hits
    }

    /// The listed-company directory, empty when it is not configured or
    /// cannot be loaded.
    async fn listed_companies(&self) -> Arc<[StockInfo]> {
        let Some(companies) = &self.companies else {
            return Vec::new().into();
        };
        match companies.listed_companies().await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = ?e, "company directory unavailable");
                Vec::new().into()
            }
        }
    }

    async fn resolve(&self, query: &str) -> Option<StockInfo> {
        if let Some(stock) = find_stock(&self.directory, query.trim()) {
            return Some(stock);
        }
        let listed = self.listed_companies().await;
        resolve_stock(&self.directory, &listed, query)
    }

    /// The configured corp code, or the listed directory's entry for the symbol.
    async fn corp_code(&self, stock: &StockInfo) -> Option<String> {
        if let Some(corp_code) = &stock.corp_code {
            return Some(corp_code.clone());
        }
        let listed = self.listed_companies().await;
        let corp_code = listed
            .iter()
            .find(|s| s.symbol == stock.symbol)
            .and_then(|s| s.corp_code.clone());
        if let Some(corp_code) = &corp_code {
            info!(symbol = %stock.symbol, corp_code = %corp_code, "corp code found in company directory");
        }
        corp_code
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<SearchRecord>, Report<AnalysisError>> {
        self.storage
            .recent_searches(&self.user_id, limit)
            .await
            .change_context(AnalysisError::Storage)
    }

    /// Explicit choice first (and remembered), then the stored preference,
    /// then the configured default.
    pub async fn resolve_period(&self, explicit: Option<AnalysisPeriod>) -> AnalysisPeriod {
        if let Some(period) = explicit {
            let days = period.days().to_string();
            if let Err(e) = self
                .storage
                .save_setting(&self.user_id, ANALYSIS_PERIOD_KEY, &days)
                .await
            {
                warn!(error = ?e, "failed to remember analysis period");
            }
            return period;
        }

        match self.storage.get_setting(&self.user_id, ANALYSIS_PERIOD_KEY).await {
            Ok(Some(stored)) => stored
                .parse::<i64>()
                .ok()
                .and_then(AnalysisPeriod::from_days)
                .unwrap_or_else(|| {
                    warn!(stored = %stored, "ignoring unsupported stored analysis period");
                    self.default_period
                }),
            Ok(None) => self.default_period,
            Err(e) => {
                warn!(error = ?e, "failed to read analysis period, using default");
                self.default_period
            }
        }
    }

    /// Run both pipelines for `query` as of `today`.
    pub async fn analyze(
        &self,
        query: &str,
        period: Option<AnalysisPeriod>,
        today: NaiveDate,
    ) -> Result<AnalysisReport, Report<AnalysisError>> {
        let Some(stock) = self.resolve(query).await else {
            let candidates = self.search(query).await.len();
            return Err(Report::new(AnalysisError::UnknownStock {
                query: query.to_owned(),
            })
            .attach(format!("candidates: {candidates}")));
        };

        let request_id = Uuid::new_v4();
        let span = info_span!("analysis", %request_id, symbol = %stock.symbol);
        self.analyze_stock(stock, period, today, request_id)
            .instrument(span)
            .await
    }

    async fn analyze_stock(
        &self,
        stock: StockInfo,
        period: Option<AnalysisPeriod>,
        today: NaiveDate,
        request_id: Uuid,
    ) -> Result<AnalysisReport, Report<AnalysisError>> {
        let period = self.resolve_period(period).await;
        info!(name = %stock.name, %period, "analysis started");

        if let Err(e) = self
            .storage
            .save_search(&self.user_id, &stock.symbol, &stock.name)
            .await
        {
            warn!(error = ?e, "failed to record search");
        }

        let start = today - Duration::days(period.days());
        let (technical, fundamentals) = tokio::join!(
            self.technical(&stock, start, today),
            self.fundamentals(&stock, today.year() - 1),
        );

        info!("analysis finished");
        Ok(AnalysisReport {
            request_id: request_id.to_string(),
            stock,
            period,
            start,
            end: today,
            technical,
            fundamentals,
        })
    }

    async fn technical(
        &self,
        stock: &StockInfo,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Section<TechnicalView> {
        let bars = match self
            .market_data
            .fetch_daily_bars(&stock.symbol, start, end)
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!(
                    error = ?e,
                    source = self.market_data.source_name(),
                    "price data unavailable"
                );
                return Section::unavailable(format!(
                    "주가 데이터를 가져오지 못했습니다: {}",
                    e.current_context()
                ));
            }
        };

        let (series, levels) = match enrich(&bars) {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!(error = ?e, "technical indicators could not be computed");
                return Section::unavailable(format!(
                    "기술적 지표 계산 실패: {}",
                    e.current_context()
                ));
            }
        };

        let Some(latest) = series.last() else {
            return Section::unavailable("해당 기간의 거래 데이터가 없습니다.");
        };

        Section::Available(TechnicalView {
            bar_count: series.len(),
            trend: trend_summary(latest),
            signals: interpret_technical(latest, &series, &levels),
            latest: latest.clone(),
            levels,
        })
    }

    async fn fundamentals(&self, stock: &StockInfo, year: i32) -> Section<FundamentalView> {
        let Some(source) = &self.fundamentals else {
            return Section::unavailable("DART API 키가 설정되지 않았습니다.");
        };
        let Some(corp_code) = self.corp_code(stock).await else {
            return Section::unavailable("기업 고유번호(corp_code)를 찾을 수 없는 종목입니다.");
        };

        let sheet = match source.fetch_statement(&corp_code, year).await {
            Ok(accounts) => ratios_from_statement(&accounts),
            Err(e) => {
                warn!(error = ?e, corp_code = %corp_code, year, "financial statement unavailable");
                RatioSheet::Unusable {
                    reason: e.current_context().to_string(),
                }
            }
        };

        Section::Available(FundamentalView {
            year,
            narrative: interpret_fundamentals(&sheet, &stock.name),
            sheet,
        })
    }
}
