use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use error_stack::Report;
use futures::future::BoxFuture;
use tracing::debug;

use crate::error::{FundamentalsError, MarketDataError};
use crate::fundamentals::{CompanyDirectory, FundamentalsSource, StatementAccount};
use crate::market_data::MarketData;
use crate::model::{Bar, StockInfo};

/// In-memory cache whose entries expire `ttl` after insertion.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value if it has not expired yet.
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some((expires_at, value)) if now < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Expired entries of every key are dropped before the insert, so keys
    /// that are never read again do not pile up.
    fn put_at(&self, key: K, value: V, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, (expires_at, _)| now < *expires_at);
        entries.insert(key, (now + self.ttl, value));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Daily-bar source that serves repeated requests from a `TtlCache`.
pub struct CachedMarketData<M> {
    inner: M,
    cache: TtlCache<(String, NaiveDate, NaiveDate), Vec<Bar>>,
}

impl<M: MarketData> CachedMarketData<M> {
    pub fn new(inner: M, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }
}

impl<M: MarketData> MarketData for CachedMarketData<M> {
    fn source_name(&self) -> &str {
        self.inner.source_name()
    }

    fn fetch_daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BoxFuture<'_, Result<Vec<Bar>, Report<MarketDataError>>> {
        let key = (symbol.to_owned(), start, end);
        Box::pin(async move {
            if let Some(bars) = self.cache.get(&key) {
                debug!(symbol = %key.0, "daily bars served from cache");
                return Ok(bars);
            }
            let bars = self.inner.fetch_daily_bars(&key.0, start, end).await?;
            self.cache.put(key, bars.clone());
            Ok(bars)
        })
    }
}

/// Filing source that serves repeated requests from a `TtlCache`.
pub struct CachedFundamentals<F> {
    inner: F,
    report_code: String,
    cache: TtlCache<(String, i32, String), Vec<StatementAccount>>,
}

impl<F: FundamentalsSource> CachedFundamentals<F> {
    pub fn new(inner: F, report_code: &str, ttl: Duration) -> Self {
        Self {
            inner,
            report_code: report_code.to_owned(),
            cache: TtlCache::new(ttl),
        }
    }
}

impl<F: FundamentalsSource> FundamentalsSource for CachedFundamentals<F> {
    fn fetch_statement(
        &self,
        corp_code: &str,
        year: i32,
    ) -> BoxFuture<'_, Result<Vec<StatementAccount>, Report<FundamentalsError>>> {
        let key = (corp_code.to_owned(), year, self.report_code.clone());
        Box::pin(async move {
            if let Some(accounts) = self.cache.get(&key) {
                debug!(corp_code = %key.0, year, "statement served from cache");
                return Ok(accounts);
            }
            let accounts = self.inner.fetch_statement(&key.0, year).await?;
            self.cache.put(key, accounts.clone());
            Ok(accounts)
        })
    }
}

/// Company directory that downloads the listing once per `ttl`.
pub struct CachedCompanyDirectory<D> {
    inner: D,
    cache: TtlCache<(), Arc<[StockInfo]>>,
}

impl<D: CompanyDirectory> CachedCompanyDirectory<D> {
    pub fn new(inner: D, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }
}

impl<D: CompanyDirectory> CompanyDirectory for CachedCompanyDirectory<D> {
    fn listed_companies(
        &self,
    ) -> BoxFuture<'_, Result<Arc<[StockInfo]>, Report<FundamentalsError>>> {
        Box::pin(async move {
            if let Some(companies) = self.cache.get(&()) {
                debug!(companies = companies.len(), "company directory served from cache");
                return Ok(companies);
            }
            let companies = self.inner.listed_companies().await?;
            self.cache.put((), Arc::clone(&companies));
            Ok(companies)
        })
    }
}
