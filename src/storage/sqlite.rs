use chrono::{DateTime, SecondsFormat, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::StorageError;
use crate::model::SearchRecord;
use crate::storage::Storage;

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

impl Storage for SqliteStorage {
    fn save_search(
        &self,
        user_id: &str,
        symbol: &str,
        company_name: &str,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let user_id = user_id.to_string();
        let symbol = symbol.to_string();
        let company_name = company_name.to_string();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO search_history (user_id, symbol, company_name, searched_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&user_id)
            .bind(&symbol)
            .bind(&company_name)
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .change_context(StorageError::Insert)
            .attach_with(|| format!("symbol: {symbol}"))?;
            debug!(user_id = %user_id, symbol = %symbol, "search recorded");
            Ok(())
        })
    }

    fn recent_searches(
        &self,
        user_id: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SearchRecord>, Report<StorageError>>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let rows: Vec<(String, String, String)> = sqlx::query_as(
                "SELECT h.symbol, h.company_name, h.searched_at FROM search_history h \
                 WHERE h.user_id = ? AND h.id = ( \
                     SELECT latest.id FROM search_history latest \
                     WHERE latest.user_id = h.user_id AND latest.symbol = h.symbol \
                     ORDER BY latest.searched_at DESC, latest.id DESC LIMIT 1) \
                 ORDER BY h.searched_at DESC, h.id DESC \
                 LIMIT ?",
            )
            .bind(&user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            Ok(rows
                .into_iter()
                .map(|(symbol, company_name, searched_at)| SearchRecord {
                    symbol,
                    company_name,
                    searched_at: parse_time_utc(&searched_at),
                })
                .collect())
        })
    }

    fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> BoxFuture<'_, Result<Option<String>, Report<StorageError>>> {
        let user_id = user_id.to_string();
        let key = key.to_string();
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM user_settings WHERE user_id = ? AND key = ?")
                    .bind(&user_id)
                    .bind(&key)
                    .fetch_optional(&self.pool)
                    .await
                    .change_context(StorageError::Query)
                    .attach_with(|| format!("setting: {key}"))?;
            Ok(row.map(|(value,)| value))
        })
    }

    fn save_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let user_id = user_id.to_string();
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO user_settings (user_id, key, value, updated_at) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT (user_id, key) DO UPDATE SET \
                 value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(&user_id)
            .bind(&key)
            .bind(&value)
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .change_context(StorageError::Insert)
            .attach_with(|| format!("setting: {key}"))?;
            Ok(())
        })
    }
}

// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time_utc(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
pub(crate) async fn in_memory_storage() -> SqliteStorage {
    // a single connection keeps every query on the same in-memory database
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .create_if_missing(true);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    SqliteStorage { pool }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ANALYSIS_PERIOD_KEY;

    #[tokio::test]
    async fn recent_searches_latest_per_symbol_newest_first() {
        let storage = in_memory_storage().await;
        storage.save_search("guest", "005930", "삼성전자").await.unwrap();
        storage.save_search("guest", "035720", "카카오").await.unwrap();
        storage.save_search("guest", "005930", "삼성전자").await.unwrap();
        storage.save_search("other", "000660", "SK하이닉스").await.unwrap();

        let recent = storage.recent_searches("guest", 10).await.unwrap();
        let symbols: Vec<&str> = recent.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["005930", "035720"]);
        assert_eq!(recent[0].company_name, "삼성전자");
    }

    #[tokio::test]
    async fn recent_searches_respects_limit() {
        let storage = in_memory_storage().await;
        for symbol in ["000001", "000002", "000003"] {
            storage.save_search("guest", symbol, "종목").await.unwrap();
        }
        let recent = storage.recent_searches("guest", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].symbol, "000003");
    }

    #[tokio::test]
    async fn empty_history_is_empty() {
        let storage = in_memory_storage().await;
        assert!(storage.recent_searches("guest", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn setting_round_trip_and_overwrite() {
        let storage = in_memory_storage().await;
        assert_eq!(
            storage.get_setting("guest", ANALYSIS_PERIOD_KEY).await.unwrap(),
            None
        );

        storage
            .save_setting("guest", ANALYSIS_PERIOD_KEY, "180")
            .await
            .unwrap();
        storage
            .save_setting("guest", ANALYSIS_PERIOD_KEY, "365")
            .await
            .unwrap();

        assert_eq!(
            storage.get_setting("guest", ANALYSIS_PERIOD_KEY).await.unwrap(),
            Some("365".to_string())
        );
        assert_eq!(
            storage.get_setting("other", ANALYSIS_PERIOD_KEY).await.unwrap(),
            None
        );
    }

    #[test]
    fn timestamps_sort_as_text() {
        let earlier = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(timestamp(earlier) < timestamp(later));
        assert_eq!(parse_time_utc(&timestamp(earlier)), earlier);
    }
}
