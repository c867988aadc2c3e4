pub mod sqlite;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::SearchRecord;

/// Setting key under which the preferred analysis period (in days) is kept.
pub const ANALYSIS_PERIOD_KEY: &str = "analysis_period_days";

/// Per-user persistence of search history and preferences.
pub trait Storage: Send + Sync {
    fn save_search(
        &self,
        user_id: &str,
        symbol: &str,
        company_name: &str,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// Most recent search per symbol, newest first.
    fn recent_searches(
        &self,
        user_id: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SearchRecord>, Report<StorageError>>>;

    fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> BoxFuture<'_, Result<Option<String>, Report<StorageError>>>;

    fn save_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &str,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;
}
