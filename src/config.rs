use std::collections::HashSet;
use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::{AnalysisPeriod, StockInfo};

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_user_id() -> String {
    "guest".into()
}

fn default_period_days() -> i64 {
    90
}

fn default_history_limit() -> usize {
    5
}

fn default_market_data_url() -> String {
    "https://api.stock.naver.com".into()
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_market_cache_ttl() -> u64 {
    900
}

fn default_dart_url() -> String {
    "https://opendart.fss.or.kr".into()
}

fn default_report_code() -> String {
    "11014".into()
}

fn default_fs_div() -> String {
    "CFS".into()
}

fn default_dart_cache_ttl() -> u64 {
    3600
}

fn default_corp_code_ttl() -> u64 {
    86_400
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    pub dart: Option<DartConfig>,
    #[serde(default)]
    pub stocks: Vec<StockConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Identity under which searches and settings are stored.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_period_days")]
    pub default_period_days: i64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_market_data_url")]
    pub base_url: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_market_cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_data_url(),
            requests_per_second: default_requests_per_second(),
            cache_ttl_secs: default_market_cache_ttl(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DartConfig {
    pub api_key: String,
    #[serde(default = "default_dart_url")]
    pub base_url: String,
    #[serde(default = "default_report_code")]
    pub report_code: String,
    #[serde(default = "default_fs_div")]
    pub fs_div: String,
    #[serde(default = "default_dart_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Lifetime of the downloaded corp code directory.
    #[serde(default = "default_corp_code_ttl")]
    pub corp_code_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockConfig {
    pub symbol: String,
    pub name: String,
    pub corp_code: Option<String>,
}

impl From<&StockConfig> for StockInfo {
    fn from(stock: &StockConfig) -> Self {
        StockInfo {
            symbol: stock.symbol.clone(),
            name: stock.name.clone(),
            corp_code: stock.corp_code.clone(),
        }
    }
}

impl AppConfig {
    /// The configured default look-back. Validated at load time.
    pub fn default_period(&self) -> AnalysisPeriod {
        AnalysisPeriod::from_days(self.general.default_period_days)
            .unwrap_or(AnalysisPeriod::Months3)
    }

    pub fn stock_directory(&self) -> Vec<StockInfo> {
        self.stocks.iter().map(StockInfo::from).collect()
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_default_period(config)?;
    validate_market_data(config)?;
    validate_stocks(config)?;
    Ok(())
}

fn validation_error(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

fn validate_default_period(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let days = config.general.default_period_days;
    if AnalysisPeriod::from_days(days).is_none() {
        return Err(validation_error(format!(
            "general.default_period_days: {days} is not one of 90, 180, 365, 730"
        )));
    }
    Ok(())
}

fn validate_market_data(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.market_data.requests_per_second == 0 {
        return Err(validation_error(
            "market_data.requests_per_second must be greater than 0".into(),
        ));
    }
    Ok(())
}

fn validate_stocks(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for stock in &config.stocks {
        if !is_digits(&stock.symbol, 6) {
            return Err(validation_error(format!(
                "stocks[name={}].symbol \"{}\" must be 6 digits",
                stock.name, stock.symbol
            )));
        }
        if !seen.insert(stock.symbol.as_str()) {
            return Err(validation_error(format!(
                "stocks: duplicate symbol \"{}\"",
                stock.symbol
            )));
        }
        if let Some(corp_code) = &stock.corp_code {
            if !is_digits(corp_code, 8) {
                return Err(validation_error(format!(
                    "stocks[symbol={}].corp_code \"{}\" must be 8 digits",
                    stock.symbol, corp_code
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
data_dir = "/tmp/data"
user_id = "alice"
default_period_days = 365
history_limit = 10

[market_data]
base_url = "https://example.test"
requests_per_second = 2
cache_ttl_secs = 60

[dart]
api_key = "secret"
report_code = "11011"

[[stocks]]
symbol = "005930"
name = "삼성전자"
corp_code = "00126380"

[[stocks]]
symbol = "035720"
name = "카카오"
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.user_id, "alice");
        assert_eq!(config.default_period(), AnalysisPeriod::Year1);
        assert_eq!(config.market_data.requests_per_second, 2);
        let dart = config.dart.as_ref().unwrap();
        assert_eq!(dart.report_code, "11011");
        assert_eq!(dart.fs_div, "CFS");
        assert_eq!(dart.corp_code_ttl_secs, 86_400);
        assert_eq!(config.stocks.len(), 2);
        assert_eq!(config.stock_directory()[1].corp_code, None);
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let toml = r#"
[general]
"#;
        let config = parse(toml);
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.data_dir, "./data");
        assert_eq!(config.general.user_id, "guest");
        assert_eq!(config.general.default_period_days, 90);
        assert_eq!(config.general.history_limit, 5);
        assert_eq!(config.market_data.requests_per_second, 5);
        assert_eq!(config.market_data.cache_ttl_secs, 900);
        assert!(config.dart.is_none());
        assert!(config.stocks.is_empty());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unsupported_default_period_rejected() {
        let config = parse(
            r#"
[general]
default_period_days = 30
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let config = parse(
            r#"
[general]

[market_data]
requests_per_second = 0
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn non_numeric_symbol_rejected() {
        let config = parse(
            r#"
[general]

[[stocks]]
symbol = "AAPL"
name = "Apple"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn duplicate_symbols_rejected() {
        let config = parse(
            r#"
[general]

[[stocks]]
symbol = "005930"
name = "삼성전자"

[[stocks]]
symbol = "005930"
name = "삼성전자우"
"#,
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn short_corp_code_rejected() {
        let config = parse(
            r#"
[general]

[[stocks]]
symbol = "005930"
name = "삼성전자"
corp_code = "126380"
"#,
        );
        assert!(validate(&config).is_err());
    }
}
