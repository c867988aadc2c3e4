use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum MarketDataError {
    #[display("request to {source_name} failed")]
    Request { source_name: String },
    #[display("failed to parse response from {source_name}")]
    ResponseParse { source_name: String },
    #[display("market data contained malformed bars")]
    Malformed,
}

#[derive(Debug, Display, Error)]
pub enum FundamentalsError {
    #[display("DART api key is not configured")]
    MissingApiKey,
    #[display("request to DART failed")]
    Request,
    #[display("failed to parse DART response")]
    ResponseParse,
    #[display("DART returned status {status}: {message}")]
    Api { status: String, message: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to query data")]
    Query,
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("malformed input: {reason}")]
    MalformedInput { reason: String },
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum AnalysisError {
    #[display("no stock matches \"{query}\"")]
    UnknownStock { query: String },
    #[display("storage error during analysis")]
    Storage,
}
