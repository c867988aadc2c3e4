mod analysis;
mod cache;
mod config;
mod engine;
mod error;
mod format;
mod fundamentals;
mod indicator;
mod market_data;
mod model;
mod presenter;
mod signal;
mod storage;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::info;
use tracing_subscriber::EnvFilter;

use analysis::Analyzer;
use cache::{CachedCompanyDirectory, CachedFundamentals, CachedMarketData};
use config::AppConfig;
use fundamentals::dart::{DartClient, DartCompanyDirectory};
use fundamentals::{CompanyDirectory, FundamentalsSource};
use market_data::MarketData;
use market_data::naver::NaverMarketData;
use model::AnalysisPeriod;
use presenter::Presenter;
use presenter::json::JsonPresenter;
use presenter::terminal::TerminalPresenter;
use storage::Storage;
use storage::sqlite::SqliteStorage;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("analysis failed")]
    Analysis,
    #[display("invalid argument: {reason}")]
    Argument { reason: String },
}

#[derive(Parser)]
#[command(name = "stock-insight", about = "Technical and fundamental reading of domestic stocks")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one stock by name or 6-digit symbol
    Analyze {
        query: String,
        /// Look-back window: 3m, 6m, 1y or 2y
        #[arg(short, long)]
        period: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search configured stocks and, with a DART key, every listed company
    Search { query: String },
    /// Show recently analyzed stocks
    History {
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let db_path = format!("{}/stock-insight.db", config.general.data_dir);
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::open(Path::new(&db_path))
            .await
            .change_context(AppError::Storage)?,
    );

    let analyzer = Analyzer::new(
        build_market_data(&config),
        build_fundamentals(&config),
        build_company_directory(&config),
        storage,
        config.stock_directory(),
        &config.general.user_id,
        config.default_period(),
    );

    match cli.command {
        Command::Analyze {
            query,
            period,
            json,
        } => {
            let period = period.as_deref().map(parse_period).transpose()?;
            let today = chrono::Local::now().date_naive();
            let report = analyzer
                .analyze(&query, period, today)
                .await
                .change_context(AppError::Analysis)?;
            let presenter: Box<dyn Presenter> = if json {
                Box::new(JsonPresenter)
            } else {
                Box::new(TerminalPresenter)
            };
            println!("{}", presenter.render(&report));
        }
        Command::Search { query } => {
            let hits = analyzer.search(&query).await;
            if hits.is_empty() {
                println!("'{query}'에 해당하는 종목이 없습니다.");
            }
            for stock in hits {
                println!("{}\t{}", stock.symbol, stock.name);
            }
        }
        Command::History { limit } => {
            let limit = limit.unwrap_or(config.general.history_limit);
            let records = analyzer
                .history(limit)
                .await
                .change_context(AppError::Analysis)?;
            if records.is_empty() {
                println!("최근 검색 기록이 없습니다.");
            }
            for record in records {
                println!(
                    "{}\t{}\t{}",
                    record.searched_at.format("%Y-%m-%d %H:%M"),
                    record.symbol,
                    record.company_name
                );
            }
        }
    }

    Ok(())
}

fn parse_period(raw: &str) -> Result<AnalysisPeriod, Report<AppError>> {
    AnalysisPeriod::from_str(raw).ok_or_else(|| {
        Report::new(AppError::Argument {
            reason: format!("unknown period \"{raw}\" (expected 3m, 6m, 1y or 2y)"),
        })
    })
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

fn build_market_data(config: &AppConfig) -> Arc<dyn MarketData> {
    let market = &config.market_data;
    Arc::new(CachedMarketData::new(
        NaverMarketData::new(market),
        Duration::from_secs(market.cache_ttl_secs),
    ))
}

fn build_fundamentals(config: &AppConfig) -> Option<Arc<dyn FundamentalsSource>> {
    let Some(dart) = &config.dart else {
        info!("no [dart] section configured, fundamentals disabled");
        return None;
    };
    Some(Arc::new(CachedFundamentals::new(
        DartClient::new(dart),
        &dart.report_code,
        Duration::from_secs(dart.cache_ttl_secs),
    )))
}

fn build_company_directory(config: &AppConfig) -> Option<Arc<dyn CompanyDirectory>> {
    let dart = config.dart.as_ref()?;
    Some(Arc::new(CachedCompanyDirectory::new(
        DartCompanyDirectory::new(dart),
        Duration::from_secs(dart.corp_code_ttl_secs),
    )))
}
