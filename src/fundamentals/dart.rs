use std::io::{Cursor, Read};
use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::DartConfig;
use crate::error::FundamentalsError;
use crate::fundamentals::{CompanyDirectory, FundamentalsSource, StatementAccount};
use crate::model::StockInfo;

const STATUS_OK: &str = "000";
const STATUS_NO_DATA: &str = "013";
const CORP_CODE_ENTRY: &str = "CORPCODE.xml";

/// Client for the OpenDART single-company full statement endpoint.
pub struct DartClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    report_code: String,
    fs_div: String,
}

impl DartClient {
    pub fn new(config: &DartConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            report_code: config.report_code.clone(),
            fs_div: config.fs_div.clone(),
        }
    }
}

impl FundamentalsSource for DartClient {
    fn fetch_statement(
        &self,
        corp_code: &str,
        year: i32,
    ) -> BoxFuture<'_, Result<Vec<StatementAccount>, Report<FundamentalsError>>> {
        let corp_code = corp_code.to_owned();
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(Report::new(FundamentalsError::MissingApiKey));
            }

            let url = format!("{}/api/fnlttSinglAcntAll.json", self.base_url);
            let bsns_year = year.to_string();
            info!(corp_code = %corp_code, year, report_code = %self.report_code, "requesting DART statement");

            let response = self
                .client
                .get(&url)
                .query(&[
                    ("crtfc_key", self.api_key.as_str()),
                    ("corp_code", corp_code.as_str()),
                    ("bsns_year", bsns_year.as_str()),
                    ("reprt_code", self.report_code.as_str()),
                    ("fs_div", self.fs_div.as_str()),
                ])
                .send()
                .await
                .change_context(FundamentalsError::Request)
                .attach_with(|| format!("corp_code: {corp_code}"))?;

            if !response.status().is_success() {
                return Err(Report::new(FundamentalsError::Request)
                    .attach(format!("HTTP status: {}", response.status())));
            }

            let body: DartResponse = response
                .json()
                .await
                .change_context(FundamentalsError::ResponseParse)?;

            let accounts = body.into_accounts()?;
            info!(corp_code = %corp_code, year, accounts = accounts.len(), "DART statement received");
            Ok(accounts)
        })
    }
}

/// Client for the OpenDART corp code archive (`corpCode.xml`), a zipped XML
/// list of every filer. Only entries with a stock symbol are kept.
pub struct DartCompanyDirectory {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DartCompanyDirectory {
    pub fn new(config: &DartConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        }
    }
}

impl CompanyDirectory for DartCompanyDirectory {
    fn listed_companies(
        &self,
    ) -> BoxFuture<'_, Result<Arc<[StockInfo]>, Report<FundamentalsError>>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(Report::new(FundamentalsError::MissingApiKey));
            }

            let url = format!("{}/api/corpCode.xml", self.base_url);
            info!("requesting DART corp code archive");

            let response = self
                .client
                .get(&url)
                .query(&[("crtfc_key", self.api_key.as_str())])
                .send()
                .await
                .change_context(FundamentalsError::Request)?;

            if !response.status().is_success() {
                return Err(Report::new(FundamentalsError::Request)
                    .attach(format!("HTTP status: {}", response.status())));
            }

            let archive = response
                .bytes()
                .await
                .change_context(FundamentalsError::Request)?;

            let companies = parse_corp_codes(&archive)?;
            info!(companies = companies.len(), "DART corp code archive loaded");
            Ok(companies.into())
        })
    }
}

/// Unpack the corp code archive and read its XML entry.
///
/// The entry name is matched case-insensitively.
fn parse_corp_codes(archive: &[u8]) -> Result<Vec<StockInfo>, Report<FundamentalsError>> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .change_context(FundamentalsError::ResponseParse)
        .attach("corp code response is not a zip archive")?;

    let Some(entry) = zip
        .file_names()
        .find(|name| name.eq_ignore_ascii_case(CORP_CODE_ENTRY))
        .map(str::to_owned)
    else {
        return Err(Report::new(FundamentalsError::ResponseParse)
            .attach(format!("{CORP_CODE_ENTRY} missing from archive")));
    };

    let mut xml = String::new();
    zip.by_name(&entry)
        .change_context(FundamentalsError::ResponseParse)?
        .read_to_string(&mut xml)
        .change_context(FundamentalsError::ResponseParse)
        .attach_with(|| format!("entry: {entry}"))?;

    parse_corp_xml(&xml)
}

fn parse_corp_xml(xml: &str) -> Result<Vec<StockInfo>, Report<FundamentalsError>> {
    let document = roxmltree::Document::parse(xml)
        .change_context(FundamentalsError::ResponseParse)
        .attach("corp code XML is malformed")?;

    Ok(document
        .root_element()
        .children()
        .filter(|node| node.has_tag_name("list"))
        .filter_map(|node| {
            Some(StockInfo {
                symbol: child_text(node, "stock_code")?,
                name: child_text(node, "corp_name")?,
                corp_code: Some(child_text(node, "corp_code")?),
            })
        })
        .collect())
}

/// Trimmed text of the first child named `tag`, `None` when blank.
fn child_text(node: roxmltree::Node<'_, '_>, tag: &str) -> Option<String> {
    let text = node.children().find(|c| c.has_tag_name(tag))?.text()?.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

// ── REST response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DartResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    list: Vec<DartAccount>,
}

impl DartResponse {
    fn into_accounts(self) -> Result<Vec<StatementAccount>, Report<FundamentalsError>> {
        match self.status.as_str() {
            STATUS_OK => Ok(self.list.into_iter().map(DartAccount::into_account).collect()),
            STATUS_NO_DATA => {
                warn!(message = %self.message, "DART has no statement for this request");
                Ok(Vec::new())
            }
            _ => Err(Report::new(FundamentalsError::Api {
                status: self.status,
                message: self.message,
            })),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DartAccount {
    #[serde(default)]
    account_id: String,
    account_nm: String,
    #[serde(default)]
    thstrm_amount: Option<String>,
}

impl DartAccount {
    fn into_account(self) -> StatementAccount {
        StatementAccount {
            amount: self.thstrm_amount.as_deref().and_then(parse_amount),
            account_id: self.account_id,
            account_name: self.account_nm,
        }
    }
}

/// Parse DART's comma-grouped amount strings (`"1,234"`, `"-56"`, `""`).
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    cleaned.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    const CORP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<result>
    <list>
        <corp_code>00126380</corp_code>
        <corp_name>삼성전자</corp_name>
        <stock_code>005930</stock_code>
        <modify_date>20230110</modify_date>
    </list>
    <list>
        <corp_code>00434003</corp_code>
        <corp_name>다코</corp_name>
        <stock_code> </stock_code>
        <modify_date>20170630</modify_date>
    </list>
    <list>
        <corp_code>00164779</corp_code>
        <corp_name>에스케이하이닉스</corp_name>
        <stock_code>000660</stock_code>
        <modify_date>20230303</modify_date>
    </list>
</result>"#;

    fn zipped(entry: &str, content: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(entry, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn parse_grouped_amounts() {
        assert_eq!(parse_amount("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_amount("-5,000"), Some(-5000.0));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("-"), None);
    }

    #[test]
    fn ok_response_maps_accounts() {
        let json = r#"{
            "status": "000",
            "message": "정상",
            "list": [
                {"account_id": "ifrs-full_Equity", "account_nm": "자본총계", "thstrm_amount": "363,677,865,000,000"},
                {"account_id": "ifrs-full_Revenue", "account_nm": "매출액", "thstrm_amount": ""}
            ]
        }"#;
        let response: DartResponse = serde_json::from_str(json).unwrap();
        let accounts = response.into_accounts().unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].account_id, "ifrs-full_Equity");
        assert_eq!(accounts[0].amount, Some(363_677_865_000_000.0));
        assert_eq!(accounts[1].amount, None);
    }

    #[test]
    fn no_data_status_is_empty() {
        let json = r#"{"status": "013", "message": "조회된 데이타가 없습니다."}"#;
        let response: DartResponse = serde_json::from_str(json).unwrap();
        assert!(response.into_accounts().unwrap().is_empty());
    }

    #[test]
    fn other_status_is_api_error() {
        let json = r#"{"status": "010", "message": "등록되지 않은 키입니다."}"#;
        let response: DartResponse = serde_json::from_str(json).unwrap();
        let err = response.into_accounts().unwrap_err();
        assert!(matches!(
            err.current_context(),
            FundamentalsError::Api { status, .. } if status == "010"
        ));
    }

    #[test]
    fn corp_code_archive_keeps_listed_companies() {
        let companies = parse_corp_codes(&zipped("CORPCODE.xml", CORP_XML)).unwrap();
        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].symbol, "005930");
        assert_eq!(companies[0].name, "삼성전자");
        assert_eq!(companies[0].corp_code.as_deref(), Some("00126380"));
        assert_eq!(companies[1].symbol, "000660");
        assert_eq!(companies[1].corp_code.as_deref(), Some("00164779"));
    }

    #[test]
    fn corp_code_entry_name_is_case_insensitive() {
        let companies = parse_corp_codes(&zipped("corpCode.xml", CORP_XML)).unwrap();
        assert_eq!(companies.len(), 2);
    }

    #[test]
    fn archive_without_corp_code_entry_is_rejected() {
        let err = parse_corp_codes(&zipped("other.xml", CORP_XML)).unwrap_err();
        assert!(matches!(
            err.current_context(),
            FundamentalsError::ResponseParse
        ));
    }

    #[test]
    fn non_zip_body_is_rejected() {
        let body = r#"{"status": "010", "message": "등록되지 않은 키입니다."}"#.as_bytes();
        let err = parse_corp_codes(body).unwrap_err();
        assert!(matches!(
            err.current_context(),
            FundamentalsError::ResponseParse
        ));
    }

    #[test]
    fn malformed_corp_xml_is_rejected() {
        assert!(parse_corp_xml("<result><list>").is_err());
    }
}
