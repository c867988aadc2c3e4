pub mod dart;

use std::sync::Arc;

use error_stack::Report;
use futures::future::BoxFuture;
use serde::Serialize;
use tracing::debug;

use crate::error::FundamentalsError;
use crate::format::group_thousands;
use crate::model::StockInfo;

const EQUITY_ACCOUNTS: &[&str] = &["ifrs-full_Equity", "자본총계"];
const LIABILITY_ACCOUNTS: &[&str] = &["ifrs-full_Liabilities", "부채총계"];
const NET_INCOME_ACCOUNTS: &[&str] = &["ifrs-full_ProfitLoss", "당기순이익"];
const SALES_ACCOUNTS: &[&str] = &["ifrs-full_Revenue", "매출액"];

/// One line of a financial statement filing.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementAccount {
    pub account_id: String,
    pub account_name: String,
    /// Current-term amount, `None` when the filing left it blank.
    pub amount: Option<f64>,
}

/// Source of annual financial statement filings.
pub trait FundamentalsSource: Send + Sync {
    /// Fetch the accounts of one company's filing for `year`.
    ///
    /// An empty vector means the filing does not exist.
    fn fetch_statement(
        &self,
        corp_code: &str,
        year: i32,
    ) -> BoxFuture<'_, Result<Vec<StatementAccount>, Report<FundamentalsError>>>;
}

/// Every listed company together with its filing code.
pub trait CompanyDirectory: Send + Sync {
    /// Companies with a stock symbol. Unlisted filers are left out.
    fn listed_companies(
        &self,
    ) -> BoxFuture<'_, Result<Arc<[StockInfo]>, Report<FundamentalsError>>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FinancialRatios {
    pub roe_pct: Option<f64>,
    pub debt_ratio_pct: Option<f64>,
    pub sales: Option<f64>,
}

impl FinancialRatios {
    pub fn is_empty(&self) -> bool {
        self.roe_pct.is_none() && self.debt_ratio_pct.is_none() && self.sales.is_none()
    }
}

/// Ratios ready for interpretation, or the reason they cannot be used.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RatioSheet {
    Available(FinancialRatios),
    Unusable { reason: String },
}

/// Derive ROE, debt ratio and sales from a filing.
///
/// Accounts are matched on their exact IFRS id or exact Korean name.
pub fn ratios_from_statement(accounts: &[StatementAccount]) -> RatioSheet {
    if accounts.is_empty() {
        return RatioSheet::Unusable {
            reason: "재무제표 데이터 없음".into(),
        };
    }

    let equity = find_amount(accounts, EQUITY_ACCOUNTS);
    let liabilities = find_amount(accounts, LIABILITY_ACCOUNTS);
    let net_income = find_amount(accounts, NET_INCOME_ACCOUNTS);
    let sales = find_amount(accounts, SALES_ACCOUNTS);
    debug!(?equity, ?liabilities, ?net_income, ?sales, "statement amounts");

    let percent_of_equity = |numerator: Option<f64>| match (numerator, equity) {
        (Some(n), Some(e)) if e != 0.0 => Some(n / e * 100.0),
        _ => None,
    };

    RatioSheet::Available(FinancialRatios {
        roe_pct: percent_of_equity(net_income),
        debt_ratio_pct: percent_of_equity(liabilities),
        sales,
    })
}

fn find_amount(accounts: &[StatementAccount], keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        accounts
            .iter()
            .find(|a| a.account_id == *key || a.account_name == *key)
            .and_then(|a| a.amount)
    })
}

/// Narrative reading of the ratios: ROE, then debt ratio, then sales, then a
/// disclaimer.
pub fn interpret_fundamentals(sheet: &RatioSheet, company_name: &str) -> String {
    let ratios = match sheet {
        RatioSheet::Unusable { reason } => {
            return format!("{company_name}의 재무 지표를 해석할 수 없습니다. ({reason})");
        }
        RatioSheet::Available(ratios) if ratios.is_empty() => {
            return format!("{company_name}의 재무 지표를 해석할 수 없습니다. (데이터 부족)");
        }
        RatioSheet::Available(ratios) => ratios,
    };

    let mut lines = vec![format!("{company_name} 재무 분석 해석")];
    lines.push(roe_sentence(ratios.roe_pct));
    lines.push(debt_ratio_sentence(ratios.debt_ratio_pct));
    lines.push(match ratios.sales {
        Some(sales) => format!(
            "- 최근 보고된 매출액은 약 {}원입니다.",
            group_thousands(sales)
        ),
        None => "- 최근 보고된 매출액 정보를 가져오지 못했거나 유효하지 않습니다.".into(),
    });
    lines.push(String::new());
    lines.push(
        "주의: 위 해석은 제공된 수치를 기반으로 한 일반적인 의견이며, 투자 결정은 다양한 정보를 종합적으로 고려하여 신중하게 이루어져야 합니다."
            .into(),
    );
    lines.join("\n")
}

fn roe_sentence(roe: Option<f64>) -> String {
    match roe {
        Some(roe) if roe > 15.0 => format!(
            "- ROE(자기자본이익률)는 {roe:.2}%로, 비교적 높은 수익성을 보입니다. 자기자본 대비 이익 창출 능력이 우수합니다."
        ),
        Some(roe) if roe >= 5.0 => {
            format!("- ROE(자기자본이익률)는 {roe:.2}%로, 보통 수준의 수익성을 보입니다.")
        }
        Some(roe) => format!(
            "- ROE(자기자본이익률)는 {roe:.2}%로, 다소 낮은 수익성을 보입니다. 투자 대비 효율성 개선이 필요할 수 있습니다."
        ),
        None => "- ROE 정보를 가져오지 못했거나 유효하지 않습니다.".into(),
    }
}

fn debt_ratio_sentence(debt_ratio: Option<f64>) -> String {
    match debt_ratio {
        Some(ratio) if ratio < 100.0 => format!(
            "- 부채비율은 {ratio:.2}%로, 매우 안정적인 재무 구조를 가지고 있습니다. 타인자본 의존도가 낮습니다."
        ),
        Some(ratio) if ratio < 200.0 => format!(
            "- 부채비율은 {ratio:.2}%로, 적정 수준이지만 재무 안정성을 지속적으로 확인할 필요가 있습니다."
        ),
        Some(ratio) => format!(
            "- 부채비율은 {ratio:.2}%로, 높은 수준입니다. 재무적 위험 관리에 유의해야 합니다."
        ),
        None => "- 부채비율 정보를 가져오지 못했거나 유효하지 않습니다.".into(),
    }
}
