use std::fmt::Write;

use crate::analysis::{AnalysisReport, FundamentalView, Section, TechnicalView};
use crate::format::group_thousands;
use crate::presenter::Presenter;

/// Plain text for an interactive terminal.
pub struct TerminalPresenter;

impl Presenter for TerminalPresenter {
    fn render(&self, report: &AnalysisReport) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== {} ({}) | 기간 {} ({} ~ {}) ===",
            report.stock.name, report.stock.symbol, report.period, report.start, report.end
        );

        out.push_str("\n[기술적 분석]\n");
        match &report.technical {
            Section::Available(view) => write_technical(&mut out, view),
            Section::Unavailable { reason } => {
                let _ = writeln!(out, "기술적 분석을 제공할 수 없습니다: {reason}");
            }
        }

        out.push_str("\n[재무 분석]\n");
        match &report.fundamentals {
            Section::Available(view) => write_fundamentals(&mut out, view),
            Section::Unavailable { reason } => {
                let _ = writeln!(out, "재무 분석을 제공할 수 없습니다: {reason}");
            }
        }
        out
    }
}

fn write_technical(out: &mut String, view: &TechnicalView) {
    let latest = &view.latest.bar;
    let _ = writeln!(
        out,
        "{} 종가 {}원, 거래량 {}주 (거래일 {}일)",
        latest.date,
        group_thousands(latest.close),
        group_thousands(latest.volume as f64),
        view.bar_count
    );
    if let Some(trend) = &view.trend {
        let _ = writeln!(out, "추세: {trend}");
    }
    if view.signals.is_empty() {
        out.push_str("해석할 수 있는 신호가 없습니다.\n");
    }
    for signal in &view.signals {
        let _ = writeln!(out, "{signal}");
    }
    if !view.levels.is_empty() {
        let levels: Vec<String> = view
            .levels
            .iter()
            .map(|l| format!("{} {}", l.label, group_thousands(l.price)))
            .collect();
        let _ = writeln!(out, "피보나치 레벨: {}", levels.join(" | "));
    }
}

fn write_fundamentals(out: &mut String, view: &FundamentalView) {
    let _ = writeln!(out, "{}년 공시 재무제표 기준", view.year);
    out.push_str(&view.narrative);
    out.push('\n');
}
