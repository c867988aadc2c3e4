use tracing::warn;

use crate::analysis::AnalysisReport;
use crate::presenter::Presenter;

/// Pretty-printed JSON of the full report.
pub struct JsonPresenter;

impl Presenter for JsonPresenter {
    fn render(&self, report: &AnalysisReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize report");
            serde_json::json!({ "error": e.to_string() }).to_string()
        })
    }
}
