pub mod json;
pub mod terminal;

use crate::analysis::AnalysisReport;

/// Renders a finished report for the user.
pub trait Presenter: Send + Sync {
    fn render(&self, report: &AnalysisReport) -> String;
}
