use crate::domain::analysis::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Rendered delivery document. `html` is a fragment; delivery channels add
/// their own page chrome around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub html: String,
}

/// Renders an analysis to an HTML fragment.
///
/// Pure and deterministic. Empty fields produce empty sections, never an error.
/// Model text is escaped so it cannot inject markup into the email.
pub fn render_report(analysis: &AnalysisResult) -> ReportDocument {
    let mut html = String::with_capacity(1024);

    html.push_str("<h1>Analytics Report</h1>\n");

    html.push_str("<h2>Executive Summary</h2>\n");
    let _ = writeln!(html, "<p>{}</p>", escape(&analysis.summary));

    html.push_str("<h2>Key Findings</h2>\n<ul>\n");
    for finding in &analysis.key_findings {
        let _ = writeln!(html, "  <li>{}</li>", escape(finding));
    }
    html.push_str("</ul>\n");

    html.push_str("<h3>Top Page</h3>\n");
    let _ = writeln!(
        html,
        "<p><strong>{}</strong></p>",
        escape(&analysis.top_performing_page)
    );

    html.push_str(
        "<div style=\"background:#f0f9ff; padding:15px; border-radius:5px; margin-top:20px;\">\n",
    );
    html.push_str("  <strong>Strategic Recommendation:</strong>\n");
    let _ = writeln!(
        html,
        "  <p style=\"margin-top:5px;\">{}</p>",
        escape(&analysis.strategic_recommendation)
    );
    html.push_str("</div>\n");

    ReportDocument { html }
}

pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
