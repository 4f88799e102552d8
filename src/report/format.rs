//! Plain-text formatting for terminal output.
//!
//! Formatting lives here so the pipeline and the models stay free of
//! presentation details. Missing numbers print as `-`.

use crate::domain::{RankingRecord, is_missing};
use crate::eval::ModelComparison;
use crate::report::RunSummary;

/// Dataset, correction, selection and per-model nowcasts of one run.
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    out.push_str("=== nowcast - mixed-frequency nowcast ===\n");
    out.push_str(&format!("Target: {}\n", summary.target));
    let span = match (summary.first_date, summary.last_date) {
        (Some(a), Some(b)) => format!("{a} .. {b}"),
        _ => "empty".to_string(),
    };
    out.push_str(&format!(
        "Panel: rows={} | monthly={} quarterly={} | {span}\n",
        summary.rows, summary.n_monthly, summary.n_quarterly
    ));
    out.push_str(&format!(
        "Correction: {} (code {}) | dummies={} cleared={}\n",
        summary.policy.display_name(),
        summary.policy.code(),
        summary.n_dummies,
        summary.cells_cleared
    ));
    out.push_str(&format!(
        "Selection ({}): {}\n",
        summary.selection_method.tag(),
        if summary.selected.is_empty() {
            "-".to_string()
        } else {
            summary.selected.join(", ")
        }
    ));
    if summary.eval_window.start.is_some() || summary.eval_window.end.is_some() {
        let bound = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "..".to_string());
        out.push_str(&format!(
            "Evaluation window: {} .. {}\n",
            bound(summary.eval_window.start),
            bound(summary.eval_window.end)
        ));
    }

    out.push_str("\nNowcasts:\n");
    for report in &summary.models {
        let latest = match report.latest {
            Some(p) => format!("{} = {}", p.date, fmt_num(p.value)),
            None => "-".to_string(),
        };
        out.push_str(&format!("  {:<18} {latest}\n", report.model.display_name()));
    }
    for skipped in &summary.skipped {
        out.push_str(&format!("  (skipped {}) {}\n", skipped.model.display_name(), skipped.reason));
    }

    if !summary.comparison.is_empty() {
        out.push_str("\nEvaluation:\n");
        out.push_str(&format_comparison(&summary.comparison));
    }

    out
}

/// Ranking records, at most `top` rows.
pub fn format_rankings(records: &[RankingRecord], top: usize) -> String {
    let mut out = String::new();
    push_line(&mut out, format!("{:<24} {:<6} {:>12}", "variable", "method", "score"));
    push_line(&mut out, format!("{:-<24} {:-<6} {:-<12}", "", "", ""));
    for r in records.iter().take(top) {
        push_line(
            &mut out,
            format!("{:<24} {:<6} {:>12}", truncate(&r.variable, 24), r.method.tag(), fmt_num(r.score)),
        );
    }
    out
}

/// Model comparison table, one row per (model, series).
pub fn format_comparison(rows: &[ModelComparison]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<8} {:<16} {:>5} {:>10} {:>10} {:>10} {:>10} {:>8}",
            "model", "series", "n", "rmse", "mae", "mape", "mse", "theil_u"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<8} {:-<16} {:-<5} {:-<10} {:-<10} {:-<10} {:-<10} {:-<8}",
            "", "", "", "", "", "", "", ""
        ),
    );
    for row in rows {
        let r = &row.record;
        push_line(
            &mut out,
            format!(
                "{:<8} {:<16} {:>5} {:>10} {:>10} {:>10} {:>10} {:>8}",
                truncate(&row.model, 8),
                truncate(&r.series, 16),
                r.n_obs,
                fmt_num(r.rmse),
                fmt_num(r.mae),
                fmt_num(r.mape),
                fmt_num(r.mse),
                fmt_num(r.theil_u),
            ),
        );
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn fmt_num(v: f64) -> String {
    if is_missing(v) || !v.is_finite() {
        "-".to_string()
    } else {
        format!("{v:.4}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
