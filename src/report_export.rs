//! Writes an evaluation report to a multi-sheet xlsx workbook.

use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::calibration::Outcome;
use crate::evaluation::EvaluationReport;

pub struct ExportSummary {
    pub outcome_rows: usize,
    pub confidence_rows: usize,
    pub weekly_rows: usize,
    pub reliability_rows: usize,
}

pub fn export_report(path: &Path, report: &EvaluationReport) -> Result<ExportSummary> {
    let overview_rows = overview_rows(report);

    let mut outcome_rows = vec![vec![
        "Outcome".to_string(),
        "Actual".to_string(),
        "Recommended".to_string(),
        "Correct".to_string(),
        "Accuracy".to_string(),
        "Log Loss".to_string(),
    ]];
    for row in &report.by_outcome {
        outcome_rows.push(vec![
            row.outcome.label().to_string(),
            row.actual.to_string(),
            row.recommended.to_string(),
            row.correct.to_string(),
            format!("{:.4}", row.accuracy),
            format!("{:.4}", row.log_loss),
        ]);
    }

    let mut confusion_rows = vec![vec![
        "Actual \\ Predicted".to_string(),
        "Home win".to_string(),
        "Draw".to_string(),
        "Away win".to_string(),
    ]];
    for (i, class) in [Outcome::Home, Outcome::Draw, Outcome::Away]
        .into_iter()
        .enumerate()
    {
        let mut row = vec![class.label().to_string()];
        row.extend(report.confusion[i].iter().map(|n| n.to_string()));
        confusion_rows.push(row);
    }

    let mut confidence_rows = vec![vec![
        "Bucket".to_string(),
        "Lower".to_string(),
        "Upper".to_string(),
        "Predictions".to_string(),
        "Correct".to_string(),
        "Accuracy".to_string(),
        "Avg Confidence".to_string(),
    ]];
    for bucket in &report.by_confidence {
        confidence_rows.push(vec![
            bucket.label.clone(),
            format!("{:.2}", bucket.lower),
            format!("{:.2}", bucket.upper),
            bucket.count.to_string(),
            bucket.correct.to_string(),
            format!("{:.4}", bucket.accuracy),
            format!("{:.4}", bucket.avg_confidence),
        ]);
    }

    let mut weekly_rows = vec![vec![
        "Week".to_string(),
        "Predictions".to_string(),
        "Correct".to_string(),
        "Accuracy".to_string(),
        "Log Loss".to_string(),
    ]];
    for point in &report.weekly {
        weekly_rows.push(vec![
            point.week.clone(),
            point.count.to_string(),
            point.correct.to_string(),
            format!("{:.4}", point.accuracy),
            format!("{:.4}", point.log_loss),
        ]);
    }

    let mut reliability_rows = vec![vec![
        "Bucket Start".to_string(),
        "Bucket End".to_string(),
        "Count".to_string(),
        "Avg Predicted".to_string(),
        "Actual Rate".to_string(),
    ]];
    for bin in &report.reliability {
        reliability_rows.push(vec![
            format!("{:.2}", bin.bucket_start),
            format!("{:.2}", bin.bucket_end),
            bin.count.to_string(),
            format!("{:.4}", bin.avg_pred),
            format!("{:.4}", bin.actual_rate),
        ]);
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Overview")?;
        write_rows(sheet, &overview_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("ByOutcome")?;
        write_rows(sheet, &outcome_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Confusion")?;
        write_rows(sheet, &confusion_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("ConfidenceBuckets")?;
        write_rows(sheet, &confidence_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("WeeklyTrend")?;
        write_rows(sheet, &weekly_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Reliability")?;
        write_rows(sheet, &reliability_rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportSummary {
        outcome_rows: outcome_rows.len().saturating_sub(1),
        confidence_rows: confidence_rows.len().saturating_sub(1),
        weekly_rows: weekly_rows.len().saturating_sub(1),
        reliability_rows: reliability_rows.len().saturating_sub(1),
    })
}

fn overview_rows(report: &EvaluationReport) -> Vec<Vec<String>> {
    vec![
        kv("Period start", report.period_start.clone()),
        kv("Period end", report.period_end.clone()),
        kv("League", opt_to_string(report.league_id)),
        kv(
            "Model version",
            report.model_version.clone().unwrap_or_default(),
        ),
        kv("Generated at", report.generated_at.clone()),
        kv(
            "Insufficient data",
            if report.insufficient_data {
                "yes".to_string()
            } else {
                "no".to_string()
            },
        ),
        kv("Outcomes finalized", report.finalized_now.to_string()),
        kv("Eligible predictions", report.eligible.to_string()),
        kv("Accuracy", format!("{:.4}", report.overall.accuracy)),
        kv("Log loss", format!("{:.4}", report.overall.log_loss)),
        kv("Brier score", format!("{:.4}", report.overall.brier)),
        kv(
            "Expected calibration error",
            format!("{:.4}", report.expected_calibration_error),
        ),
    ]
}

fn kv(key: &str, value: String) -> Vec<String> {
    vec![key.to_string(), value]
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Metrics;
    use crate::evaluation::{ConfidenceBucket, OutcomeBreakdown, WeeklyPoint};

    fn sample_report() -> EvaluationReport {
        EvaluationReport {
            period_start: "2024-09-01T00:00:00Z".to_string(),
            period_end: "2024-10-01T00:00:00Z".to_string(),
            league_id: Some(47),
            model_version: Some("20240901_120000".to_string()),
            generated_at: "2024-10-02T09:00:00+00:00".to_string(),
            insufficient_data: false,
            finalized_now: 3,
            eligible: 10,
            overall: Metrics {
                samples: 10,
                brier: 0.55,
                log_loss: 0.98,
                accuracy: 0.6,
            },
            confusion: [[6, 1, 1], [0, 1, 0], [0, 0, 1]],
            by_outcome: vec![OutcomeBreakdown {
                outcome: Outcome::Home,
                actual: 8,
                recommended: 7,
                correct: 6,
                accuracy: 0.75,
                log_loss: 0.7,
            }],
            by_confidence: vec![ConfidenceBucket {
                label: "high".to_string(),
                lower: 0.7,
                upper: 1.0,
                count: 4,
                correct: 3,
                accuracy: 0.75,
                avg_confidence: 0.78,
            }],
            weekly: vec![WeeklyPoint {
                week: "2024-W36".to_string(),
                count: 5,
                correct: 3,
                accuracy: 0.6,
                log_loss: 1.0,
            }],
            reliability: Vec::new(),
            expected_calibration_error: 0.04,
        }
    }

    #[test]
    fn export_writes_a_workbook_with_all_sheets() {
        let dir = std::env::temp_dir().join(format!(
            "matchcast_export_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("report.xlsx");

        let summary = export_report(&path, &sample_report()).unwrap();
        assert_eq!(summary.outcome_rows, 1);
        assert_eq!(summary.confidence_rows, 1);
        assert_eq!(summary.weekly_rows, 1);
        assert_eq!(summary.reliability_rows, 0);
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_report_still_exports() {
        let dir = std::env::temp_dir().join(format!(
            "matchcast_export_empty_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.xlsx");

        let mut report = sample_report();
        report.insufficient_data = true;
        report.eligible = 0;
        report.by_outcome.clear();
        report.by_confidence.clear();
        report.weekly.clear();

        let summary = export_report(&path, &report).unwrap();
        assert_eq!(summary.outcome_rows, 0);
        assert!(path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
