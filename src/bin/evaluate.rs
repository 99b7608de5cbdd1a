use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};

use matchcast::config::PredictorConfig;
use matchcast::evaluation::{self, EvaluationReport, EvaluationRequest};
use matchcast::report_export;
use matchcast::store;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let db_path = arg_value("--db")
        .map(PathBuf::from)
        .unwrap_or_else(store::default_db_path);
    let now = Utc::now();
    let request = EvaluationRequest {
        from: arg_value("--from")
            .unwrap_or_else(|| (now - ChronoDuration::days(30)).to_rfc3339()),
        until: arg_value("--until").unwrap_or_else(|| now.to_rfc3339()),
        league: arg_value("--league").and_then(|v| v.parse().ok()),
        model_version: arg_value("--version"),
    };

    let conn = store::open_db(&db_path)?;
    let report = evaluation::evaluate(&conn, &PredictorConfig::from_env(), &request)?;

    println!("evaluation {} .. {}", report.period_start, report.period_end);
    if report.finalized_now > 0 {
        println!("  finalized {} newly concluded predictions", report.finalized_now);
    }
    if report.insufficient_data {
        println!("  no predictions with a known outcome in this window");
        if let Some(path) = arg_value("--json") {
            write_json(&path, &report)?;
        }
        return Ok(());
    }

    println!(
        "  {} eligible predictions  accuracy={:.3} log_loss={:.4} brier={:.4} ece={:.4}",
        report.eligible,
        report.overall.accuracy,
        report.overall.log_loss,
        report.overall.brier,
        report.expected_calibration_error
    );

    println!();
    println!("  by outcome:");
    for row in &report.by_outcome {
        println!(
            "    {:<9} actual={:<4} recommended={:<4} correct={:<4} accuracy={:.3} log_loss={:.4}",
            row.outcome.label(),
            row.actual,
            row.recommended,
            row.correct,
            row.accuracy,
            row.log_loss
        );
    }

    println!();
    println!("  by confidence:");
    for bucket in &report.by_confidence {
        println!(
            "    {:<7} [{:.2}..{:.2})  n={:<4} accuracy={:.3} avg_confidence={:.3}",
            bucket.label, bucket.lower, bucket.upper, bucket.count, bucket.accuracy, bucket.avg_confidence
        );
    }

    if !report.weekly.is_empty() {
        println!();
        println!("  weekly:");
        for point in &report.weekly {
            println!(
                "    {}  n={:<4} accuracy={:.3} log_loss={:.4}",
                point.week, point.count, point.accuracy, point.log_loss
            );
        }
    }

    if let Some(path) = arg_value("--xlsx") {
        let summary = report_export::export_report(Path::new(&path), &report)?;
        println!();
        println!(
            "report written: {path} ({} outcome rows, {} weekly rows)",
            summary.outcome_rows, summary.weekly_rows
        );
    }
    if let Some(path) = arg_value("--json") {
        write_json(&path, &report)?;
    }
    Ok(())
}

fn write_json(path: &str, report: &EvaluationReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize evaluation report")?;
    std::fs::write(path, json).with_context(|| format!("write {path}"))?;
    println!("raw report written: {path}");
    Ok(())
}

fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&format!("{name}=")) {
            if !v.trim().is_empty() {
                return Some(v.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.to_string());
        }
    }
    None
}
