use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;

use matchcast::config::PredictorConfig;
use matchcast::predictor::{PredictionRecord, Predictor};
use matchcast::registry::{self, ModelRegistry};
use matchcast::store::{self, StoredPrediction};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let db_path = arg_value("--db")
        .map(PathBuf::from)
        .unwrap_or_else(store::default_db_path);
    let model_dir = arg_value("--model-dir")
        .map(PathBuf::from)
        .unwrap_or_else(registry::default_registry_dir);
    let league = arg_value("--league").and_then(|v| v.parse().ok());
    let from = arg_value("--from").unwrap_or_else(|| Utc::now().to_rfc3339());
    let until = arg_value("--until");
    let version = arg_value("--version");
    let store_records = !has_flag("--no-store");

    let conn = store::open_db(&db_path)?;
    let registry = ModelRegistry::open(&model_dir)?;
    let predictor = Predictor::from_store(
        &conn,
        &registry,
        version.as_deref(),
        PredictorConfig::from_env(),
    )?;

    let events = store::load_upcoming_events(&conn, league, &from, until.as_deref())?;
    if events.is_empty() {
        println!("no upcoming events from {from}");
        return Ok(());
    }

    let outcome = predictor.predict_batch(&events)?;
    println!(
        "model {}: {} predictions, {} skipped",
        predictor.model_version(),
        outcome.records.len(),
        outcome.skipped.len()
    );
    for skip in &outcome.skipped {
        eprintln!("[WARN] event {}: {}", skip.event_id, skip.reason);
    }

    println!();
    for record in &outcome.records {
        println!(
            "{}  {} vs {}",
            record.event_time, record.home_team, record.away_team
        );
        println!(
            "  H {:>5.1}%  D {:>5.1}%  A {:>5.1}%   {} ({:.2}) -> {}",
            record.probabilities.home * 100.0,
            record.probabilities.draw * 100.0,
            record.probabilities.away * 100.0,
            record.strength.as_str(),
            record.confidence,
            record.recommended.label()
        );
        for factor in &record.factors {
            println!("    - {factor}");
        }
    }

    if store_records {
        for record in &outcome.records {
            store::insert_prediction(&conn, &to_stored(record)?)?;
        }
        println!();
        println!("stored {} predictions", outcome.records.len());
    }
    Ok(())
}

fn to_stored(record: &PredictionRecord) -> Result<StoredPrediction> {
    Ok(StoredPrediction {
        event_id: record.event_id,
        model_version: record.model_version.clone(),
        league_id: record.league_id,
        event_time: record.event_time.clone(),
        p_home: record.probabilities.home,
        p_draw: record.probabilities.draw,
        p_away: record.probabilities.away,
        confidence: record.confidence,
        strength: record.strength.as_str().to_string(),
        recommended: record.recommended.as_char().to_string(),
        factors_json: serde_json::to_string(&record.factors).context("serialize factors")?,
        created_at: record.created_at.clone(),
        actual_outcome: None,
        is_correct: None,
    })
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

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|a| a == flag)
}
