use std::path::PathBuf;

use anyhow::Result;

use matchcast::config::TrainingConfig;
use matchcast::registry::{self, ModelRegistry};
use matchcast::store;
use matchcast::training::{self, CancelFlag, TrainingRequest};

const MAX_SKIPS_SHOWN: usize = 5;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let db_path = arg_value("--db")
        .map(PathBuf::from)
        .unwrap_or_else(store::default_db_path);
    let model_dir = arg_value("--model-dir")
        .map(PathBuf::from)
        .unwrap_or_else(registry::default_registry_dir);
    let request = TrainingRequest {
        league: arg_value("--league").and_then(|v| v.parse().ok()),
        from: arg_value("--from"),
        until: arg_value("--until"),
    };
    let promote = has_flag("--promote");

    let conn = store::open_db(&db_path)?;
    let config = TrainingConfig::from_env();
    let cancel = CancelFlag::new();
    let outcome = training::train(&conn, &config, &request, &cancel)?;

    let artifact = &outcome.artifact;
    println!(
        "trained {} on {} events ({} usable, {} skipped)",
        artifact.version,
        outcome.considered,
        artifact.training.train_events + artifact.training.holdout_events,
        outcome.skipped.len()
    );
    println!(
        "selected lr={} l2={} iters={} from {} grid trials",
        artifact.hyperparams.learning_rate,
        artifact.hyperparams.l2,
        artifact.hyperparams.max_iters,
        artifact.cv_results.len()
    );
    println!(
        "train              log_loss={:.4} accuracy={:.3} ({} events)",
        artifact.metrics.train.log_loss,
        artifact.metrics.train.accuracy,
        artifact.training.train_events
    );
    println!(
        "holdout raw        log_loss={:.4} accuracy={:.3} ({} events)",
        artifact.metrics.holdout_raw.log_loss,
        artifact.metrics.holdout_raw.accuracy,
        artifact.training.holdout_events
    );
    println!(
        "holdout calibrated log_loss={:.4} brier={:.4} accuracy={:.3}",
        artifact.metrics.holdout_calibrated.log_loss,
        artifact.metrics.holdout_calibrated.brier,
        artifact.metrics.holdout_calibrated.accuracy
    );

    for skip in outcome.skipped.iter().take(MAX_SKIPS_SHOWN) {
        eprintln!("[WARN] skipped event {}: {}", skip.event_id, skip.reason);
    }
    if outcome.skipped.len() > MAX_SKIPS_SHOWN {
        eprintln!(
            "[WARN] ... and {} more skipped events",
            outcome.skipped.len() - MAX_SKIPS_SHOWN
        );
    }

    let mut registry = ModelRegistry::open(&model_dir)?;
    let version = registry.register(outcome.artifact)?;
    println!();
    println!("registered {version} in {}", registry.dir().display());

    if promote {
        registry.promote(&version)?;
        println!("promoted {version} to production");
    }
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

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|a| a == flag)
}
