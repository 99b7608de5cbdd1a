use anyhow::{Result, anyhow};

use matchcast::registry::{self, ModelRegistry};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let mut registry = ModelRegistry::open(registry::default_registry_dir())?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("list");

    match command {
        "list" => list(&registry),
        "show" => {
            let Some(version) = args.get(1) else {
                return Err(anyhow!("usage: models show <version>"));
            };
            show(&registry, version)
        }
        "promote" => {
            let Some(version) = args.get(1) else {
                return Err(anyhow!("usage: models promote <version>"));
            };
            registry.promote(version)?;
            println!("production is now {version}");
            Ok(())
        }
        "rollback" => {
            let Some(version) = args.get(1) else {
                return Err(anyhow!("usage: models rollback <version>"));
            };
            registry.rollback(version)?;
            println!("rolled back: production is now {version}");
            Ok(())
        }
        other => Err(anyhow!(
            "unknown command {other}; expected list | show | promote | rollback"
        )),
    }
}

fn list(registry: &ModelRegistry) -> Result<()> {
    if registry.list_versions().is_empty() {
        println!("no registered versions in {}", registry.dir().display());
        return Ok(());
    }

    println!("versions in {}:", registry.dir().display());
    for entry in registry.list_versions() {
        let marker = if registry.production_version() == Some(entry.version.as_str()) {
            "*"
        } else {
            " "
        };
        let league = entry
            .league_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "all".to_string());
        println!(
            " {marker} {}  created {}  league {:<4} holdout log_loss={:.4} accuracy={:.3}  {} train events",
            entry.version,
            entry.created_at,
            league,
            entry.test_log_loss,
            entry.test_accuracy,
            entry.train_events
        );
    }
    if let Some(previous) = registry.previous_production_version() {
        println!("previous production: {previous}");
    }
    Ok(())
}

fn show(registry: &ModelRegistry, version: &str) -> Result<()> {
    let artifact = registry.get(version)?;

    println!("{}", artifact.version);
    println!("  created: {}", artifact.created_at);
    match artifact.league_id {
        Some(league) => println!("  league: {league}"),
        None => println!("  league: all"),
    }
    println!(
        "  window: {} .. {}",
        artifact.training.from.as_deref().unwrap_or("-"),
        artifact.training.until.as_deref().unwrap_or("-")
    );
    println!(
        "  events: {} train, {} holdout, {} skipped",
        artifact.training.train_events,
        artifact.training.holdout_events,
        artifact.training.skipped_events
    );
    println!("  features: {}", artifact.feature_names.len());
    println!(
        "  hyperparams: lr={} l2={} iters={}",
        artifact.hyperparams.learning_rate, artifact.hyperparams.l2, artifact.hyperparams.max_iters
    );
    println!(
        "  holdout calibrated: log_loss={:.4} brier={:.4} accuracy={:.3}",
        artifact.metrics.holdout_calibrated.log_loss,
        artifact.metrics.holdout_calibrated.brier,
        artifact.metrics.holdout_calibrated.accuracy
    );
    for note in &artifact.notes {
        println!("  note: {note}");
    }
    Ok(())
}
