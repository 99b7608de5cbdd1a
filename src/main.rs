use anyhow::Result;

use matchcast::registry::{self, ModelRegistry};
use matchcast::store;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let db_path = store::default_db_path();
    let conn = store::open_db(&db_path)?;
    let counts = store::store_counts(&conn)?;

    println!("matchcast status");
    println!("  database: {}", db_path.display());
    println!(
        "  events: {} total, {} with a known outcome",
        counts.events_total, counts.events_finished
    );
    println!(
        "  predictions: {} total, {} finalized",
        counts.predictions_total, counts.predictions_finalized
    );

    let registry = ModelRegistry::open(registry::default_registry_dir())?;
    println!("  model dir: {}", registry.dir().display());
    match registry.production_version() {
        Some(version) => println!("  production model: {version}"),
        None => println!("  production model: none"),
    }

    if registry.list_versions().is_empty() {
        println!("  registered versions: none");
    } else {
        println!("  registered versions:");
        for entry in registry.list_versions() {
            println!(
                "    {}  holdout log_loss={:.4} accuracy={:.3}  {} train events",
                entry.version, entry.test_log_loss, entry.test_accuracy, entry.train_events
            );
        }
    }

    println!();
    println!("binaries: demo_seed | train | predict | evaluate | models");
    Ok(())
}
