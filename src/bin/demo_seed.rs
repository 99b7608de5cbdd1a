use std::path::PathBuf;

use anyhow::Result;

use matchcast::store;
use matchcast::synthetic::{self, DEMO_LEAGUE_ID};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let db_path = arg_value("--db")
        .map(PathBuf::from)
        .unwrap_or_else(store::default_db_path);
    let seed = arg_value("--seed")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(7);

    let conn = store::open_db(&db_path)?;
    let summary = synthetic::seed_demo_league(&conn, seed)?;

    println!(
        "demo league {DEMO_LEAGUE_ID} seeded into {} (seed {seed})",
        db_path.display()
    );
    println!(
        "  {} events: {} finished, {} upcoming",
        summary.events, summary.finished, summary.upcoming
    );
    println!(
        "  {} standings rows, {} absence spells",
        summary.standings_rows, summary.absences
    );
    println!();
    println!("next: train --league {DEMO_LEAGUE_ID} --promote");
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
