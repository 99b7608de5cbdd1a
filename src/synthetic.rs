//! Deterministic demo corpus: two seasons of a fictional 12-team league
//! with latent team strengths, weekly standings snapshots, and absence
//! spells. The same seed always produces the same database.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;

use crate::store::{self, AbsenceRecord, EventRecord, StandingsRow};

pub const DEMO_LEAGUE_ID: u32 = 900;

const DEMO_TEAM_BASE: u32 = 9000;

const TEAMS: &[(&str, f64)] = &[
    ("Albion Rovers", 1.9),
    ("Harbour City", 1.6),
    ("Northfield United", 1.4),
    ("Kings Heath", 1.2),
    ("Redbrook", 1.0),
    ("Saltworth Town", 0.9),
    ("Eastvale", 0.8),
    ("Westmoor", 0.7),
    ("Lakeside Athletic", 0.6),
    ("Oldcastle", 0.5),
    ("Ferrybridge", 0.4),
    ("Millhaven", 0.2),
];

const SURNAMES: &[&str] = &[
    "Adeyemi",
    "Barlow",
    "Crane",
    "Dempsey",
    "Ellison",
    "Faulkner",
    "Gallagher",
    "Hargreaves",
    "Ibanez",
    "Jarvis",
    "Keane",
    "Lindqvist",
    "Moran",
    "Novak",
    "Ortega",
    "Petrov",
];

const ABSENCE_REASONS: &[&str] = &["injury", "suspension", "illness"];

pub struct SeedSummary {
    pub events: usize,
    pub finished: usize,
    pub upcoming: usize,
    pub standings_rows: usize,
    pub absences: usize,
}

struct SeasonPlan {
    label: &'static str,
    start: NaiveDate,
    finished_rounds: usize,
}

/// Populates the store with the demo league. The current season is two
/// rounds short of complete, which leaves fixtures to predict.
pub fn seed_demo_league(conn: &Connection, seed: u64) -> Result<SeedSummary> {
    let mut rng = StdRng::seed_from_u64(seed);
    let team_ids: Vec<u32> = (0..TEAMS.len() as u32).map(|i| DEMO_TEAM_BASE + i).collect();
    let rounds = double_round_robin(&team_ids);

    let seasons = [
        SeasonPlan {
            label: "2023/2024",
            start: NaiveDate::from_ymd_opt(2023, 8, 12).context("season one start date")?,
            finished_rounds: rounds.len(),
        },
        SeasonPlan {
            label: "2024/2025",
            start: NaiveDate::from_ymd_opt(2024, 8, 10).context("season two start date")?,
            finished_rounds: rounds.len().saturating_sub(2),
        },
    ];

    let mut summary = SeedSummary {
        events: 0,
        finished: 0,
        upcoming: 0,
        standings_rows: 0,
        absences: 0,
    };
    let mut event_id = 100_001u64;

    for season in &seasons {
        let mut table: HashMap<u32, (u32, u32, i32)> = HashMap::new();

        for (round_idx, pairs) in rounds.iter().enumerate() {
            let round_date = season.start + ChronoDuration::days(7 * round_idx as i64);
            let finished = round_idx < season.finished_rounds;

            for (match_idx, &(home_id, away_id)) in pairs.iter().enumerate() {
                let utc_time = format!(
                    "{}T{:02}:00:00Z",
                    round_date.format("%Y-%m-%d"),
                    13 + match_idx % 6
                );
                let mut event = EventRecord {
                    event_id,
                    league_id: DEMO_LEAGUE_ID,
                    season: season.label.to_string(),
                    round: Some(round_idx as i64 + 1),
                    utc_time,
                    home_team_id: home_id,
                    away_team_id: away_id,
                    home_team: team_name(home_id).to_string(),
                    away_team: team_name(away_id).to_string(),
                    home_goals: None,
                    away_goals: None,
                    finished: false,
                    cancelled: false,
                    home_shots: None,
                    away_shots: None,
                    home_xg: None,
                    away_xg: None,
                };
                event_id += 1;

                if finished {
                    let home_lambda = expected_goals(strength(home_id), strength(away_id), true);
                    let away_lambda = expected_goals(strength(away_id), strength(home_id), false);
                    let home_goals = sample_poisson(&mut rng, home_lambda);
                    let away_goals = sample_poisson(&mut rng, away_lambda);

                    event.home_goals = Some(home_goals);
                    event.away_goals = Some(away_goals);
                    event.finished = true;
                    event.home_shots = Some(home_goals * 2 + rng.gen_range(5..14));
                    event.away_shots = Some(away_goals * 2 + rng.gen_range(5..14));
                    event.home_xg = Some(round2(
                        (home_lambda + rng.gen_range(-0.25..0.25)).max(0.1),
                    ));
                    event.away_xg = Some(round2(
                        (away_lambda + rng.gen_range(-0.25..0.25)).max(0.1),
                    ));

                    update_table(&mut table, home_id, away_id, home_goals, away_goals);
                    summary.finished += 1;
                } else {
                    summary.upcoming += 1;
                }

                store::upsert_event(conn, &event)?;
                summary.events += 1;
            }

            if finished {
                let snapshot_date =
                    (round_date + ChronoDuration::days(1)).format("%Y-%m-%d").to_string();
                summary.standings_rows += snapshot_table(conn, &table, &snapshot_date)?;
            }
        }

        summary.absences += seed_absences(conn, &mut rng, &team_ids, season)?;
    }

    Ok(summary)
}

fn double_round_robin(team_ids: &[u32]) -> Vec<Vec<(u32, u32)>> {
    let n = team_ids.len();
    let mut rotation = team_ids.to_vec();
    let mut rounds: Vec<Vec<(u32, u32)>> = Vec::new();

    for round in 0..n.saturating_sub(1) {
        let mut pairs = Vec::with_capacity(n / 2);
        for i in 0..n / 2 {
            let (a, b) = (rotation[i], rotation[n - 1 - i]);
            if round % 2 == 0 {
                pairs.push((a, b));
            } else {
                pairs.push((b, a));
            }
        }
        rounds.push(pairs);
        rotation[1..].rotate_right(1);
    }

    let second_half: Vec<Vec<(u32, u32)>> = rounds
        .iter()
        .map(|pairs| pairs.iter().map(|&(home, away)| (away, home)).collect())
        .collect();
    rounds.extend(second_half);
    rounds
}

fn team_entry(team_id: u32) -> Option<&'static (&'static str, f64)> {
    TEAMS.get(team_id.checked_sub(DEMO_TEAM_BASE)? as usize)
}

fn team_name(team_id: u32) -> &'static str {
    team_entry(team_id).map(|(name, _)| *name).unwrap_or("Unknown")
}

fn strength(team_id: u32) -> f64 {
    team_entry(team_id).map(|(_, s)| *s).unwrap_or(1.0)
}

fn expected_goals(strength_for: f64, strength_against: f64, home: bool) -> f64 {
    let base = if home { 1.45 } else { 1.15 };
    (base + 0.55 * (strength_for - strength_against)).max(0.15)
}

fn sample_poisson(rng: &mut StdRng, lambda: f64) -> i32 {
    let threshold = (-lambda).exp();
    let mut product: f64 = rng.r#gen();
    let mut count = 0;
    while product > threshold && count < 9 {
        product *= rng.r#gen::<f64>();
        count += 1;
    }
    count
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn update_table(
    table: &mut HashMap<u32, (u32, u32, i32)>,
    home_id: u32,
    away_id: u32,
    home_goals: i32,
    away_goals: i32,
) {
    let (home_points, away_points) = if home_goals > away_goals {
        (3, 0)
    } else if home_goals < away_goals {
        (0, 3)
    } else {
        (1, 1)
    };

    let home = table.entry(home_id).or_insert((0, 0, 0));
    home.0 += 1;
    home.1 += home_points;
    home.2 += home_goals - away_goals;

    let away = table.entry(away_id).or_insert((0, 0, 0));
    away.0 += 1;
    away.1 += away_points;
    away.2 += away_goals - home_goals;
}

fn snapshot_table(
    conn: &Connection,
    table: &HashMap<u32, (u32, u32, i32)>,
    snapshot_date: &str,
) -> Result<usize> {
    let mut order: Vec<(u32, (u32, u32, i32))> =
        table.iter().map(|(id, row)| (*id, *row)).collect();
    order.sort_by(|(a_id, (_, a_pts, a_gd)), (b_id, (_, b_pts, b_gd))| {
        b_pts.cmp(a_pts).then(b_gd.cmp(a_gd)).then(a_id.cmp(b_id))
    });

    for (idx, (team_id, (played, points, goal_diff))) in order.iter().enumerate() {
        store::insert_standings_row(
            conn,
            &StandingsRow {
                league_id: DEMO_LEAGUE_ID,
                snapshot_date: snapshot_date.to_string(),
                team_id: *team_id,
                rank: idx as u32 + 1,
                played: *played,
                points: *points,
                goal_diff: *goal_diff,
            },
        )?;
    }
    Ok(order.len())
}

fn seed_absences(
    conn: &Connection,
    rng: &mut StdRng,
    team_ids: &[u32],
    season: &SeasonPlan,
) -> Result<usize> {
    let mut inserted = 0usize;
    for &team_id in team_ids {
        let spells = rng.gen_range(1..=3);
        for _ in 0..spells {
            let start_round = rng.gen_range(0..season.finished_rounds.max(1));
            let start = season.start
                + ChronoDuration::days(7 * start_round as i64 + rng.gen_range(0..4));
            let duration = rng.gen_range(10..40);
            let end = if season.label == "2024/2025" && rng.gen_bool(0.15) {
                None
            } else {
                Some((start + ChronoDuration::days(duration)).format("%Y-%m-%d").to_string())
            };

            store::insert_absence(
                conn,
                &AbsenceRecord {
                    team_id,
                    player: SURNAMES[rng.gen_range(0..SURNAMES.len())].to_string(),
                    reason: ABSENCE_REASONS[rng.gen_range(0..ABSENCE_REASONS.len())].to_string(),
                    start_date: start.format("%Y-%m-%d").to_string(),
                    end_date: end,
                },
            )?;
            inserted += 1;
        }
    }
    Ok(inserted)
}
