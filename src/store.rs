use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};

use crate::calibration::{Outcome, Prob3, classify_outcome};

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event_id: u64,
    pub league_id: u32,
    pub season: String,
    pub round: Option<i64>,
    pub utc_time: String,
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    pub finished: bool,
    pub cancelled: bool,
    pub home_shots: Option<i32>,
    pub away_shots: Option<i32>,
    pub home_xg: Option<f64>,
    pub away_xg: Option<f64>,
}

impl EventRecord {
    pub fn outcome(&self) -> Option<Outcome> {
        let (Some(home_goals), Some(away_goals)) = (self.home_goals, self.away_goals) else {
            return None;
        };
        if !self.finished || self.cancelled {
            return None;
        }
        Some(classify_outcome(home_goals, away_goals))
    }
}

#[derive(Debug, Clone)]
pub struct StandingsRow {
    pub league_id: u32,
    pub snapshot_date: String,
    pub team_id: u32,
    pub rank: u32,
    pub played: u32,
    pub points: u32,
    pub goal_diff: i32,
}

#[derive(Debug, Clone)]
pub struct AbsenceRecord {
    pub team_id: u32,
    pub player: String,
    pub reason: String,
    pub start_date: String,
    pub end_date: Option<String>,
}

impl AbsenceRecord {
    /// Unavailable as of `cutoff`: the spell started strictly before it and
    /// has not ended yet.
    pub fn active_at(&self, cutoff: &str) -> bool {
        self.start_date.as_str() < cutoff
            && self.end_date.as_deref().is_none_or(|end| end >= cutoff)
    }
}

#[derive(Debug, Clone)]
pub struct StoredPrediction {
    pub event_id: u64,
    pub model_version: String,
    pub league_id: u32,
    pub event_time: String,
    pub p_home: f64,
    pub p_draw: f64,
    pub p_away: f64,
    pub confidence: f64,
    pub strength: String,
    pub recommended: String,
    pub factors_json: String,
    pub created_at: String,
    pub actual_outcome: Option<String>,
    pub is_correct: Option<bool>,
}

impl StoredPrediction {
    pub fn probs(&self) -> Prob3 {
        Prob3 {
            home: self.p_home,
            draw: self.p_draw,
            away: self.p_away,
        }
    }

    pub fn recommended_outcome(&self) -> Option<Outcome> {
        self.recommended.chars().next().and_then(Outcome::from_char)
    }

    pub fn actual(&self) -> Option<Outcome> {
        self.actual_outcome
            .as_deref()
            .and_then(|s| s.chars().next())
            .and_then(Outcome::from_char)
    }

    pub fn factors(&self) -> Vec<String> {
        serde_json::from_str(&self.factors_json).unwrap_or_default()
    }
}

pub fn default_db_path() -> PathBuf {
    std::env::var("MATCHCAST_DB")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("matchcast.sqlite"))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_db_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS events (
            event_id INTEGER PRIMARY KEY,
            league_id INTEGER NOT NULL,
            season TEXT NOT NULL,
            round INTEGER NULL,
            utc_time TEXT NOT NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            finished INTEGER NOT NULL,
            cancelled INTEGER NOT NULL,
            home_shots INTEGER NULL,
            away_shots INTEGER NULL,
            home_xg REAL NULL,
            away_xg REAL NULL,
            outcome TEXT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_league ON events(league_id);
        CREATE INDEX IF NOT EXISTS idx_events_utc_time ON events(utc_time);
        CREATE INDEX IF NOT EXISTS idx_events_outcome ON events(outcome);

        CREATE TABLE IF NOT EXISTS standings (
            league_id INTEGER NOT NULL,
            snapshot_date TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            rank INTEGER NOT NULL,
            played INTEGER NOT NULL,
            points INTEGER NOT NULL,
            goal_diff INTEGER NOT NULL,
            PRIMARY KEY (league_id, snapshot_date, team_id)
        );
        CREATE INDEX IF NOT EXISTS idx_standings_team ON standings(team_id, snapshot_date);

        CREATE TABLE IF NOT EXISTS absences (
            absence_id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id INTEGER NOT NULL,
            player TEXT NOT NULL,
            reason TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_absences_team ON absences(team_id, start_date);

        CREATE TABLE IF NOT EXISTS predictions (
            event_id INTEGER NOT NULL,
            model_version TEXT NOT NULL,
            league_id INTEGER NOT NULL,
            event_time TEXT NOT NULL,
            p_home REAL NOT NULL,
            p_draw REAL NOT NULL,
            p_away REAL NOT NULL,
            confidence REAL NOT NULL,
            strength TEXT NOT NULL,
            recommended TEXT NOT NULL,
            factors_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            actual_outcome TEXT NULL,
            is_correct INTEGER NULL,
            PRIMARY KEY (event_id, model_version)
        );
        CREATE INDEX IF NOT EXISTS idx_predictions_time ON predictions(event_time);
        CREATE INDEX IF NOT EXISTS idx_predictions_model ON predictions(model_version);

        CREATE TABLE IF NOT EXISTS training_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            league_id INTEGER NULL,
            events_total INTEGER NOT NULL,
            events_used INTEGER NOT NULL,
            events_skipped INTEGER NOT NULL,
            version_id TEXT NULL,
            skips_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn upsert_event(conn: &Connection, e: &EventRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO events (
            event_id, league_id, season, round, utc_time,
            home_team_id, away_team_id, home_team, away_team,
            home_goals, away_goals, finished, cancelled,
            home_shots, away_shots, home_xg, away_xg,
            outcome, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13,
            ?14, ?15, ?16, ?17,
            ?18, ?19
        )
        ON CONFLICT(event_id) DO UPDATE SET
            league_id = excluded.league_id,
            season = excluded.season,
            round = excluded.round,
            utc_time = excluded.utc_time,
            home_team_id = excluded.home_team_id,
            away_team_id = excluded.away_team_id,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            home_goals = excluded.home_goals,
            away_goals = excluded.away_goals,
            finished = excluded.finished,
            cancelled = excluded.cancelled,
            home_shots = excluded.home_shots,
            away_shots = excluded.away_shots,
            home_xg = excluded.home_xg,
            away_xg = excluded.away_xg,
            outcome = excluded.outcome,
            updated_at = excluded.updated_at
        "#,
        params![
            e.event_id as i64,
            e.league_id as i64,
            e.season,
            e.round,
            e.utc_time,
            e.home_team_id as i64,
            e.away_team_id as i64,
            e.home_team,
            e.away_team,
            e.home_goals,
            e.away_goals,
            bool_to_i64(e.finished),
            bool_to_i64(e.cancelled),
            e.home_shots,
            e.away_shots,
            e.home_xg,
            e.away_xg,
            e.outcome().map(|o| o.as_char().to_string()),
            Utc::now().to_rfc3339(),
        ],
    )
    .context("upsert event")?;
    Ok(())
}

pub fn insert_standings_row(conn: &Connection, row: &StandingsRow) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO standings (league_id, snapshot_date, team_id, rank, played, points, goal_diff)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(league_id, snapshot_date, team_id) DO UPDATE SET
            rank = excluded.rank,
            played = excluded.played,
            points = excluded.points,
            goal_diff = excluded.goal_diff
        "#,
        params![
            row.league_id as i64,
            row.snapshot_date,
            row.team_id as i64,
            row.rank as i64,
            row.played as i64,
            row.points as i64,
            row.goal_diff,
        ],
    )
    .context("insert standings row")?;
    Ok(())
}

pub fn insert_absence(conn: &Connection, rec: &AbsenceRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO absences (team_id, player, reason, start_date, end_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            rec.team_id as i64,
            rec.player,
            rec.reason,
            rec.start_date,
            rec.end_date,
        ],
    )
    .context("insert absence")?;
    Ok(conn.last_insert_rowid())
}

const EVENT_COLUMNS: &str = r#"
    event_id, league_id, season, round, utc_time,
    home_team_id, away_team_id, home_team, away_team,
    home_goals, away_goals, finished, cancelled,
    home_shots, away_shots, home_xg, away_xg
"#;

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRecord> {
    Ok(EventRecord {
        event_id: row.get::<_, u64>(0)?,
        league_id: row.get::<_, u32>(1)?,
        season: row.get(2)?,
        round: row.get(3)?,
        utc_time: row.get(4)?,
        home_team_id: row.get::<_, u32>(5)?,
        away_team_id: row.get::<_, u32>(6)?,
        home_team: row.get(7)?,
        away_team: row.get(8)?,
        home_goals: row.get(9)?,
        away_goals: row.get(10)?,
        finished: row.get::<_, i64>(11)? != 0,
        cancelled: row.get::<_, i64>(12)? != 0,
        home_shots: row.get(13)?,
        away_shots: row.get(14)?,
        home_xg: row.get(15)?,
        away_xg: row.get(16)?,
    })
}

pub fn load_finished_events(
    conn: &Connection,
    league: Option<u32>,
    from: Option<&str>,
    until: Option<&str>,
) -> Result<Vec<EventRecord>> {
    let sql = format!(
        r#"
        SELECT {EVENT_COLUMNS}
        FROM events
        WHERE finished = 1
          AND cancelled = 0
          AND home_goals IS NOT NULL
          AND away_goals IS NOT NULL
          AND (?1 IS NULL OR league_id = ?1)
          AND (?2 IS NULL OR utc_time >= ?2)
          AND (?3 IS NULL OR utc_time < ?3)
        ORDER BY utc_time ASC, event_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql).context("prepare finished events query")?;
    let rows = stmt
        .query_map(params![league.map(i64::from), from, until], event_from_row)
        .context("query finished events")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode event row")?);
    }
    Ok(out)
}

pub fn load_upcoming_events(
    conn: &Connection,
    league: Option<u32>,
    from: &str,
    until: Option<&str>,
) -> Result<Vec<EventRecord>> {
    let sql = format!(
        r#"
        SELECT {EVENT_COLUMNS}
        FROM events
        WHERE finished = 0
          AND cancelled = 0
          AND utc_time >= ?2
          AND (?1 IS NULL OR league_id = ?1)
          AND (?3 IS NULL OR utc_time < ?3)
        ORDER BY utc_time ASC, event_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql).context("prepare upcoming events query")?;
    let rows = stmt
        .query_map(params![league.map(i64::from), from, until], event_from_row)
        .context("query upcoming events")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode event row")?);
    }
    Ok(out)
}

pub fn load_event(conn: &Connection, event_id: u64) -> Result<Option<EventRecord>> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?1");
    let mut stmt = conn.prepare(&sql).context("prepare event query")?;
    let mut rows = stmt
        .query_map(params![event_id as i64], event_from_row)
        .context("query event")?;
    match rows.next() {
        Some(row) => Ok(Some(row.context("decode event row")?)),
        None => Ok(None),
    }
}

pub fn load_standings(conn: &Connection, league: Option<u32>) -> Result<Vec<StandingsRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT league_id, snapshot_date, team_id, rank, played, points, goal_diff
            FROM standings
            WHERE (?1 IS NULL OR league_id = ?1)
            ORDER BY snapshot_date ASC, rank ASC
            "#,
        )
        .context("prepare standings query")?;
    let rows = stmt
        .query_map(params![league.map(i64::from)], |row| {
            Ok(StandingsRow {
                league_id: row.get::<_, u32>(0)?,
                snapshot_date: row.get(1)?,
                team_id: row.get::<_, u32>(2)?,
                rank: row.get::<_, u32>(3)?,
                played: row.get::<_, u32>(4)?,
                points: row.get::<_, u32>(5)?,
                goal_diff: row.get(6)?,
            })
        })
        .context("query standings")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode standings row")?);
    }
    Ok(out)
}

pub fn load_absences(conn: &Connection) -> Result<Vec<AbsenceRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT team_id, player, reason, start_date, end_date
             FROM absences
             ORDER BY start_date ASC, absence_id ASC",
        )
        .context("prepare absences query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AbsenceRecord {
                team_id: row.get::<_, u32>(0)?,
                player: row.get(1)?,
                reason: row.get(2)?,
                start_date: row.get(3)?,
                end_date: row.get(4)?,
            })
        })
        .context("query absences")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode absence row")?);
    }
    Ok(out)
}

pub fn insert_prediction(conn: &Connection, p: &StoredPrediction) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO predictions (
            event_id, model_version, league_id, event_time,
            p_home, p_draw, p_away, confidence, strength, recommended,
            factors_json, created_at, actual_outcome, is_correct
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, NULL)
        ON CONFLICT(event_id, model_version) DO UPDATE SET
            league_id = excluded.league_id,
            event_time = excluded.event_time,
            p_home = excluded.p_home,
            p_draw = excluded.p_draw,
            p_away = excluded.p_away,
            confidence = excluded.confidence,
            strength = excluded.strength,
            recommended = excluded.recommended,
            factors_json = excluded.factors_json,
            created_at = excluded.created_at
        "#,
        params![
            p.event_id as i64,
            p.model_version,
            p.league_id as i64,
            p.event_time,
            p.p_home,
            p.p_draw,
            p.p_away,
            p.confidence,
            p.strength,
            p.recommended,
            p.factors_json,
            p.created_at,
        ],
    )
    .context("insert prediction")?;
    Ok(())
}

const PREDICTION_COLUMNS: &str = r#"
    event_id, model_version, league_id, event_time,
    p_home, p_draw, p_away, confidence, strength, recommended,
    factors_json, created_at, actual_outcome, is_correct
"#;

fn prediction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredPrediction> {
    Ok(StoredPrediction {
        event_id: row.get::<_, u64>(0)?,
        model_version: row.get(1)?,
        league_id: row.get::<_, u32>(2)?,
        event_time: row.get(3)?,
        p_home: row.get(4)?,
        p_draw: row.get(5)?,
        p_away: row.get(6)?,
        confidence: row.get(7)?,
        strength: row.get(8)?,
        recommended: row.get(9)?,
        factors_json: row.get(10)?,
        created_at: row.get(11)?,
        actual_outcome: row.get(12)?,
        is_correct: row
            .get::<_, Option<i64>>(13)?
            .map(|v| v != 0),
    })
}

pub fn load_predictions_between(
    conn: &Connection,
    from: &str,
    until: &str,
    league: Option<u32>,
    model_version: Option<&str>,
) -> Result<Vec<StoredPrediction>> {
    let sql = format!(
        r#"
        SELECT {PREDICTION_COLUMNS}
        FROM predictions
        WHERE event_time >= ?1
          AND event_time < ?2
          AND (?3 IS NULL OR league_id = ?3)
          AND (?4 IS NULL OR model_version = ?4)
        ORDER BY event_time ASC, event_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql).context("prepare predictions query")?;
    let rows = stmt
        .query_map(
            params![from, until, league.map(i64::from), model_version],
            prediction_from_row,
        )
        .context("query predictions")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode prediction row")?);
    }
    Ok(out)
}

pub fn prediction_for_event(
    conn: &Connection,
    event_id: u64,
    model_version: &str,
) -> Result<Option<StoredPrediction>> {
    let sql = format!(
        "SELECT {PREDICTION_COLUMNS} FROM predictions WHERE event_id = ?1 AND model_version = ?2"
    );
    let mut stmt = conn.prepare(&sql).context("prepare prediction query")?;
    let mut rows = stmt
        .query_map(params![event_id as i64, model_version], prediction_from_row)
        .context("query prediction")?;
    match rows.next() {
        Some(row) => Ok(Some(row.context("decode prediction row")?)),
        None => Ok(None),
    }
}

/// Fills `actual_outcome`/`is_correct` for predictions whose event has since
/// finished. Existing enrichment is never rewritten. Returns the number of
/// predictions finalized.
pub fn finalize_predictions(conn: &Connection) -> Result<usize> {
    let changed = conn
        .execute(
            r#"
            UPDATE predictions SET
                actual_outcome = (
                    SELECT e.outcome FROM events e WHERE e.event_id = predictions.event_id
                ),
                is_correct = CASE
                    WHEN recommended = (
                        SELECT e.outcome FROM events e WHERE e.event_id = predictions.event_id
                    ) THEN 1
                    ELSE 0
                END
            WHERE actual_outcome IS NULL
              AND (
                SELECT e.outcome FROM events e WHERE e.event_id = predictions.event_id
              ) IS NOT NULL
            "#,
            [],
        )
        .context("finalize predictions")?;
    Ok(changed)
}

pub fn insert_training_run(
    conn: &Connection,
    started_at: &str,
    league: Option<u32>,
    events_total: usize,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO training_runs (started_at, finished_at, league_id, events_total, events_used, events_skipped, version_id, skips_json)
         VALUES (?1, NULL, ?2, ?3, 0, 0, NULL, '[]')",
        params![started_at, league.map(i64::from), events_total as i64],
    )
    .context("insert training run")?;
    Ok(conn.last_insert_rowid())
}

pub fn complete_training_run(
    conn: &Connection,
    run_id: i64,
    events_used: usize,
    skips: &[String],
    version_id: Option<&str>,
) -> Result<()> {
    let skips_json = serde_json::to_string(skips).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE training_runs
         SET finished_at = ?1, events_used = ?2, events_skipped = ?3, version_id = ?4, skips_json = ?5
         WHERE run_id = ?6",
        params![
            Utc::now().to_rfc3339(),
            events_used as i64,
            skips.len() as i64,
            version_id,
            skips_json,
            run_id
        ],
    )
    .context("complete training run")?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct StoreCounts {
    pub events_total: usize,
    pub events_finished: usize,
    pub predictions_total: usize,
    pub predictions_finalized: usize,
}

pub fn store_counts(conn: &Connection) -> Result<StoreCounts> {
    let count = |sql: &str| -> Result<usize> {
        conn.query_row(sql, [], |row| row.get::<_, i64>(0))
            .map(|v| v.max(0) as usize)
            .with_context(|| format!("count query: {sql}"))
    };
    Ok(StoreCounts {
        events_total: count("SELECT COUNT(*) FROM events")?,
        events_finished: count("SELECT COUNT(*) FROM events WHERE outcome IS NOT NULL")?,
        predictions_total: count("SELECT COUNT(*) FROM predictions")?,
        predictions_finalized: count(
            "SELECT COUNT(*) FROM predictions WHERE actual_outcome IS NOT NULL",
        )?,
    })
}

fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}
