use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc, Weekday};
use rusqlite::Connection;

use crate::calibration::Outcome;
use crate::store::{self, AbsenceRecord, EventRecord, StandingsRow};

pub const FORM_WINDOW: usize = 5;
pub const EXTENDED_WINDOW: usize = 10;
pub const VENUE_WINDOW: usize = 5;
pub const H2H_WINDOW: usize = 20;

const FORM_DECAY: f64 = 0.9;
const DEFAULT_REST_DAYS: f64 = 7.0;
const MAX_REST_DAYS: f64 = 14.0;
const H2H_DEFAULT_WIN_RATE: f64 = 1.0 / 3.0;
const H2H_DEFAULT_TOTAL_GOALS: f64 = 2.5;
const TOP_BRACKET_RANK: u32 = 4;
const BOTTOM_BRACKET_RANK: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn prefix(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }
}

/// Why one event was left out of a batch. Per-event failures never abort the
/// batch; callers collect these alongside the successful records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BadTimestamp { raw: String },
    MissingOutcome,
    SchemaMismatch { expected: usize, got: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BadTimestamp { raw } => write!(f, "unparseable kickoff time {raw:?}"),
            SkipReason::MissingOutcome => write!(f, "no final outcome recorded"),
            SkipReason::SchemaMismatch { expected, got } => {
                write!(f, "feature vector has {got} values, model expects {expected}")
            }
        }
    }
}

impl std::error::Error for SkipReason {}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f64>,
    /// Lookups that fell back to documented defaults, e.g. a missing
    /// standings snapshot. Informational only.
    pub degraded: Vec<String>,
}

/// Everything a provider may read about one participant: its prior finished
/// events (oldest first, all strictly before the cutoff), the latest
/// standings snapshot before the cutoff, and the unavailable-player count.
pub struct TeamContext<'a> {
    pub team_id: u32,
    pub side: Side,
    pub events: Vec<&'a EventRecord>,
    pub standings: Option<&'a StandingsRow>,
    pub unavailable: usize,
}

impl<'a> TeamContext<'a> {
    pub fn recent(&self, n: usize) -> &[&'a EventRecord] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }
}

pub trait FeatureProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn feature_names(&self, side: Side) -> Vec<String>;
    fn compute(&self, ctx: &TeamContext<'_>, out: &mut Vec<f64>);
}

#[derive(Debug, Clone, Copy)]
struct SideResult {
    goals_for: f64,
    goals_against: f64,
    points: f64,
    win: bool,
    draw: bool,
    clean_sheet: bool,
    xg_for: Option<f64>,
    xg_against: Option<f64>,
}

fn side_result(event: &EventRecord, team_id: u32) -> Option<SideResult> {
    let (Some(home_goals), Some(away_goals)) = (event.home_goals, event.away_goals) else {
        return None;
    };
    let (goals_for, goals_against, xg_for, xg_against) = if event.home_team_id == team_id {
        (home_goals, away_goals, event.home_xg, event.away_xg)
    } else if event.away_team_id == team_id {
        (away_goals, home_goals, event.away_xg, event.home_xg)
    } else {
        return None;
    };

    let win = goals_for > goals_against;
    let draw = goals_for == goals_against;
    Some(SideResult {
        goals_for: goals_for as f64,
        goals_against: goals_against as f64,
        points: if win {
            3.0
        } else if draw {
            1.0
        } else {
            0.0
        },
        win,
        draw,
        clean_sheet: goals_against == 0,
        xg_for,
        xg_against,
    })
}

pub struct FormProvider {
    name: &'static str,
    window: usize,
    label: &'static str,
    include_streaks: bool,
}

impl FeatureProvider for FormProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn feature_names(&self, side: Side) -> Vec<String> {
        let p = side.prefix();
        let label = self.label;
        let mut names = vec![
            format!("{p}_points_{label}"),
            format!("{p}_wins_{label}"),
            format!("{p}_draws_{label}"),
            format!("{p}_losses_{label}"),
            format!("{p}_goals_for_avg_{label}"),
            format!("{p}_goals_against_avg_{label}"),
            format!("{p}_clean_sheets_{label}"),
            format!("{p}_weighted_form_{label}"),
        ];
        if self.include_streaks {
            names.push(format!("{p}_win_streak"));
            names.push(format!("{p}_unbeaten_streak"));
        }
        names
    }

    fn compute(&self, ctx: &TeamContext<'_>, out: &mut Vec<f64>) {
        let recent = ctx.recent(self.window);

        let mut wins = 0.0;
        let mut draws = 0.0;
        let mut losses = 0.0;
        let mut goals_for = 0.0;
        let mut goals_against = 0.0;
        let mut clean_sheets = 0.0;
        let mut weighted_num = 0.0;
        let mut weighted_den = 0.0;
        let mut n = 0.0;

        for (age, event) in recent.iter().rev().enumerate() {
            let Some(r) = side_result(event, ctx.team_id) else {
                continue;
            };
            n += 1.0;
            if r.win {
                wins += 1.0;
            } else if r.draw {
                draws += 1.0;
            } else {
                losses += 1.0;
            }
            goals_for += r.goals_for;
            goals_against += r.goals_against;
            if r.clean_sheet {
                clean_sheets += 1.0;
            }
            let w = FORM_DECAY.powi(age as i32);
            weighted_num += r.points * w;
            weighted_den += w;
        }

        out.push(3.0 * wins + draws);
        out.push(wins);
        out.push(draws);
        out.push(losses);
        out.push(if n > 0.0 { goals_for / n } else { 0.0 });
        out.push(if n > 0.0 { goals_against / n } else { 0.0 });
        out.push(clean_sheets);
        out.push(if weighted_den > 0.0 {
            weighted_num / weighted_den
        } else {
            0.0
        });

        if self.include_streaks {
            let mut win_streak = 0.0;
            let mut unbeaten_streak = 0.0;
            let mut counting_wins = true;
            for event in recent.iter().rev() {
                let Some(r) = side_result(event, ctx.team_id) else {
                    break;
                };
                if r.win && counting_wins {
                    win_streak += 1.0;
                } else {
                    counting_wins = false;
                }
                if r.win || r.draw {
                    unbeaten_streak += 1.0;
                } else {
                    break;
                }
            }
            out.push(win_streak);
            out.push(unbeaten_streak);
        }
    }
}

pub struct VenueFormProvider {
    window: usize,
}

impl FeatureProvider for VenueFormProvider {
    fn name(&self) -> &'static str {
        "venue_form"
    }

    fn feature_names(&self, side: Side) -> Vec<String> {
        let p = side.prefix();
        vec![
            format!("{p}_venue_points_last_5"),
            format!("{p}_venue_wins_last_5"),
            format!("{p}_venue_goals_for_avg_last_5"),
            format!("{p}_venue_goals_against_avg_last_5"),
            format!("{p}_venue_clean_sheets_last_5"),
        ]
    }

    fn compute(&self, ctx: &TeamContext<'_>, out: &mut Vec<f64>) {
        let at_venue: Vec<&EventRecord> = ctx
            .events
            .iter()
            .copied()
            .filter(|e| match ctx.side {
                Side::Home => e.home_team_id == ctx.team_id,
                Side::Away => e.away_team_id == ctx.team_id,
            })
            .collect();
        let start = at_venue.len().saturating_sub(self.window);

        let mut wins = 0.0;
        let mut draws = 0.0;
        let mut goals_for = 0.0;
        let mut goals_against = 0.0;
        let mut clean_sheets = 0.0;
        let mut n = 0.0;
        for event in &at_venue[start..] {
            let Some(r) = side_result(event, ctx.team_id) else {
                continue;
            };
            n += 1.0;
            if r.win {
                wins += 1.0;
            } else if r.draw {
                draws += 1.0;
            }
            goals_for += r.goals_for;
            goals_against += r.goals_against;
            if r.clean_sheet {
                clean_sheets += 1.0;
            }
        }

        out.push(3.0 * wins + draws);
        out.push(wins);
        out.push(if n > 0.0 { goals_for / n } else { 0.0 });
        out.push(if n > 0.0 { goals_against / n } else { 0.0 });
        out.push(clean_sheets);
    }
}

pub struct StandingsProvider;

impl FeatureProvider for StandingsProvider {
    fn name(&self) -> &'static str {
        "standings"
    }

    fn feature_names(&self, side: Side) -> Vec<String> {
        let p = side.prefix();
        vec![
            format!("{p}_rank"),
            format!("{p}_table_points"),
            format!("{p}_goal_diff"),
            format!("{p}_top_bracket"),
            format!("{p}_bottom_bracket"),
        ]
    }

    fn compute(&self, ctx: &TeamContext<'_>, out: &mut Vec<f64>) {
        match ctx.standings {
            Some(row) => {
                out.push(row.rank as f64);
                out.push(row.points as f64);
                out.push(row.goal_diff as f64);
                out.push(bool_feature(row.rank <= TOP_BRACKET_RANK));
                out.push(bool_feature(row.rank >= BOTTOM_BRACKET_RANK));
            }
            None => out.extend_from_slice(&[0.0; 5]),
        }
    }
}

pub struct EfficiencyProvider;

impl FeatureProvider for EfficiencyProvider {
    fn name(&self) -> &'static str {
        "efficiency"
    }

    fn feature_names(&self, side: Side) -> Vec<String> {
        let p = side.prefix();
        vec![
            format!("{p}_xg_for_avg_last_5"),
            format!("{p}_xg_against_avg_last_5"),
            format!("{p}_xg_for_avg_last_10"),
            format!("{p}_xg_against_avg_last_10"),
        ]
    }

    fn compute(&self, ctx: &TeamContext<'_>, out: &mut Vec<f64>) {
        for window in [FORM_WINDOW, EXTENDED_WINDOW] {
            let recent = ctx.recent(window);
            let mut xg_for = 0.0;
            let mut xg_against = 0.0;
            let mut n = 0.0;
            for event in recent {
                let Some(r) = side_result(event, ctx.team_id) else {
                    continue;
                };
                n += 1.0;
                // Events without recorded xG fall back to actual goals.
                xg_for += r.xg_for.unwrap_or(r.goals_for);
                xg_against += r.xg_against.unwrap_or(r.goals_against);
            }
            out.push(if n > 0.0 { xg_for / n } else { 0.0 });
            out.push(if n > 0.0 { xg_against / n } else { 0.0 });
        }
    }
}

pub struct AvailabilityProvider;

impl FeatureProvider for AvailabilityProvider {
    fn name(&self) -> &'static str {
        "availability"
    }

    fn feature_names(&self, side: Side) -> Vec<String> {
        vec![format!("{}_unavailable_count", side.prefix())]
    }

    fn compute(&self, ctx: &TeamContext<'_>, out: &mut Vec<f64>) {
        out.push(ctx.unavailable as f64);
    }
}

fn event_feature_names() -> Vec<String> {
    [
        "home_advantage",
        "season_progress",
        "early_season",
        "late_season",
        "weekend",
        "home_rest_days",
        "away_rest_days",
        "rest_advantage",
        "h2h_meetings",
        "h2h_home_wins",
        "h2h_draws",
        "h2h_away_wins",
        "h2h_home_win_rate",
        "h2h_avg_total_goals",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// The fixed ordered feature schema: every provider's features for the home
/// side, then for the away side, then the event-level block. Training and
/// inference share this order; adding a feature means retraining.
pub struct FeatureSchema {
    providers: Vec<Box<dyn FeatureProvider>>,
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl FeatureSchema {
    pub fn standard() -> Self {
        let providers: Vec<Box<dyn FeatureProvider>> = vec![
            Box::new(FormProvider {
                name: "form",
                window: FORM_WINDOW,
                label: "last_5",
                include_streaks: true,
            }),
            Box::new(FormProvider {
                name: "extended_form",
                window: EXTENDED_WINDOW,
                label: "last_10",
                include_streaks: false,
            }),
            Box::new(VenueFormProvider {
                window: VENUE_WINDOW,
            }),
            Box::new(StandingsProvider),
            Box::new(EfficiencyProvider),
            Box::new(AvailabilityProvider),
        ];

        let mut names = Vec::new();
        for side in [Side::Home, Side::Away] {
            for provider in &providers {
                names.extend(provider.feature_names(side));
            }
        }
        names.extend(event_feature_names());

        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        Self {
            providers,
            names,
            index,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn side_names(&self, side: Side) -> Vec<String> {
        let mut names = Vec::new();
        for provider in &self.providers {
            names.extend(provider.feature_names(side));
        }
        names
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct HeadToHead {
    meetings: f64,
    home_wins: f64,
    draws: f64,
    away_wins: f64,
    home_win_rate: f64,
    avg_total_goals: f64,
}

/// Computes feature vectors against an in-memory snapshot of the historical
/// record store. Every lookup is filtered to records strictly before the
/// event's own timestamp, so features can never read the future regardless of
/// what the caller loaded.
pub struct FeatureGenerator {
    schema: FeatureSchema,
    history: Vec<EventRecord>,
    by_team: HashMap<u32, Vec<usize>>,
    by_pair: HashMap<(u32, u32), Vec<usize>>,
    standings: Vec<StandingsRow>,
    standings_by_team: HashMap<u32, Vec<usize>>,
    absences: Vec<AbsenceRecord>,
    absences_by_team: HashMap<u32, Vec<usize>>,
}

impl FeatureGenerator {
    pub fn new(
        mut history: Vec<EventRecord>,
        standings: Vec<StandingsRow>,
        absences: Vec<AbsenceRecord>,
    ) -> Self {
        history.retain(|e| e.outcome().is_some());
        history.sort_by(|a, b| {
            a.utc_time
                .cmp(&b.utc_time)
                .then(a.event_id.cmp(&b.event_id))
        });

        let mut by_team: HashMap<u32, Vec<usize>> = HashMap::new();
        let mut by_pair: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
        for (idx, event) in history.iter().enumerate() {
            by_team.entry(event.home_team_id).or_default().push(idx);
            by_team.entry(event.away_team_id).or_default().push(idx);
            by_pair
                .entry(pair_key(event.home_team_id, event.away_team_id))
                .or_default()
                .push(idx);
        }

        let mut standings_by_team: HashMap<u32, Vec<usize>> = HashMap::new();
        for (idx, row) in standings.iter().enumerate() {
            standings_by_team.entry(row.team_id).or_default().push(idx);
        }

        let mut absences_by_team: HashMap<u32, Vec<usize>> = HashMap::new();
        for (idx, rec) in absences.iter().enumerate() {
            absences_by_team.entry(rec.team_id).or_default().push(idx);
        }

        Self {
            schema: FeatureSchema::standard(),
            history,
            by_team,
            by_pair,
            standings,
            standings_by_team,
            absences,
            absences_by_team,
        }
    }

    pub fn from_store(conn: &Connection, league: Option<u32>, until: Option<&str>) -> Result<Self> {
        let history = store::load_finished_events(conn, league, None, until)?;
        let standings = store::load_standings(conn, league)?;
        let absences = store::load_absences(conn)?;
        Ok(Self::new(history, standings, absences))
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Named features for one participant as of a cutoff, in
    /// `schema.side_names(side)` order.
    pub fn generate(&self, team_id: u32, as_of: &str, side: Side) -> FeatureVector {
        let mut degraded = Vec::new();
        let ctx = self.team_context(team_id, side, as_of, &mut degraded);
        let mut values = Vec::new();
        for provider in &self.schema.providers {
            provider.compute(&ctx, &mut values);
        }
        FeatureVector { values, degraded }
    }

    /// The full event vector: both participants plus head-to-head and
    /// contextual features, aligned to `schema.names()`.
    pub fn generate_for_event(&self, event: &EventRecord) -> Result<FeatureVector, SkipReason> {
        let kickoff = parse_event_time(&event.utc_time).ok_or_else(|| SkipReason::BadTimestamp {
            raw: event.utc_time.clone(),
        })?;
        let cutoff = event.utc_time.as_str();

        let mut values = Vec::with_capacity(self.schema.len());
        let mut degraded = Vec::new();

        let home_ctx = self.team_context(event.home_team_id, Side::Home, cutoff, &mut degraded);
        let away_ctx = self.team_context(event.away_team_id, Side::Away, cutoff, &mut degraded);
        for provider in &self.schema.providers {
            provider.compute(&home_ctx, &mut values);
        }
        for provider in &self.schema.providers {
            provider.compute(&away_ctx, &mut values);
        }

        let kickoff_epoch = kickoff.timestamp();
        let home_rest = rest_days(&home_ctx.events, kickoff_epoch);
        let away_rest = rest_days(&away_ctx.events, kickoff_epoch);
        let h2h = self.head_to_head(event.home_team_id, event.away_team_id, cutoff);

        let month = kickoff.month();
        values.push(1.0);
        values.push(season_progress(month));
        values.push(bool_feature(matches!(month, 8 | 9)));
        values.push(bool_feature(matches!(month, 4 | 5)));
        values.push(bool_feature(matches!(
            kickoff.weekday(),
            Weekday::Sat | Weekday::Sun
        )));
        values.push(home_rest);
        values.push(away_rest);
        values.push(home_rest - away_rest);
        values.push(h2h.meetings);
        values.push(h2h.home_wins);
        values.push(h2h.draws);
        values.push(h2h.away_wins);
        values.push(h2h.home_win_rate);
        values.push(h2h.avg_total_goals);

        debug_assert_eq!(values.len(), self.schema.len());
        Ok(FeatureVector { values, degraded })
    }

    fn team_context<'a>(
        &'a self,
        team_id: u32,
        side: Side,
        cutoff: &str,
        degraded: &mut Vec<String>,
    ) -> TeamContext<'a> {
        let events = self.team_events_before(team_id, cutoff);
        let cutoff_date = date_prefix(cutoff);
        let standings = self.standings_before(team_id, cutoff_date);
        if standings.is_none() && !self.standings.is_empty() {
            degraded.push(format!(
                "no standings snapshot for team {team_id} before {cutoff_date}"
            ));
        }
        let unavailable = self.unavailable_count(team_id, cutoff_date);
        TeamContext {
            team_id,
            side,
            events,
            standings,
            unavailable,
        }
    }

    fn team_events_before(&self, team_id: u32, cutoff: &str) -> Vec<&EventRecord> {
        let Some(indices) = self.by_team.get(&team_id) else {
            return Vec::new();
        };
        let cut = indices.partition_point(|&i| self.history[i].utc_time.as_str() < cutoff);
        indices[..cut].iter().map(|&i| &self.history[i]).collect()
    }

    fn standings_before(&self, team_id: u32, cutoff_date: &str) -> Option<&StandingsRow> {
        let indices = self.standings_by_team.get(&team_id)?;
        let cut =
            indices.partition_point(|&i| self.standings[i].snapshot_date.as_str() < cutoff_date);
        if cut == 0 {
            return None;
        }
        Some(&self.standings[indices[cut - 1]])
    }

    fn unavailable_count(&self, team_id: u32, cutoff_date: &str) -> usize {
        let Some(indices) = self.absences_by_team.get(&team_id) else {
            return 0;
        };
        indices
            .iter()
            .filter(|&&i| self.absences[i].active_at(cutoff_date))
            .count()
    }

    fn head_to_head(&self, home_id: u32, away_id: u32, cutoff: &str) -> HeadToHead {
        let meetings: Vec<&EventRecord> = match self.by_pair.get(&pair_key(home_id, away_id)) {
            Some(indices) => {
                let cut =
                    indices.partition_point(|&i| self.history[i].utc_time.as_str() < cutoff);
                let start = cut.saturating_sub(H2H_WINDOW);
                indices[start..cut].iter().map(|&i| &self.history[i]).collect()
            }
            None => Vec::new(),
        };

        if meetings.is_empty() {
            return HeadToHead {
                meetings: 0.0,
                home_wins: 0.0,
                draws: 0.0,
                away_wins: 0.0,
                home_win_rate: H2H_DEFAULT_WIN_RATE,
                avg_total_goals: H2H_DEFAULT_TOTAL_GOALS,
            };
        }

        let mut home_wins = 0.0;
        let mut draws = 0.0;
        let mut away_wins = 0.0;
        let mut total_goals = 0.0;
        let mut n = 0.0;
        for meeting in &meetings {
            let Some(outcome) = meeting.outcome() else {
                continue;
            };
            n += 1.0;
            total_goals += (meeting.home_goals.unwrap_or(0) + meeting.away_goals.unwrap_or(0)) as f64;
            // Counted from the current event's home side, whichever venue the
            // meeting was played at.
            let home_side_won = match outcome {
                Outcome::Home => meeting.home_team_id == home_id,
                Outcome::Away => meeting.away_team_id == home_id,
                Outcome::Draw => {
                    draws += 1.0;
                    continue;
                }
            };
            if home_side_won {
                home_wins += 1.0;
            } else {
                away_wins += 1.0;
            }
        }

        if n == 0.0 {
            return HeadToHead {
                meetings: 0.0,
                home_wins: 0.0,
                draws: 0.0,
                away_wins: 0.0,
                home_win_rate: H2H_DEFAULT_WIN_RATE,
                avg_total_goals: H2H_DEFAULT_TOTAL_GOALS,
            };
        }

        HeadToHead {
            meetings: n,
            home_wins,
            draws,
            away_wins,
            home_win_rate: home_wins / n,
            avg_total_goals: total_goals / n,
        }
    }
}

fn pair_key(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

fn bool_feature(v: bool) -> f64 {
    if v { 1.0 } else { 0.0 }
}

fn date_prefix(cutoff: &str) -> &str {
    cutoff.get(..10).unwrap_or(cutoff)
}

fn rest_days(prior: &[&EventRecord], kickoff_epoch: i64) -> f64 {
    let Some(last) = prior.last() else {
        return DEFAULT_REST_DAYS;
    };
    let Some(prev) = parse_event_time(&last.utc_time) else {
        return DEFAULT_REST_DAYS;
    };
    let days = (kickoff_epoch - prev.timestamp()) as f64 / 86_400.0;
    days.clamp(0.0, MAX_REST_DAYS)
}

/// August through May mapped onto [0, 1]; June counts as season end and July
/// as preseason.
fn season_progress(month: u32) -> f64 {
    let idx = match month {
        8..=12 => month - 8,
        1..=5 => month + 4,
        6 => 9,
        _ => 0,
    };
    idx as f64 / 9.0
}

pub fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}
