//! Joins served predictions against finalized outcomes and aggregates
//! accuracy, log loss, Brier, and calibration quality, segmented by outcome
//! class, confidence bucket, and ISO week.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::Datelike;
use rusqlite::Connection;
use serde::Serialize;

use crate::calibration::{
    self, CalibrationBin, Metrics, Outcome, Prob3, argmax, expected_calibration_error,
};
use crate::config::PredictorConfig;
use crate::features::parse_event_time;
use crate::store::{self, StoredPrediction};

pub const RELIABILITY_BINS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct EvaluationRequest {
    pub from: String,
    pub until: String,
    pub league: Option<u32>,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeBreakdown {
    pub outcome: Outcome,
    pub actual: usize,
    pub recommended: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub log_loss: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceBucket {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyPoint {
    pub week: String,
    pub count: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub log_loss: f64,
}

/// Regenerated from scratch on every call; an empty window produces an
/// explicit insufficient-data report instead of an error.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub period_start: String,
    pub period_end: String,
    pub league_id: Option<u32>,
    pub model_version: Option<String>,
    pub generated_at: String,
    pub insufficient_data: bool,
    pub finalized_now: usize,
    pub eligible: usize,
    pub overall: Metrics,
    pub confusion: [[usize; 3]; 3],
    pub by_outcome: Vec<OutcomeBreakdown>,
    pub by_confidence: Vec<ConfidenceBucket>,
    pub weekly: Vec<WeeklyPoint>,
    pub reliability: Vec<CalibrationBin>,
    pub expected_calibration_error: f64,
}

/// Finalizes any newly-concluded events, then evaluates every prediction in
/// the window whose outcome is known.
pub fn evaluate(
    conn: &Connection,
    config: &PredictorConfig,
    request: &EvaluationRequest,
) -> Result<EvaluationReport> {
    let finalized_now = store::finalize_predictions(conn)?;
    let predictions = store::load_predictions_between(
        conn,
        &request.from,
        &request.until,
        request.league,
        request.model_version.as_deref(),
    )?;

    let joined: Vec<(StoredPrediction, Outcome)> = predictions
        .into_iter()
        .filter_map(|p| p.actual().map(|actual| (p, actual)))
        .collect();

    if joined.is_empty() {
        return Ok(empty_report(request, finalized_now));
    }

    let probs: Vec<Prob3> = joined.iter().map(|(p, _)| p.probs()).collect();
    let actuals: Vec<Outcome> = joined.iter().map(|(_, a)| *a).collect();

    let overall = calibration::evaluate_probs(&probs, &actuals);
    let confusion = calibration::confusion_counts(&probs, &actuals);
    let by_outcome = outcome_breakdown(&joined);
    let by_confidence = confidence_buckets(config, &joined);
    let weekly = weekly_trend(&joined);
    let reliability = pooled_reliability(&probs, &actuals, RELIABILITY_BINS);
    let ece = expected_calibration_error(&reliability);

    Ok(EvaluationReport {
        period_start: request.from.clone(),
        period_end: request.until.clone(),
        league_id: request.league,
        model_version: request.model_version.clone(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        insufficient_data: false,
        finalized_now,
        eligible: joined.len(),
        overall,
        confusion,
        by_outcome,
        by_confidence,
        weekly,
        reliability,
        expected_calibration_error: ece,
    })
}

fn empty_report(request: &EvaluationRequest, finalized_now: usize) -> EvaluationReport {
    let by_outcome = [Outcome::Home, Outcome::Draw, Outcome::Away]
        .into_iter()
        .map(|outcome| OutcomeBreakdown {
            outcome,
            actual: 0,
            recommended: 0,
            correct: 0,
            accuracy: 0.0,
            log_loss: 0.0,
        })
        .collect();
    EvaluationReport {
        period_start: request.from.clone(),
        period_end: request.until.clone(),
        league_id: request.league,
        model_version: request.model_version.clone(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        insufficient_data: true,
        finalized_now,
        eligible: 0,
        overall: Metrics::empty(),
        confusion: [[0; 3]; 3],
        by_outcome,
        by_confidence: Vec::new(),
        weekly: Vec::new(),
        reliability: Vec::new(),
        expected_calibration_error: 0.0,
    }
}

fn recommended_of(p: &StoredPrediction) -> Outcome {
    p.recommended_outcome().unwrap_or_else(|| argmax(p.probs()))
}

fn outcome_breakdown(joined: &[(StoredPrediction, Outcome)]) -> Vec<OutcomeBreakdown> {
    [Outcome::Home, Outcome::Draw, Outcome::Away]
        .into_iter()
        .map(|class| {
            let mut actual = 0usize;
            let mut recommended = 0usize;
            let mut correct = 0usize;
            let mut log_loss_sum = 0.0;
            for (p, a) in joined {
                let rec = recommended_of(p);
                if rec == class {
                    recommended += 1;
                }
                if *a == class {
                    actual += 1;
                    log_loss_sum += -p.probs().prob_of(class).clamp(1e-12, 1.0).ln();
                    if rec == class {
                        correct += 1;
                    }
                }
            }
            OutcomeBreakdown {
                outcome: class,
                actual,
                recommended,
                correct,
                accuracy: if actual > 0 {
                    correct as f64 / actual as f64
                } else {
                    0.0
                },
                log_loss: if actual > 0 {
                    log_loss_sum / actual as f64
                } else {
                    0.0
                },
            }
        })
        .collect()
}

fn confidence_buckets(
    config: &PredictorConfig,
    joined: &[(StoredPrediction, Outcome)],
) -> Vec<ConfidenceBucket> {
    let ranges = [
        ("high", config.strong_threshold, 1.0),
        ("medium", config.moderate_threshold, config.strong_threshold),
        ("low", 0.0, config.moderate_threshold),
    ];

    ranges
        .into_iter()
        .map(|(label, lower, upper)| {
            let mut count = 0usize;
            let mut correct = 0usize;
            let mut confidence_sum = 0.0;
            for (p, a) in joined {
                let in_bucket = if label == "high" {
                    p.confidence >= lower
                } else {
                    p.confidence >= lower && p.confidence < upper
                };
                if !in_bucket {
                    continue;
                }
                count += 1;
                confidence_sum += p.confidence;
                if recommended_of(p) == *a {
                    correct += 1;
                }
            }
            ConfidenceBucket {
                label: label.to_string(),
                lower,
                upper,
                count,
                correct,
                accuracy: if count > 0 {
                    correct as f64 / count as f64
                } else {
                    0.0
                },
                avg_confidence: if count > 0 {
                    confidence_sum / count as f64
                } else {
                    0.0
                },
            }
        })
        .collect()
}

fn weekly_trend(joined: &[(StoredPrediction, Outcome)]) -> Vec<WeeklyPoint> {
    let mut weeks: BTreeMap<String, (usize, usize, f64)> = BTreeMap::new();
    for (p, a) in joined {
        let Some(kickoff) = parse_event_time(&p.event_time) else {
            continue;
        };
        let iso = kickoff.iso_week();
        let key = format!("{}-W{:02}", iso.year(), iso.week());
        let entry = weeks.entry(key).or_insert((0, 0, 0.0));
        entry.0 += 1;
        if recommended_of(p) == *a {
            entry.1 += 1;
        }
        entry.2 += -p.probs().prob_of(*a).clamp(1e-12, 1.0).ln();
    }

    weeks
        .into_iter()
        .map(|(week, (count, correct, log_loss_sum))| WeeklyPoint {
            week,
            count,
            correct,
            accuracy: correct as f64 / count.max(1) as f64,
            log_loss: log_loss_sum / count.max(1) as f64,
        })
        .collect()
}

/// Reliability bins pooled one-vs-rest over all three classes: each
/// prediction contributes a point per class at that class's predicted
/// probability.
fn pooled_reliability(probs: &[Prob3], actuals: &[Outcome], bins: usize) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut hit_sum = vec![0.0_f64; bins];

    for (p, actual) in probs.iter().zip(actuals) {
        for class in [Outcome::Home, Outcome::Draw, Outcome::Away] {
            let prob = p.prob_of(class).clamp(0.0, 1.0);
            let idx = ((prob * bins as f64).floor() as usize).min(bins - 1);
            counts[idx] += 1;
            pred_sum[idx] += prob;
            if *actual == class {
                hit_sum[idx] += 1.0;
            }
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, hit_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EventRecord, open_db_in_memory};

    fn finished_event(event_id: u64, utc_time: &str, home_goals: i32, away_goals: i32) -> EventRecord {
        EventRecord {
            event_id,
            league_id: 1,
            season: "2024/2025".to_string(),
            round: None,
            utc_time: utc_time.to_string(),
            home_team_id: 100 + event_id as u32,
            away_team_id: 200 + event_id as u32,
            home_team: format!("Home {event_id}"),
            away_team: format!("Away {event_id}"),
            home_goals: Some(home_goals),
            away_goals: Some(away_goals),
            finished: true,
            cancelled: false,
            home_shots: None,
            away_shots: None,
            home_xg: None,
            away_xg: None,
        }
    }

    fn stored(event_id: u64, event_time: &str, probs: Prob3, confidence: f64) -> StoredPrediction {
        let recommended = argmax(probs);
        StoredPrediction {
            event_id,
            model_version: "v1".to_string(),
            league_id: 1,
            event_time: event_time.to_string(),
            p_home: probs.home,
            p_draw: probs.draw,
            p_away: probs.away,
            confidence,
            strength: "WEAK".to_string(),
            recommended: recommended.as_char().to_string(),
            factors_json: "[]".to_string(),
            created_at: "2024-09-01T00:00:00+00:00".to_string(),
            actual_outcome: None,
            is_correct: None,
        }
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            from: "2024-09-01T00:00:00Z".to_string(),
            until: "2024-10-01T00:00:00Z".to_string(),
            league: None,
            model_version: Some("v1".to_string()),
        }
    }

    #[test]
    fn six_of_ten_correct_gives_point_six_accuracy() {
        let conn = open_db_in_memory().unwrap();
        let hit = Prob3 {
            home: 0.6,
            draw: 0.25,
            away: 0.15,
        };
        let miss = Prob3 {
            home: 0.2,
            draw: 0.3,
            away: 0.5,
        };
        for i in 0..10u64 {
            let time = format!("2024-09-{:02}T15:00:00Z", i + 2);
            store::upsert_event(&conn, &finished_event(i + 1, &time, 1, 0)).unwrap();
            let probs = if i < 6 { hit } else { miss };
            store::insert_prediction(&conn, &stored(i + 1, &time, probs, 0.4)).unwrap();
        }

        let report = evaluate(&conn, &PredictorConfig::defaults(), &request()).unwrap();
        assert!(!report.insufficient_data);
        assert_eq!(report.eligible, 10);
        assert_eq!(report.finalized_now, 10);
        assert!((report.overall.accuracy - 0.6).abs() < 1e-12);

        let actual_total: usize = report.by_outcome.iter().map(|b| b.actual).sum();
        assert_eq!(actual_total, 10);
        let home_row = &report.by_outcome[0];
        assert_eq!(home_row.actual, 10);
        assert_eq!(home_row.correct, 6);
        assert!((home_row.accuracy - 0.6).abs() < 1e-12);

        // All events landed in the home row of the confusion matrix.
        assert_eq!(report.confusion[0][0], 6);
        assert_eq!(report.confusion[0][2], 4);
    }

    #[test]
    fn empty_window_returns_explicit_insufficient_report() {
        let conn = open_db_in_memory().unwrap();
        let report = evaluate(&conn, &PredictorConfig::defaults(), &request()).unwrap();
        assert!(report.insufficient_data);
        assert_eq!(report.eligible, 0);
        assert_eq!(report.overall.samples, 0);
        assert_eq!(report.by_outcome.len(), 3);
        assert!(report.weekly.is_empty());
    }

    #[test]
    fn unfinished_events_are_not_eligible() {
        let conn = open_db_in_memory().unwrap();
        let mut pending = finished_event(1, "2024-09-05T15:00:00Z", 0, 0);
        pending.home_goals = None;
        pending.away_goals = None;
        pending.finished = false;
        store::upsert_event(&conn, &pending).unwrap();
        store::insert_prediction(
            &conn,
            &stored(1, "2024-09-05T15:00:00Z", Prob3::uniform(), 0.2),
        )
        .unwrap();

        let report = evaluate(&conn, &PredictorConfig::defaults(), &request()).unwrap();
        assert!(report.insufficient_data);
        assert_eq!(report.eligible, 0);
    }

    #[test]
    fn confidence_buckets_split_on_config_thresholds() {
        let conn = open_db_in_memory().unwrap();
        let probs = Prob3 {
            home: 0.8,
            draw: 0.1,
            away: 0.1,
        };
        let confidences = [0.75, 0.70, 0.60, 0.55, 0.40, 0.10];
        for (i, conf) in confidences.iter().enumerate() {
            let id = i as u64 + 1;
            let time = format!("2024-09-{:02}T15:00:00Z", i + 2);
            store::upsert_event(&conn, &finished_event(id, &time, 2, 0)).unwrap();
            store::insert_prediction(&conn, &stored(id, &time, probs, *conf)).unwrap();
        }

        let report = evaluate(&conn, &PredictorConfig::defaults(), &request()).unwrap();
        let find = |label: &str| {
            report
                .by_confidence
                .iter()
                .find(|b| b.label == label)
                .unwrap()
                .clone()
        };
        assert_eq!(find("high").count, 2);
        assert_eq!(find("medium").count, 2);
        assert_eq!(find("low").count, 2);
        assert!((find("high").accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weekly_trend_groups_by_iso_week() {
        let conn = open_db_in_memory().unwrap();
        // Mon 2024-09-02 and Mon 2024-09-09 are different ISO weeks.
        let times = [
            "2024-09-02T15:00:00Z",
            "2024-09-03T15:00:00Z",
            "2024-09-09T15:00:00Z",
        ];
        let probs = Prob3 {
            home: 0.7,
            draw: 0.2,
            away: 0.1,
        };
        for (i, time) in times.iter().enumerate() {
            let id = i as u64 + 1;
            store::upsert_event(&conn, &finished_event(id, time, 1, 0)).unwrap();
            store::insert_prediction(&conn, &stored(id, time, probs, 0.6)).unwrap();
        }

        let report = evaluate(&conn, &PredictorConfig::defaults(), &request()).unwrap();
        assert_eq!(report.weekly.len(), 2);
        assert_eq!(report.weekly[0].week, "2024-W36");
        assert_eq!(report.weekly[0].count, 2);
        assert_eq!(report.weekly[1].week, "2024-W37");
        assert_eq!(report.weekly[1].count, 1);
    }

    #[test]
    fn reliability_bins_cover_all_classes() {
        let probs = vec![
            Prob3 {
                home: 0.75,
                draw: 0.15,
                away: 0.10,
            };
            10
        ];
        let actuals: Vec<Outcome> = (0..10)
            .map(|i| if i < 7 { Outcome::Home } else { Outcome::Away })
            .collect();
        let bins = pooled_reliability(&probs, &actuals, 10);

        let total: usize = bins.iter().map(|b| b.count).sum();
        assert_eq!(total, 30);
        let bucket_7 = &bins[7];
        assert_eq!(bucket_7.count, 10);
        assert!((bucket_7.avg_pred - 0.75).abs() < 1e-12);
        assert!((bucket_7.actual_rate - 0.7).abs() < 1e-12);
    }
}
