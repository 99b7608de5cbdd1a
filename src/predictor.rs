//! Inference over a registered artifact: scales an event's feature vector
//! with the artifact's frozen scaler, applies the base model and calibration
//! maps, and wraps the result in a `PredictionRecord` with a confidence
//! score, strength category, and ranked explanation factors.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rayon::prelude::*;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::calibration::{Outcome, Prob3, argmax};
use crate::config::PredictorConfig;
use crate::features::{FeatureGenerator, SkipReason};
use crate::registry::{ModelArtifact, ModelRegistry};
use crate::store::EventRecord;

const PROB_SUM_TOLERANCE: f64 = 1e-3;

/// Calibrated output left the probability simplex. This means a scaling or
/// calibration bug, so it aborts the whole call instead of being patched up.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityInvariantViolation {
    pub event_id: u64,
    pub probs: [f64; 3],
}

impl std::fmt::Display for ProbabilityInvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sum: f64 = self.probs.iter().sum();
        write!(
            f,
            "calibrated probabilities for event {} violate the simplex invariant: \
             [{:.6}, {:.6}, {:.6}] (sum {:.6})",
            self.event_id, self.probs[0], self.probs[1], self.probs[2], sum
        )
    }
}

impl std::error::Error for ProbabilityInvariantViolation {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

impl Strength {
    pub fn as_str(self) -> &'static str {
        match self {
            Strength::Strong => "STRONG",
            Strength::Moderate => "MODERATE",
            Strength::Weak => "WEAK",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "STRONG" => Some(Strength::Strong),
            "MODERATE" => Some(Strength::Moderate),
            "WEAK" => Some(Strength::Weak),
            _ => None,
        }
    }
}

impl std::fmt::Display for Strength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub event_id: u64,
    pub league_id: u32,
    pub event_time: String,
    pub home_team: String,
    pub away_team: String,
    pub probabilities: Prob3,
    pub confidence: f64,
    pub strength: Strength,
    pub recommended: Outcome,
    pub factors: Vec<String>,
    pub model_version: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SkippedPrediction {
    pub event_id: u64,
    pub reason: SkipReason,
}

/// Successful records plus a typed reason per skipped event, in input order
/// within each list.
#[derive(Debug)]
pub struct BatchOutcome {
    pub records: Vec<PredictionRecord>,
    pub skipped: Vec<SkippedPrediction>,
}

enum PredictFailure {
    Skip(SkipReason),
    Invariant(ProbabilityInvariantViolation),
}

pub struct Predictor {
    artifact: ModelArtifact,
    generator: FeatureGenerator,
    config: PredictorConfig,
    name_index: HashMap<String, usize>,
}

impl std::fmt::Debug for Predictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predictor")
            .field("artifact", &self.artifact)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Predictor {
    pub fn new(artifact: ModelArtifact, generator: FeatureGenerator, config: PredictorConfig) -> Self {
        let name_index = artifact
            .feature_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            artifact,
            generator,
            config,
            name_index,
        }
    }

    /// Loads the requested version (production pointer when unspecified) and
    /// a feature snapshot for the artifact's league scope. A missing or
    /// unreadable artifact fails here; there is no fallback model.
    pub fn from_store(
        conn: &Connection,
        registry: &ModelRegistry,
        version: Option<&str>,
        config: PredictorConfig,
    ) -> Result<Self> {
        let artifact = match version {
            Some(v) => registry.get(v)?,
            None => registry.get_production()?,
        };
        let generator = FeatureGenerator::from_store(conn, artifact.league_id, None)?;
        Ok(Self::new(artifact, generator, config))
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn model_version(&self) -> &str {
        &self.artifact.version
    }

    pub fn predict(&self, event: &EventRecord) -> Result<PredictionRecord> {
        let created_at = Utc::now().to_rfc3339();
        match self.predict_one(event, &created_at) {
            Ok(record) => Ok(record),
            Err(PredictFailure::Skip(reason)) => Err(reason.into()),
            Err(PredictFailure::Invariant(violation)) => Err(violation.into()),
        }
    }

    /// Predicts each event independently in parallel. Feature-level failures
    /// become typed skips; an invariant violation aborts the batch.
    pub fn predict_batch(&self, events: &[EventRecord]) -> Result<BatchOutcome> {
        let created_at = Utc::now().to_rfc3339();
        let results: Vec<(u64, Result<PredictionRecord, PredictFailure>)> = events
            .par_iter()
            .map(|event| (event.event_id, self.predict_one(event, &created_at)))
            .collect();

        let mut records = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for (event_id, result) in results {
            match result {
                Ok(record) => records.push(record),
                Err(PredictFailure::Skip(reason)) => {
                    skipped.push(SkippedPrediction { event_id, reason })
                }
                Err(PredictFailure::Invariant(violation)) => return Err(violation.into()),
            }
        }
        Ok(BatchOutcome { records, skipped })
    }

    fn predict_one(
        &self,
        event: &EventRecord,
        created_at: &str,
    ) -> Result<PredictionRecord, PredictFailure> {
        let vector = self
            .generator
            .generate_for_event(event)
            .map_err(PredictFailure::Skip)?;
        if vector.values.len() != self.artifact.feature_names.len() {
            return Err(PredictFailure::Skip(SkipReason::SchemaMismatch {
                expected: self.artifact.feature_names.len(),
                got: vector.values.len(),
            }));
        }

        let scaled = self.artifact.scaler.apply(&vector.values);
        let raw = self.artifact.model.predict(&scaled);
        let probs = self.artifact.calibration.apply(raw).normalized();
        self.check_invariant(event.event_id, probs)?;

        let confidence = self.confidence_score(probs);
        let strength = self.strength_for(confidence);
        let recommended = argmax(probs);
        let factors = self.explanation_factors(event, &vector.values);

        Ok(PredictionRecord {
            event_id: event.event_id,
            league_id: event.league_id,
            event_time: event.utc_time.clone(),
            home_team: event.home_team.clone(),
            away_team: event.away_team.clone(),
            probabilities: probs,
            confidence,
            strength,
            recommended,
            factors,
            model_version: self.artifact.version.clone(),
            created_at: created_at.to_string(),
        })
    }

    fn check_invariant(&self, event_id: u64, probs: Prob3) -> Result<(), PredictFailure> {
        let arr = probs.as_array();
        let sum: f64 = arr.iter().sum();
        let valid = arr.iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p))
            && (sum - 1.0).abs() < PROB_SUM_TOLERANCE;
        if valid {
            Ok(())
        } else {
            Err(PredictFailure::Invariant(ProbabilityInvariantViolation {
                event_id,
                probs: arr,
            }))
        }
    }

    /// Blend of dominant-class probability and normalized entropy
    /// complement; both weights come from configuration.
    pub fn confidence_score(&self, p: Prob3) -> f64 {
        let max_entropy = 3.0_f64.ln();
        let entropy_term = 1.0 - p.entropy() / max_entropy;
        (self.config.confidence_max_weight * p.max_prob()
            + self.config.confidence_entropy_weight * entropy_term)
            .clamp(0.0, 1.0)
    }

    pub fn strength_for(&self, confidence: f64) -> Strength {
        if confidence >= self.config.strong_threshold {
            Strength::Strong
        } else if confidence >= self.config.moderate_threshold {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }

    fn feature(&self, values: &[f64], name: &str) -> f64 {
        self.name_index
            .get(name)
            .and_then(|&i| values.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// Short human-readable statements ranked by how far each signal sits
    /// beyond its threshold, capped by configuration. Explanatory metadata
    /// only; never folded back into the probabilities.
    fn explanation_factors(&self, event: &EventRecord, values: &[f64]) -> Vec<String> {
        let cfg = &self.config;
        let mut candidates: Vec<(f64, String)> = Vec::new();
        let mut push = |weight: f64, text: String| candidates.push((weight, text));

        for (team, prefix) in [(&event.home_team, "home"), (&event.away_team, "away")] {
            let points = self.feature(values, &format!("{prefix}_points_last_5"));
            if points >= cfg.form_strong_points {
                push(
                    3.0 + margin(points, cfg.form_strong_points),
                    format!("{team} in excellent recent form ({points:.0} of 15 points)"),
                );
            } else if points <= cfg.form_weak_points {
                push(
                    3.0 + margin(cfg.form_weak_points, points),
                    format!("{team} struggling for form ({points:.0} of 15 points)"),
                );
            }
        }

        let meetings = self.feature(values, "h2h_meetings");
        if meetings >= cfg.h2h_min_meetings {
            let home_rate = self.feature(values, "h2h_home_win_rate");
            let away_rate = self.feature(values, "h2h_away_wins") / meetings.max(1.0);
            if home_rate > cfg.h2h_favor_rate {
                push(
                    2.5 + margin(home_rate, cfg.h2h_favor_rate),
                    format!(
                        "head-to-head favors {} ({:.0}% of {:.0} meetings)",
                        event.home_team,
                        home_rate * 100.0,
                        meetings
                    ),
                );
            } else if away_rate > cfg.h2h_favor_rate {
                push(
                    2.5 + margin(away_rate, cfg.h2h_favor_rate),
                    format!(
                        "head-to-head favors {} ({:.0}% of {:.0} meetings)",
                        event.away_team,
                        away_rate * 100.0,
                        meetings
                    ),
                );
            }
        }

        let home_rank = self.feature(values, "home_rank");
        let away_rank = self.feature(values, "away_rank");
        if home_rank > 0.5 && away_rank > 0.5 && (home_rank - away_rank).abs() >= cfg.rank_gap {
            let (better, a, b) = if home_rank < away_rank {
                (&event.home_team, home_rank, away_rank)
            } else {
                (&event.away_team, away_rank, home_rank)
            };
            push(
                2.0 + margin((home_rank - away_rank).abs(), cfg.rank_gap),
                format!("{better} far higher in the table ({a:.0} vs {b:.0})"),
            );
        }

        for (team, prefix) in [(&event.home_team, "home"), (&event.away_team, "away")] {
            let out = self.feature(values, &format!("{prefix}_unavailable_count"));
            if out >= cfg.significant_absences {
                push(
                    1.5 + margin(out, cfg.significant_absences),
                    format!("{team} missing {out:.0} players"),
                );
            }
        }

        let rest_gap = self.feature(values, "rest_advantage");
        if rest_gap.abs() >= cfg.rest_advantage_days {
            let (team, own, other) = if rest_gap > 0.0 {
                (
                    &event.home_team,
                    self.feature(values, "home_rest_days"),
                    self.feature(values, "away_rest_days"),
                )
            } else {
                (
                    &event.away_team,
                    self.feature(values, "away_rest_days"),
                    self.feature(values, "home_rest_days"),
                )
            };
            push(
                1.0 + margin(rest_gap.abs(), cfg.rest_advantage_days),
                format!("{team} better rested ({own:.0} vs {other:.0} days)"),
            );
        }

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        candidates.truncate(cfg.max_factors);
        candidates.into_iter().map(|(_, text)| text).collect()
    }
}

fn margin(value: f64, threshold: f64) -> f64 {
    ((value - threshold).abs() / threshold.abs().max(1.0)).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationParams, Metrics};
    use crate::model::{FitOptions, ScalerParams, SoftmaxModel};
    use crate::registry::{ArtifactMetrics, TrainingWindow};
    use crate::store::{AbsenceRecord, StandingsRow};

    fn artifact_for(generator: &FeatureGenerator) -> ModelArtifact {
        let n = generator.schema().len();
        ModelArtifact {
            version: "test_v1".to_string(),
            created_at: "2024-09-01T00:00:00+00:00".to_string(),
            league_id: Some(1),
            feature_names: generator.schema().names().to_vec(),
            scaler: ScalerParams {
                mean: vec![0.0; n],
                std: vec![1.0; n],
            },
            model: SoftmaxModel::zeros(n),
            calibration: CalibrationParams::identity(),
            hyperparams: FitOptions {
                learning_rate: 0.1,
                l2: 0.01,
                max_iters: 300,
            },
            training: TrainingWindow {
                from: None,
                until: None,
                train_events: 0,
                holdout_events: 0,
                skipped_events: 0,
            },
            cv_results: Vec::new(),
            metrics: ArtifactMetrics {
                train: Metrics::empty(),
                holdout_raw: Metrics::empty(),
                holdout_calibrated: Metrics::empty(),
            },
            notes: Vec::new(),
        }
    }

    fn event(
        event_id: u64,
        utc_time: &str,
        home_team_id: u32,
        away_team_id: u32,
        goals: Option<(i32, i32)>,
    ) -> EventRecord {
        EventRecord {
            event_id,
            league_id: 1,
            season: "2024/2025".to_string(),
            round: None,
            utc_time: utc_time.to_string(),
            home_team_id,
            away_team_id,
            home_team: format!("Team {home_team_id}"),
            away_team: format!("Team {away_team_id}"),
            home_goals: goals.map(|g| g.0),
            away_goals: goals.map(|g| g.1),
            finished: goals.is_some(),
            cancelled: false,
            home_shots: None,
            away_shots: None,
            home_xg: None,
            away_xg: None,
        }
    }

    fn predictor_with(
        history: Vec<EventRecord>,
        standings: Vec<StandingsRow>,
        absences: Vec<AbsenceRecord>,
    ) -> Predictor {
        let generator = FeatureGenerator::new(history, standings, absences);
        let artifact = artifact_for(&generator);
        Predictor::new(artifact, generator, PredictorConfig::defaults())
    }

    #[test]
    fn confidence_matches_the_stated_formula() {
        let predictor = predictor_with(Vec::new(), Vec::new(), Vec::new());
        let p = Prob3 {
            home: 0.55,
            draw: 0.25,
            away: 0.20,
        };
        let expected = 0.5 * 0.55 + 0.5 * (1.0 - p.entropy() / 3.0_f64.ln());
        let confidence = predictor.confidence_score(p);
        assert!((confidence - expected).abs() < 1e-12);
        assert!(confidence > 0.28 && confidence < 0.35, "got {confidence}");
        assert_eq!(predictor.strength_for(confidence), Strength::Weak);
    }

    #[test]
    fn peaked_distribution_is_fully_confident() {
        let predictor = predictor_with(Vec::new(), Vec::new(), Vec::new());
        let peaked = Prob3 {
            home: 1.0,
            draw: 0.0,
            away: 0.0,
        };
        assert!((predictor.confidence_score(peaked) - 1.0).abs() < 1e-9);

        let uniform = predictor.confidence_score(Prob3::uniform());
        assert!((uniform - 0.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn strength_thresholds_partition_cleanly() {
        let predictor = predictor_with(Vec::new(), Vec::new(), Vec::new());
        assert_eq!(predictor.strength_for(0.75), Strength::Strong);
        assert_eq!(predictor.strength_for(0.70), Strength::Strong);
        assert_eq!(predictor.strength_for(0.69), Strength::Moderate);
        assert_eq!(predictor.strength_for(0.55), Strength::Moderate);
        assert_eq!(predictor.strength_for(0.54), Strength::Weak);
    }

    #[test]
    fn zeros_model_predicts_uniform_with_weak_strength() {
        let predictor = predictor_with(Vec::new(), Vec::new(), Vec::new());
        let upcoming = event(10, "2024-09-07T15:00:00Z", 1, 2, None);
        let record = predictor.predict(&upcoming).unwrap();

        assert!((record.probabilities.sum() - 1.0).abs() < 1e-3);
        assert!((record.probabilities.home - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(record.strength, Strength::Weak);
        assert_eq!(record.model_version, "test_v1");
    }

    #[test]
    fn strong_form_and_absences_show_up_as_factors() {
        // Team 1 wins five straight; team 2 has three players out.
        let mut history = Vec::new();
        for i in 0..5u64 {
            history.push(event(
                i + 1,
                &format!("2024-08-0{}T15:00:00Z", i + 1),
                1,
                30 + i as u32,
                Some((2, 0)),
            ));
        }
        let absences = vec![
            AbsenceRecord {
                team_id: 2,
                player: "A".to_string(),
                reason: "injury".to_string(),
                start_date: "2024-08-01".to_string(),
                end_date: None,
            },
            AbsenceRecord {
                team_id: 2,
                player: "B".to_string(),
                reason: "injury".to_string(),
                start_date: "2024-08-02".to_string(),
                end_date: None,
            },
            AbsenceRecord {
                team_id: 2,
                player: "C".to_string(),
                reason: "suspension".to_string(),
                start_date: "2024-08-03".to_string(),
                end_date: None,
            },
        ];
        let predictor = predictor_with(history, Vec::new(), absences);

        let upcoming = event(99, "2024-09-07T15:00:00Z", 1, 2, None);
        let record = predictor.predict(&upcoming).unwrap();

        assert!(record.factors.len() <= 5);
        assert!(
            record
                .factors
                .iter()
                .any(|f| f.contains("Team 1") && f.contains("excellent recent form")),
            "factors: {:?}",
            record.factors
        );
        assert!(
            record
                .factors
                .iter()
                .any(|f| f.contains("Team 2") && f.contains("missing 3 players")),
            "factors: {:?}",
            record.factors
        );
    }

    #[test]
    fn corrupt_model_weights_trip_the_invariant() {
        let generator = FeatureGenerator::new(Vec::new(), Vec::new(), Vec::new());
        let mut artifact = artifact_for(&generator);
        artifact.model.weights[0][0] = f64::NAN;
        let predictor = Predictor::new(artifact, generator, PredictorConfig::defaults());

        let upcoming = event(7, "2024-09-07T15:00:00Z", 1, 2, None);
        let err = predictor.predict(&upcoming).unwrap_err();
        assert!(err.downcast_ref::<ProbabilityInvariantViolation>().is_some());

        let batch_err = predictor.predict_batch(&[upcoming]).unwrap_err();
        assert!(
            batch_err
                .downcast_ref::<ProbabilityInvariantViolation>()
                .is_some()
        );
    }

    #[test]
    fn batch_skips_bad_events_and_keeps_good_ones() {
        let predictor = predictor_with(Vec::new(), Vec::new(), Vec::new());
        let good = event(1, "2024-09-07T15:00:00Z", 1, 2, None);
        let mut bad = event(2, "2024-09-07T15:00:00Z", 3, 4, None);
        bad.utc_time = "not a timestamp".to_string();

        let outcome = predictor.predict_batch(&[good, bad]).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].event_id, 2);
        assert!(matches!(
            outcome.skipped[0].reason,
            SkipReason::BadTimestamp { .. }
        ));
    }

    #[test]
    fn repeated_predictions_are_identical_apart_from_the_clock() {
        let mut history = Vec::new();
        for i in 0..8u64 {
            history.push(event(
                i + 1,
                &format!("2024-08-{:02}T15:00:00Z", i + 1),
                1 + (i % 2) as u32,
                3 + (i % 3) as u32,
                Some(((i % 3) as i32, (i % 2) as i32)),
            ));
        }
        let predictor = predictor_with(history, Vec::new(), Vec::new());
        let upcoming = event(50, "2024-09-07T15:00:00Z", 1, 3, None);

        let mut first = predictor.predict(&upcoming).unwrap();
        let mut second = predictor.predict(&upcoming).unwrap();
        first.created_at = String::new();
        second.created_at = String::new();
        assert_eq!(first, second);
    }
}
