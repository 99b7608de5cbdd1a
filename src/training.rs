//! Training pipeline: assembles the chronological feature matrix, searches
//! hyperparameters over forward-chaining folds, fits the final model on the
//! training portion and calibrates it on the held-out tail, then packages
//! everything into an immutable artifact.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use chrono::Utc;
use rusqlite::Connection;

use crate::calibration::{self, CalibrationParams, Outcome, Prob3};
use crate::config::{TrainingConfig, TrainingGrid};
use crate::features::{FeatureGenerator, SkipReason};
use crate::model::{FitOptions, ScalerParams, SoftmaxModel};
use crate::registry::{ArtifactMetrics, CvResult, ModelArtifact, TrainingWindow};
use crate::store::{self, EventRecord};

const VERSION_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Cooperative cancellation, checked between hyperparameter trials.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainingRequest {
    pub league: Option<u32>,
    pub from: Option<String>,
    pub until: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SkippedEvent {
    pub event_id: u64,
    pub reason: SkipReason,
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub considered: usize,
    pub skipped: Vec<SkippedEvent>,
}

/// Trains one model over the requested window and returns the unregistered
/// artifact. A run row is recorded in the store either way; per-event
/// feature failures are collected, never fatal.
pub fn train(
    conn: &Connection,
    config: &TrainingConfig,
    request: &TrainingRequest,
    cancel: &CancelFlag,
) -> Result<TrainingOutcome> {
    let started_at = Utc::now().to_rfc3339();
    let events = store::load_finished_events(
        conn,
        request.league,
        request.from.as_deref(),
        request.until.as_deref(),
    )?;
    let run_id = store::insert_training_run(conn, &started_at, request.league, events.len())?;

    let result = train_inner(conn, config, request, cancel, &events);
    match &result {
        Ok(outcome) => {
            let skips: Vec<String> = outcome
                .skipped
                .iter()
                .map(|s| format!("event {}: {}", s.event_id, s.reason))
                .collect();
            let used =
                outcome.artifact.training.train_events + outcome.artifact.training.holdout_events;
            store::complete_training_run(
                conn,
                run_id,
                used,
                &skips,
                Some(&outcome.artifact.version),
            )?;
        }
        Err(_) => {
            let _ = store::complete_training_run(conn, run_id, 0, &[], None);
        }
    }
    result
}

fn train_inner(
    conn: &Connection,
    config: &TrainingConfig,
    request: &TrainingRequest,
    cancel: &CancelFlag,
    events: &[EventRecord],
) -> Result<TrainingOutcome> {
    if events.len() < config.min_train_events {
        bail!(
            "insufficient training data: {} finished events in range, need at least {}",
            events.len(),
            config.min_train_events
        );
    }

    // The generator sees everything up to the window end; per-event cutoffs
    // keep each row blind to its own future.
    let generator = FeatureGenerator::from_store(conn, request.league, request.until.as_deref())?;

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(events.len());
    let mut labels: Vec<Outcome> = Vec::with_capacity(events.len());
    let mut skipped: Vec<SkippedEvent> = Vec::new();
    for event in events {
        let Some(outcome) = event.outcome() else {
            skipped.push(SkippedEvent {
                event_id: event.event_id,
                reason: SkipReason::MissingOutcome,
            });
            continue;
        };
        match generator.generate_for_event(event) {
            Ok(vector) => {
                rows.push(vector.values);
                labels.push(outcome);
            }
            Err(reason) => skipped.push(SkippedEvent {
                event_id: event.event_id,
                reason,
            }),
        }
    }

    // The chronological split below needs at least one row on each side.
    if rows.len() < config.min_train_events.max(2) {
        bail!(
            "insufficient training data after skips: {} usable events of {} in range",
            rows.len(),
            events.len()
        );
    }

    let n = rows.len();
    let holdout_len = ((n as f64) * config.test_fraction).round() as usize;
    let holdout_len = holdout_len.clamp(1, n - 1);
    let train_len = n - holdout_len;

    let grid = expand_grid(&config.grid);
    if grid.is_empty() {
        bail!("hyperparameter grid is empty");
    }
    let mut cv_results = Vec::with_capacity(grid.len());
    let mut best: Option<(FitOptions, f64)> = None;
    for opts in &grid {
        if cancel.is_cancelled() {
            bail!("training cancelled during hyperparameter search");
        }
        let score = cross_validate(
            &rows[..train_len],
            &labels[..train_len],
            *opts,
            config.cv_folds,
        );
        cv_results.push(CvResult {
            learning_rate: opts.learning_rate,
            l2: opts.l2,
            max_iters: opts.max_iters,
            mean_log_loss: score,
        });
        if best.as_ref().is_none_or(|(_, b)| score < *b) {
            best = Some((*opts, score));
        }
    }
    let Some((chosen, _)) = best else {
        bail!("hyperparameter search produced no candidate");
    };

    let scaler = ScalerParams::fit(&rows[..train_len]);
    let train_scaled: Vec<Vec<f64>> = rows[..train_len].iter().map(|r| scaler.apply(r)).collect();
    let train_classes: Vec<usize> = labels[..train_len].iter().map(|o| o.class_index()).collect();
    let (model, _fit) = SoftmaxModel::fit(&train_scaled, &train_classes, chosen);

    let holdout_scaled: Vec<Vec<f64>> = rows[train_len..].iter().map(|r| scaler.apply(r)).collect();
    let holdout_raw: Vec<Prob3> = holdout_scaled.iter().map(|r| model.predict(r)).collect();
    let holdout_outcomes = &labels[train_len..];

    let calibration = CalibrationParams::fit(&holdout_raw, holdout_outcomes);
    let holdout_calibrated: Vec<Prob3> =
        holdout_raw.iter().map(|p| calibration.apply(*p)).collect();

    let train_preds: Vec<Prob3> = train_scaled.iter().map(|r| model.predict(r)).collect();
    let metrics = ArtifactMetrics {
        train: calibration::evaluate_probs(&train_preds, &labels[..train_len]),
        holdout_raw: calibration::evaluate_probs(&holdout_raw, holdout_outcomes),
        holdout_calibrated: calibration::evaluate_probs(&holdout_calibrated, holdout_outcomes),
    };

    let artifact = ModelArtifact {
        version: Utc::now().format(VERSION_FORMAT).to_string(),
        created_at: Utc::now().to_rfc3339(),
        league_id: request.league,
        feature_names: generator.schema().names().to_vec(),
        scaler,
        model,
        calibration,
        hyperparams: chosen,
        training: TrainingWindow {
            from: request
                .from
                .clone()
                .or_else(|| events.first().map(|e| e.utc_time.clone())),
            until: request
                .until
                .clone()
                .or_else(|| events.last().map(|e| e.utc_time.clone())),
            train_events: train_len,
            holdout_events: holdout_len,
            skipped_events: skipped.len(),
        },
        cv_results,
        metrics,
        notes: Vec::new(),
    };

    Ok(TrainingOutcome {
        artifact,
        considered: events.len(),
        skipped,
    })
}

fn expand_grid(grid: &TrainingGrid) -> Vec<FitOptions> {
    let mut out = Vec::with_capacity(grid.len());
    for &learning_rate in &grid.learning_rates {
        for &l2 in &grid.l2_strengths {
            for &max_iters in &grid.max_iters {
                out.push(FitOptions {
                    learning_rate,
                    l2,
                    max_iters,
                });
            }
        }
    }
    out
}

/// Forward-chaining validation: the training portion is cut into `folds + 1`
/// chronological segments and each fold trains on everything before its
/// validation segment. Rows are never shuffled.
fn cross_validate(rows: &[Vec<f64>], labels: &[Outcome], opts: FitOptions, folds: usize) -> f64 {
    let folds = folds.max(2);
    let segment = rows.len() / (folds + 1);
    if segment == 0 {
        return fit_and_score(rows, labels, rows, labels, opts);
    }

    let mut total = 0.0;
    let mut counted = 0usize;
    for k in 1..=folds {
        let train_end = k * segment;
        let val_end = if k == folds {
            rows.len()
        } else {
            (k + 1) * segment
        };
        if train_end == 0 || val_end <= train_end {
            continue;
        }
        total += fit_and_score(
            &rows[..train_end],
            &labels[..train_end],
            &rows[train_end..val_end],
            &labels[train_end..val_end],
            opts,
        );
        counted += 1;
    }
    if counted == 0 {
        f64::INFINITY
    } else {
        total / counted as f64
    }
}

fn fit_and_score(
    train_rows: &[Vec<f64>],
    train_labels: &[Outcome],
    val_rows: &[Vec<f64>],
    val_labels: &[Outcome],
    opts: FitOptions,
) -> f64 {
    let scaler = ScalerParams::fit(train_rows);
    let scaled: Vec<Vec<f64>> = train_rows.iter().map(|r| scaler.apply(r)).collect();
    let classes: Vec<usize> = train_labels.iter().map(|o| o.class_index()).collect();
    let (model, _) = SoftmaxModel::fit(&scaled, &classes, opts);

    let val_scaled: Vec<Vec<f64>> = val_rows.iter().map(|r| scaler.apply(r)).collect();
    let val_classes: Vec<usize> = val_labels.iter().map(|o| o.class_index()).collect();
    model.mean_log_loss(&val_scaled, &val_classes)
}
