//! Feature standardization and the multinomial logit that maps a
//! standardized feature vector onto home/draw/away probabilities.

use serde::{Deserialize, Serialize};

use crate::calibration::Prob3;

pub const OUTCOME_CLASSES: usize = 3;

const LR_DECAY: f64 = 0.003;
const EVAL_INTERVAL: usize = 20;
const IMPROVEMENT_EPS: f64 = 1e-5;
const PLATEAU_EVALS: usize = 5;

/// Per-feature mean and standard deviation, fitted on training rows only and
/// frozen into the artifact so inference standardizes identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl ScalerParams {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n = rows.first().map_or(0, |r| r.len());
        let count = rows.len() as f64;

        let mut mean = vec![0.0; n];
        for row in rows {
            for i in 0..n {
                mean[i] += row[i];
            }
        }
        if count > 0.0 {
            for v in &mut mean {
                *v /= count;
            }
        }

        let mut std = vec![0.0; n];
        for row in rows {
            for i in 0..n {
                let d = row[i] - mean[i];
                std[i] += d * d;
            }
        }
        if count > 0.0 {
            for v in &mut std {
                *v = (*v / count).sqrt().max(1e-6);
            }
        } else {
            std = vec![1.0; n];
        }

        Self { mean, std }
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / s.max(1e-6))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub learning_rate: f64,
    pub l2: f64,
    pub max_iters: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub iterations: usize,
    pub train_log_loss: f64,
    pub early_stopped: bool,
}

/// One weight row per outcome class in `[home, draw, away]` order; the
/// trailing weight of each row is the intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxModel {
    pub weights: Vec<Vec<f64>>,
}

impl SoftmaxModel {
    pub fn zeros(n_features: usize) -> Self {
        Self {
            weights: vec![vec![0.0; n_features + 1]; OUTCOME_CLASSES],
        }
    }

    pub fn n_features(&self) -> usize {
        self.weights
            .first()
            .map_or(0, |row| row.len().saturating_sub(1))
    }

    /// Batch gradient descent with L2 shrinkage and a decaying step size.
    /// Training loss is checked every few iterations; the best weights seen
    /// are kept and the loop stops once improvement stalls.
    pub fn fit(rows: &[Vec<f64>], labels: &[usize], opts: FitOptions) -> (Self, FitReport) {
        let n_features = rows.first().map_or(0, |r| r.len());
        let mut model = Self::zeros(n_features);
        if rows.is_empty() || rows.len() != labels.len() {
            let report = FitReport {
                iterations: 0,
                train_log_loss: f64::INFINITY,
                early_stopped: false,
            };
            return (model, report);
        }

        let count = rows.len() as f64;
        let mut best = model.weights.clone();
        let mut best_loss = model.mean_log_loss(rows, labels);
        let mut no_improve = 0usize;
        let mut early_stopped = false;
        let mut iterations = 0usize;

        for iter in 0..opts.max_iters {
            iterations = iter + 1;

            let mut grad = vec![vec![0.0; n_features + 1]; OUTCOME_CLASSES];
            for (row, &label) in rows.iter().zip(labels) {
                let probs = model.predict(row).as_array();
                for c in 0..OUTCOME_CLASSES {
                    let err = probs[c] - if c == label { 1.0 } else { 0.0 };
                    for j in 0..n_features {
                        grad[c][j] += err * row[j];
                    }
                    grad[c][n_features] += err;
                }
            }

            let lr = opts.learning_rate / (1.0 + iter as f64 * LR_DECAY);
            for c in 0..OUTCOME_CLASSES {
                for j in 0..=n_features {
                    let g = grad[c][j] / count + opts.l2 * model.weights[c][j];
                    model.weights[c][j] -= lr * g;
                }
            }

            if iter % EVAL_INTERVAL == 0 || iter + 1 == opts.max_iters {
                let loss = model.mean_log_loss(rows, labels);
                if loss + IMPROVEMENT_EPS < best_loss {
                    best_loss = loss;
                    best.clone_from(&model.weights);
                    no_improve = 0;
                } else {
                    no_improve += 1;
                    if no_improve >= PLATEAU_EVALS {
                        early_stopped = true;
                        break;
                    }
                }
            }
        }

        model.weights = best;
        let report = FitReport {
            iterations,
            train_log_loss: best_loss,
            early_stopped,
        };
        (model, report)
    }

    pub fn predict(&self, features: &[f64]) -> Prob3 {
        let mut scores = [0.0f64; OUTCOME_CLASSES];
        for (c, row) in self.weights.iter().enumerate().take(OUTCOME_CLASSES) {
            scores[c] = score(row, features);
        }
        softmax3(scores)
    }

    pub fn mean_log_loss(&self, rows: &[Vec<f64>], labels: &[usize]) -> f64 {
        if rows.is_empty() {
            return f64::INFINITY;
        }
        let mut sum = 0.0;
        for (row, &label) in rows.iter().zip(labels) {
            let p = self.predict(row).as_array()[label.min(OUTCOME_CLASSES - 1)];
            sum += -p.max(1e-9).ln();
        }
        sum / rows.len() as f64
    }
}

fn score(weights: &[f64], features: &[f64]) -> f64 {
    let n = features.len().min(weights.len().saturating_sub(1));
    let mut out = 0.0;
    for i in 0..n {
        out += weights[i] * features[i];
    }
    out + weights.last().copied().unwrap_or(0.0)
}

fn softmax3(scores: [f64; OUTCOME_CLASSES]) -> Prob3 {
    let mx = scores[0].max(scores[1].max(scores[2]));
    let eh = (scores[0] - mx).exp();
    let ed = (scores[1] - mx).exp();
    let ea = (scores[2] - mx).exp();
    let den = (eh + ed + ea).max(1e-9);
    Prob3 {
        home: eh / den,
        draw: ed / den,
        away: ea / den,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{Outcome, argmax};

    #[test]
    fn scaler_centers_and_scales() {
        let rows = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];
        let scaler = ScalerParams::fit(&rows);
        assert!((scaler.mean[0] - 2.0).abs() < 1e-12);
        assert!((scaler.mean[1] - 20.0).abs() < 1e-12);

        let mut sums = [0.0, 0.0];
        for row in &rows {
            let z = scaler.apply(row);
            sums[0] += z[0];
            sums[1] += z[1];
        }
        assert!(sums[0].abs() < 1e-9);
        assert!(sums[1].abs() < 1e-9);

        let z = scaler.apply(&rows[2]);
        assert!(z[0] > 1.0 && z[0] < 1.5);
    }

    #[test]
    fn constant_feature_standardizes_to_zero() {
        let rows = vec![vec![5.0], vec![5.0], vec![5.0]];
        let scaler = ScalerParams::fit(&rows);
        let z = scaler.apply(&[5.0]);
        assert_eq!(z[0], 0.0);
    }

    #[test]
    fn zeros_model_predicts_uniform() {
        let model = SoftmaxModel::zeros(4);
        let p = model.predict(&[1.0, -2.0, 3.0, 0.5]);
        assert!((p.home - 1.0 / 3.0).abs() < 1e-12);
        assert!((p.draw - 1.0 / 3.0).abs() < 1e-12);
        assert!((p.away - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn probabilities_always_sum_to_one() {
        let model = SoftmaxModel {
            weights: vec![
                vec![2.5, -1.0, 0.3],
                vec![-0.5, 0.0, 0.1],
                vec![-2.0, 1.0, -0.4],
            ],
        };
        for x in [-100.0, -1.0, 0.0, 1.0, 100.0] {
            let p = model.predict(&[x, x / 2.0]);
            assert!((p.sum() - 1.0).abs() < 1e-9);
            assert!(p.home >= 0.0 && p.draw >= 0.0 && p.away >= 0.0);
        }
    }

    #[test]
    fn fit_separates_three_clusters() {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..5 {
            let jitter = i as f64 * 0.05;
            rows.push(vec![3.0 + jitter]);
            labels.push(0);
            rows.push(vec![jitter - 0.1]);
            labels.push(1);
            rows.push(vec![-3.0 - jitter]);
            labels.push(2);
        }

        let opts = FitOptions {
            learning_rate: 0.2,
            l2: 0.001,
            max_iters: 500,
        };
        let (model, report) = SoftmaxModel::fit(&rows, &labels, opts);
        assert!(report.train_log_loss < 1.0);

        assert_eq!(argmax(model.predict(&[3.0])), Outcome::Home);
        assert_eq!(argmax(model.predict(&[0.0])), Outcome::Draw);
        assert_eq!(argmax(model.predict(&[-3.0])), Outcome::Away);
    }

    #[test]
    fn strong_shrinkage_triggers_the_plateau_stop() {
        let rows = vec![vec![0.0]; 8];
        let labels = vec![0usize; 8];
        let opts = FitOptions {
            learning_rate: 0.1,
            l2: 0.1,
            max_iters: 600,
        };
        let (_, report) = SoftmaxModel::fit(&rows, &labels, opts);
        assert!(report.early_stopped);
        assert!(report.iterations < 600);
    }

    #[test]
    fn empty_training_set_yields_uniform_model() {
        let (model, report) = SoftmaxModel::fit(&[], &[], FitOptions {
            learning_rate: 0.1,
            l2: 0.01,
            max_iters: 100,
        });
        assert_eq!(report.iterations, 0);
        assert!(report.train_log_loss.is_infinite());
        let p = model.predict(&[]);
        assert!((p.sum() - 1.0).abs() < 1e-12);
    }
}
