use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn class_index(self) -> usize {
        match self {
            Outcome::Home => 0,
            Outcome::Draw => 1,
            Outcome::Away => 2,
        }
    }

    pub fn from_class_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(Outcome::Home),
            1 => Some(Outcome::Draw),
            2 => Some(Outcome::Away),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Outcome::Home => 'H',
            Outcome::Draw => 'D',
            Outcome::Away => 'A',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'H' => Some(Outcome::Home),
            'D' => Some(Outcome::Draw),
            'A' => Some(Outcome::Away),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Home => "home win",
            Outcome::Draw => "draw",
            Outcome::Away => "away win",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn from_array(p: [f64; 3]) -> Self {
        Self {
            home: p[0],
            draw: p[1],
            away: p[2],
        }
    }

    pub fn as_array(self) -> [f64; 3] {
        [self.home, self.draw, self.away]
    }

    pub fn prob_of(self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn max_prob(self) -> f64 {
        self.home.max(self.draw).max(self.away)
    }

    pub fn sum(self) -> f64 {
        self.home + self.draw + self.away
    }

    pub fn entropy(self) -> f64 {
        let mut h = 0.0;
        for p in self.as_array() {
            if p > 1e-12 {
                h -= p * p.ln();
            }
        }
        h
    }

    /// Rescales so the three probabilities sum to 1.0. A degenerate all-zero
    /// vector falls back to uniform.
    pub fn normalized(self) -> Self {
        let sum = self.sum();
        if sum <= 1e-12 {
            return Self::uniform();
        }
        Self {
            home: self.home / sum,
            draw: self.draw / sum,
            away: self.away / sum,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    pub fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

pub fn classify_outcome(home_goals: i32, away_goals: i32) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

pub fn empirical_outcome_probs(outcomes: &[Outcome]) -> Prob3 {
    if outcomes.is_empty() {
        return Prob3::uniform();
    }

    let mut home = 0usize;
    let mut draw = 0usize;
    let mut away = 0usize;
    for outcome in outcomes {
        match outcome {
            Outcome::Home => home += 1,
            Outcome::Draw => draw += 1,
            Outcome::Away => away += 1,
        }
    }
    let n = outcomes.len() as f64;
    Prob3 {
        home: home as f64 / n,
        draw: draw as f64 / n,
        away: away as f64 / n,
    }
}

pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let y = one_hot(*outcome);
        brier_sum +=
            (p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2);

        let actual_prob = p.prob_of(*outcome).clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();

        if argmax(*p) == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Rows are true classes, columns are predicted (arg-max) classes, both in
/// home/draw/away index order.
pub fn confusion_counts(predictions: &[Prob3], outcomes: &[Outcome]) -> [[usize; 3]; 3] {
    let mut counts = [[0usize; 3]; 3];
    for (p, outcome) in predictions.iter().zip(outcomes) {
        counts[outcome.class_index()][argmax(*p).class_index()] += 1;
    }
    counts
}

pub fn argmax(p: Prob3) -> Outcome {
    if p.home >= p.draw && p.home >= p.away {
        Outcome::Home
    } else if p.draw >= p.away {
        Outcome::Draw
    } else {
        Outcome::Away
    }
}

fn one_hot(outcome: Outcome) -> Prob3 {
    match outcome {
        Outcome::Home => Prob3 {
            home: 1.0,
            draw: 0.0,
            away: 0.0,
        },
        Outcome::Draw => Prob3 {
            home: 0.0,
            draw: 1.0,
            away: 0.0,
        },
        Outcome::Away => Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 1.0,
        },
    }
}

/// Monotonic step map from raw to calibrated probability, fit with
/// pool-adjacent-violators on held-out predictions. Lookups interpolate
/// linearly between fitted points and clamp outside the fitted range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsotonicMap {
    pub thresholds: Vec<f64>,
    pub values: Vec<f64>,
}

impl IsotonicMap {
    pub fn identity() -> Self {
        Self {
            thresholds: vec![0.0, 1.0],
            values: vec![0.0, 1.0],
        }
    }

    pub fn fit(raw: &[f64], target: &[f64]) -> Self {
        if raw.is_empty() || raw.len() != target.len() {
            return Self::identity();
        }

        let mut pairs: Vec<(f64, f64)> = raw
            .iter()
            .zip(target)
            .map(|(x, y)| (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Collapse duplicate raw values first so block boundaries stay distinct.
        let mut xs: Vec<f64> = Vec::with_capacity(pairs.len());
        let mut ys: Vec<f64> = Vec::with_capacity(pairs.len());
        let mut ws: Vec<f64> = Vec::with_capacity(pairs.len());
        for (x, y) in pairs {
            if let Some(last) = xs.last().copied() {
                if (x - last).abs() < 1e-12 {
                    let idx = xs.len() - 1;
                    let w = ws[idx];
                    ys[idx] = (ys[idx] * w + y) / (w + 1.0);
                    ws[idx] = w + 1.0;
                    continue;
                }
            }
            xs.push(x);
            ys.push(y);
            ws.push(1.0);
        }

        struct Block {
            x_min: f64,
            x_max: f64,
            y_sum: f64,
            weight: f64,
        }

        let mut blocks: Vec<Block> = Vec::with_capacity(xs.len());
        for i in 0..xs.len() {
            blocks.push(Block {
                x_min: xs[i],
                x_max: xs[i],
                y_sum: ys[i] * ws[i],
                weight: ws[i],
            });
            while blocks.len() >= 2 {
                let last = blocks.len() - 1;
                let mean_last = blocks[last].y_sum / blocks[last].weight;
                let mean_prev = blocks[last - 1].y_sum / blocks[last - 1].weight;
                if mean_last >= mean_prev {
                    break;
                }
                let Some(merged) = blocks.pop() else {
                    break;
                };
                let prev = blocks.len() - 1;
                blocks[prev].x_max = merged.x_max;
                blocks[prev].y_sum += merged.y_sum;
                blocks[prev].weight += merged.weight;
            }
        }

        let mut thresholds = Vec::with_capacity(blocks.len() * 2);
        let mut values = Vec::with_capacity(blocks.len() * 2);
        for block in &blocks {
            let v = (block.y_sum / block.weight.max(1e-12)).clamp(0.0, 1.0);
            thresholds.push(block.x_min);
            values.push(v);
            if block.x_max > block.x_min {
                thresholds.push(block.x_max);
                values.push(v);
            }
        }

        if thresholds.is_empty() {
            return Self::identity();
        }
        Self { thresholds, values }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        // Non-finite input passes through so the caller's invariant check
        // sees it rather than a fabricated value.
        if !raw.is_finite() {
            return raw;
        }
        let p = raw.clamp(0.0, 1.0);
        let n = self.thresholds.len();
        if n == 0 {
            return p;
        }
        if p <= self.thresholds[0] {
            return self.values[0];
        }
        if p >= self.thresholds[n - 1] {
            return self.values[n - 1];
        }

        let hi = self.thresholds.partition_point(|t| *t < p).min(n - 1);
        let lo = hi - 1;
        let span = self.thresholds[hi] - self.thresholds[lo];
        if span <= 1e-12 {
            return self.values[hi];
        }
        let frac = (p - self.thresholds[lo]) / span;
        self.values[lo] + frac * (self.values[hi] - self.values[lo])
    }
}

/// One isotonic map per outcome class, applied one-vs-rest and renormalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub home: IsotonicMap,
    pub draw: IsotonicMap,
    pub away: IsotonicMap,
}

impl CalibrationParams {
    pub fn identity() -> Self {
        Self {
            home: IsotonicMap::identity(),
            draw: IsotonicMap::identity(),
            away: IsotonicMap::identity(),
        }
    }

    pub fn fit(predictions: &[Prob3], outcomes: &[Outcome]) -> Self {
        if predictions.is_empty() || predictions.len() != outcomes.len() {
            return Self::identity();
        }

        let fit_class = |class: Outcome| {
            let raw: Vec<f64> = predictions.iter().map(|p| p.prob_of(class)).collect();
            let target: Vec<f64> = outcomes
                .iter()
                .map(|o| if *o == class { 1.0 } else { 0.0 })
                .collect();
            IsotonicMap::fit(&raw, &target)
        };

        Self {
            home: fit_class(Outcome::Home),
            draw: fit_class(Outcome::Draw),
            away: fit_class(Outcome::Away),
        }
    }

    pub fn apply(&self, p: Prob3) -> Prob3 {
        Prob3 {
            home: self.home.apply(p.home),
            draw: self.draw.apply(p.draw),
            away: self.away.apply(p.away),
        }
        .normalized()
    }
}

pub fn calibration_bins(
    predictions: &[Prob3],
    outcomes: &[Outcome],
    class: Outcome,
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, outcome) in predictions.iter().zip(outcomes) {
        let class_prob = p.prob_of(class).clamp(0.0, 1.0);
        let idx = ((class_prob * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += class_prob;
        if *outcome == class {
            actual_sum[idx] += 1.0;
        }
    }

    let mut out = Vec::with_capacity(bins);
    for i in 0..bins {
        let start = i as f64 / bins as f64;
        let end = (i + 1) as f64 / bins as f64;
        let count = counts[i];
        let (avg_pred, actual_rate) = if count > 0 {
            (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
        } else {
            (0.0, 0.0)
        };
        out.push(CalibrationBin {
            bucket_start: start,
            bucket_end: end,
            count,
            avg_pred,
            actual_rate,
        });
    }
    out
}

/// Count-weighted mean absolute gap between predicted and observed rates.
pub fn expected_calibration_error(bins: &[CalibrationBin]) -> f64 {
    let total: usize = bins.iter().map(|b| b.count).sum();
    if total == 0 {
        return 0.0;
    }
    bins.iter()
        .map(|b| (b.count as f64 / total as f64) * (b.avg_pred - b.actual_rate).abs())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::{
        CalibrationParams, IsotonicMap, Outcome, Prob3, argmax, calibration_bins,
        classify_outcome, confusion_counts, empirical_outcome_probs, evaluate_probs,
        expected_calibration_error,
    };

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let preds = vec![
            Prob3 {
                home: 1.0,
                draw: 0.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 1.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 0.0,
                away: 1.0,
            },
        ];
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away];
        let m = evaluate_probs(&preds, &outcomes);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert!((m.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn uniform_entropy_is_ln_three() {
        let h = Prob3::uniform().entropy();
        assert!((h - 3.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn classify_and_argmax_agree_on_clear_cases() {
        assert_eq!(classify_outcome(3, 1), Outcome::Home);
        assert_eq!(classify_outcome(0, 0), Outcome::Draw);
        assert_eq!(classify_outcome(0, 2), Outcome::Away);
        assert_eq!(
            argmax(Prob3 {
                home: 0.2,
                draw: 0.5,
                away: 0.3,
            }),
            Outcome::Draw
        );
    }

    #[test]
    fn empirical_probs_match_counts() {
        let outcomes = vec![
            Outcome::Home,
            Outcome::Home,
            Outcome::Draw,
            Outcome::Away,
            Outcome::Home,
        ];
        let p = empirical_outcome_probs(&outcomes);
        assert!((p.home - 0.6).abs() < 1e-12);
        assert!((p.draw - 0.2).abs() < 1e-12);
        assert!((p.away - 0.2).abs() < 1e-12);
    }

    #[test]
    fn isotonic_pools_violating_neighbors() {
        let raw = [0.1, 0.2, 0.3, 0.4];
        let target = [0.0, 1.0, 0.0, 1.0];
        let map = IsotonicMap::fit(&raw, &target);

        assert!((map.apply(0.25) - 0.5).abs() < 1e-9);
        assert!((map.apply(0.05) - 0.0).abs() < 1e-9);
        assert!((map.apply(0.9) - 1.0).abs() < 1e-9);

        let mut prev = -1.0;
        for step in 0..=100 {
            let v = map.apply(step as f64 / 100.0);
            assert!(v >= prev - 1e-12, "not monotone at step {step}");
            assert!((0.0..=1.0).contains(&v));
            prev = v;
        }
    }

    #[test]
    fn calibrated_probs_stay_normalized() {
        let preds: Vec<Prob3> = (0..40)
            .map(|i| {
                let h = 0.2 + (i as f64) * 0.01;
                Prob3 {
                    home: h,
                    draw: (1.0 - h) * 0.45,
                    away: (1.0 - h) * 0.55,
                }
            })
            .collect();
        let outcomes: Vec<Outcome> = (0..40)
            .map(|i| if i % 2 == 0 { Outcome::Home } else { Outcome::Away })
            .collect();

        let params = CalibrationParams::fit(&preds, &outcomes);
        for p in &preds {
            let q = params.apply(*p);
            assert!((q.sum() - 1.0).abs() < 1e-9);
            for v in q.as_array() {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn confusion_rows_sum_to_class_counts() {
        let preds = vec![
            Prob3 {
                home: 0.7,
                draw: 0.2,
                away: 0.1,
            };
            4
        ];
        let outcomes = vec![Outcome::Home, Outcome::Home, Outcome::Draw, Outcome::Away];
        let counts = confusion_counts(&preds, &outcomes);
        assert_eq!(counts[0][0], 2);
        assert_eq!(counts[1][0], 1);
        assert_eq!(counts[2][0], 1);
    }

    #[test]
    fn perfectly_calibrated_bins_have_zero_error() {
        // Half the 0.5-probability predictions hit, matching the bucket.
        let preds = vec![
            Prob3 {
                home: 0.5,
                draw: 0.25,
                away: 0.25,
            };
            10
        ];
        let outcomes: Vec<Outcome> = (0..10)
            .map(|i| if i % 2 == 0 { Outcome::Home } else { Outcome::Away })
            .collect();
        let bins = calibration_bins(&preds, &outcomes, Outcome::Home, 10);
        let ece = expected_calibration_error(&bins);
        assert!(ece < 1e-9, "ece={ece}");
    }
}
