use serde::{Deserialize, Serialize};

/// Hyperparameter grid for the softmax classifier. Every combination is
/// scored by forward-chaining cross-validation before the final fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingGrid {
    pub learning_rates: Vec<f64>,
    pub l2_strengths: Vec<f64>,
    pub max_iters: Vec<usize>,
}

impl TrainingGrid {
    pub fn defaults() -> Self {
        Self {
            learning_rates: vec![0.05, 0.10, 0.15],
            l2_strengths: vec![0.01, 0.05, 0.10],
            max_iters: vec![300, 600],
        }
    }

    pub fn len(&self) -> usize {
        self.learning_rates.len() * self.l2_strengths.len() * self.max_iters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Chronological tail reserved for calibration and test, never trained on.
    pub test_fraction: f64,
    pub cv_folds: usize,
    pub min_train_events: usize,
    pub grid: TrainingGrid,
}

impl TrainingConfig {
    pub fn defaults() -> Self {
        Self {
            test_fraction: 0.2,
            cv_folds: 3,
            min_train_events: 120,
            grid: TrainingGrid::defaults(),
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::defaults();
        config.test_fraction =
            env_f64("MATCHCAST_TEST_FRACTION", config.test_fraction).clamp(0.05, 0.5);
        config.cv_folds = env_usize("MATCHCAST_CV_FOLDS", config.cv_folds).clamp(2, 8);
        config.min_train_events = env_usize("MATCHCAST_MIN_TRAIN_EVENTS", config.min_train_events);
        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    pub confidence_max_weight: f64,
    pub confidence_entropy_weight: f64,
    pub strong_threshold: f64,
    pub moderate_threshold: f64,
    pub max_factors: usize,
    pub form_strong_points: f64,
    pub form_weak_points: f64,
    pub h2h_min_meetings: f64,
    pub h2h_favor_rate: f64,
    pub rank_gap: f64,
    pub significant_absences: f64,
    pub rest_advantage_days: f64,
}

impl PredictorConfig {
    pub fn defaults() -> Self {
        Self {
            confidence_max_weight: 0.5,
            confidence_entropy_weight: 0.5,
            strong_threshold: 0.70,
            moderate_threshold: 0.55,
            max_factors: 5,
            form_strong_points: 12.0,
            form_weak_points: 3.0,
            h2h_min_meetings: 5.0,
            h2h_favor_rate: 0.5,
            rank_gap: 10.0,
            significant_absences: 3.0,
            rest_advantage_days: 3.0,
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::defaults();
        config.confidence_max_weight = env_f64(
            "MATCHCAST_CONFIDENCE_MAX_WEIGHT",
            config.confidence_max_weight,
        );
        config.confidence_entropy_weight = env_f64(
            "MATCHCAST_CONFIDENCE_ENTROPY_WEIGHT",
            config.confidence_entropy_weight,
        );
        config.strong_threshold =
            env_f64("MATCHCAST_STRONG_THRESHOLD", config.strong_threshold).clamp(0.0, 1.0);
        config.moderate_threshold =
            env_f64("MATCHCAST_MODERATE_THRESHOLD", config.moderate_threshold).clamp(0.0, 1.0);
        config
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<f64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::{PredictorConfig, TrainingConfig, TrainingGrid};

    #[test]
    fn default_grid_covers_every_combination() {
        let grid = TrainingGrid::defaults();
        assert_eq!(grid.len(), 18);
        assert!(!grid.is_empty());
    }

    #[test]
    fn default_thresholds_match_strength_bands() {
        let config = PredictorConfig::defaults();
        assert!(config.strong_threshold > config.moderate_threshold);
        assert!((config.confidence_max_weight + config.confidence_entropy_weight - 1.0).abs() < 1e-12);
    }

    #[test]
    fn default_split_keeps_a_training_majority() {
        let config = TrainingConfig::defaults();
        assert!(config.test_fraction < 0.5);
        assert!(config.cv_folds >= 2);
    }
}
