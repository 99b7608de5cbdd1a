use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use matchcast::calibration::{CalibrationParams, Outcome, Prob3};
use matchcast::config::{PredictorConfig, TrainingConfig, TrainingGrid};
use matchcast::features::FeatureGenerator;
use matchcast::model::{FitOptions, SoftmaxModel};
use matchcast::predictor::Predictor;
use matchcast::store;
use matchcast::synthetic::{self, DEMO_LEAGUE_ID};
use matchcast::training::{self, CancelFlag, TrainingRequest};

fn small_config() -> TrainingConfig {
    TrainingConfig {
        test_fraction: 0.2,
        cv_folds: 2,
        min_train_events: 50,
        grid: TrainingGrid {
            learning_rates: vec![0.1],
            l2_strengths: vec![0.01],
            max_iters: vec![150],
        },
    }
}

fn bench_feature_generation(c: &mut Criterion) {
    let conn = store::open_db_in_memory().expect("db");
    synthetic::seed_demo_league(&conn, 7).expect("seed");
    let generator =
        FeatureGenerator::from_store(&conn, Some(DEMO_LEAGUE_ID), None).expect("generator");
    let upcoming =
        store::load_upcoming_events(&conn, Some(DEMO_LEAGUE_ID), "2024-12-01T00:00:00Z", None)
            .expect("upcoming");
    let event = upcoming.first().expect("one fixture").clone();

    c.bench_function("feature_vector_generation", |b| {
        b.iter(|| {
            let vector = generator.generate_for_event(black_box(&event)).unwrap();
            black_box(vector.values.len());
        })
    });
}

fn bench_batch_prediction(c: &mut Criterion) {
    let conn = store::open_db_in_memory().expect("db");
    synthetic::seed_demo_league(&conn, 7).expect("seed");

    let request = TrainingRequest {
        league: Some(DEMO_LEAGUE_ID),
        from: None,
        until: None,
    };
    let outcome =
        training::train(&conn, &small_config(), &request, &CancelFlag::new()).expect("train");
    let generator =
        FeatureGenerator::from_store(&conn, Some(DEMO_LEAGUE_ID), None).expect("generator");
    let predictor = Predictor::new(outcome.artifact, generator, PredictorConfig::defaults());
    let upcoming =
        store::load_upcoming_events(&conn, Some(DEMO_LEAGUE_ID), "2024-12-01T00:00:00Z", None)
            .expect("upcoming");

    c.bench_function("batch_prediction_12_events", |b| {
        b.iter(|| {
            let batch = predictor.predict_batch(black_box(&upcoming)).unwrap();
            black_box(batch.records.len());
        })
    });
}

fn bench_calibration_fit(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut probs = Vec::with_capacity(400);
    let mut outcomes = Vec::with_capacity(400);
    for _ in 0..400 {
        let p = Prob3::from_array([rng.r#gen(), rng.r#gen(), rng.r#gen()]).normalized();
        let outcome = if rng.gen_bool(p.home.clamp(0.0, 1.0)) {
            Outcome::Home
        } else if rng.gen_bool(0.5) {
            Outcome::Draw
        } else {
            Outcome::Away
        };
        probs.push(p);
        outcomes.push(outcome);
    }

    c.bench_function("calibration_fit_400", |b| {
        b.iter(|| {
            let params = CalibrationParams::fit(black_box(&probs), black_box(&outcomes));
            black_box(params.apply(probs[0]));
        })
    });
}

fn bench_model_fit(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(9);
    let mut rows = Vec::with_capacity(300);
    let mut labels = Vec::with_capacity(300);
    for i in 0..300usize {
        let class = i % 3;
        let center = (class as f64 - 1.0) * 2.0;
        rows.push(
            (0..6)
                .map(|_| center + rng.gen_range(-1.0..1.0))
                .collect::<Vec<f64>>(),
        );
        labels.push(class);
    }
    let opts = FitOptions {
        learning_rate: 0.1,
        l2: 0.01,
        max_iters: 100,
    };

    c.bench_function("softmax_fit_300", |b| {
        b.iter(|| {
            let (model, report) = SoftmaxModel::fit(black_box(&rows), black_box(&labels), opts);
            black_box((model.predict(&rows[0]), report.iterations));
        })
    });
}

criterion_group!(
    perf,
    bench_feature_generation,
    bench_batch_prediction,
    bench_calibration_fit,
    bench_model_fit
);
criterion_main!(perf);
