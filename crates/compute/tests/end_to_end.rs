use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};

use vigil_compute::{
    AnalyticsEngine, ForecastRequest, MetricStore, ModelRegistry, ModelSettings, Trainer, TrainingStatus,
};
use vigil_core::{MetricPoint, SeriesKey, VigilError};

fn latency_series() -> Vec<MetricPoint> {
    let base = Utc::now() - Duration::minutes(30);
    (0..25)
        .map(|i| MetricPoint::new(base + Duration::minutes(i), "svc-a", "latency_ms", 100.0 + i as f64))
        .collect()
}

#[tokio::test]
async fn train_all_then_predict() {
    let points = latency_series();
    let mut store = MetricStore::new(10_000);
    store.append(points.clone());
    let registry = ModelRegistry::new(ModelSettings::default()).into_shared();
    let trainer = Trainer::new(store.into_shared(), Arc::clone(&registry), StdDuration::from_secs(30));

    let summary = trainer.run().await.unwrap();
    assert_eq!(summary.forecast_trained, 1);

    let registry = registry.read().unwrap();
    let key = SeriesKey::new("svc-a", "latency_ms");
    let model = registry.get_forecast(&key).expect("model registered");
    assert!(model.is_trained());
    assert!((0.0..=1.0).contains(&model.accuracy()));

    let forecast = model.predict(&points, 3).unwrap();
    assert_eq!(forecast.predictions.len(), 3);
    let steps: Vec<usize> = forecast.predictions.iter().map(|p| p.step).collect();
    assert_eq!(steps, vec![1, 2, 3]);
    assert!(forecast
        .predictions
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp));
    for (p, ci) in forecast.predictions.iter().zip(&forecast.confidence_intervals) {
        assert!(ci.lower_bound <= p.predicted_value && p.predicted_value <= ci.upper_bound);
    }
}

#[test]
fn short_series_stays_untrained() {
    let base = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    let points: Vec<MetricPoint> = (0..19)
        .map(|i| MetricPoint::new(base + Duration::minutes(i), "svc-b", "cpu", 40.0))
        .collect();
    let mut registry = ModelRegistry::new(ModelSettings::default());
    registry.train_all(&points);

    let key = SeriesKey::new("svc-b", "cpu");
    assert!(registry.get_forecast(&key).map_or(true, |m| !m.is_trained()));
}

#[test]
fn store_keeps_latest_points_in_order() {
    let base = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    let mut store = MetricStore::new(5);
    store.append((0..12).map(|i| MetricPoint::new(base + Duration::seconds(i), "s", "m", i as f64)));

    let values: Vec<f64> = store.snapshot().iter().map(|p| p.value).collect();
    assert_eq!(values, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
}

#[tokio::test]
async fn engine_flow_through_background_training() {
    let engine = AnalyticsEngine::with_parts(
        MetricStore::new(10_000).into_shared(),
        ModelRegistry::new(ModelSettings::default()).into_shared(),
        StdDuration::from_secs(30),
        1000.0,
    );
    engine.ingest(latency_series()).unwrap();

    let request = ForecastRequest {
        source: "svc-a".into(),
        metric_name: "latency_ms".into(),
        horizon_minutes: 3,
        confidence_level: 0.9,
    };
    assert!(matches!(engine.forecast(request.clone()), Err(VigilError::NotFound(_))));

    assert_eq!(engine.trigger_training().status, TrainingStatus::Started);
    for _ in 0..1000 {
        if engine.status().unwrap().models_trained == 1 && !engine.status().unwrap().training_running {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }

    let response = engine.forecast(request).unwrap();
    assert_eq!(response.predictions.len(), 3);
    assert_eq!(response.confidence_level, 0.9);
    assert!(response.confidence_intervals.iter().all(|ci| ci.confidence_level == 0.95));
}
