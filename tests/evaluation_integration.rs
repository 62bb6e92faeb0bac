//! Integration tests for evaluation, run tracking and the training monitor.

#[allow(dead_code)]
mod common;

use autoprice::observability::{metrics_router, TOP_FEATURES};
use autoprice::shutdown::ShutdownCoordinator;
use std::time::Duration;
use autoprice::tracking::{FileRunTracker, RunId, RunStatus};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{expected_price, TestEnv};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn row(make: &str, stock_type: &str, msrp: u64, price: f64) -> Value {
    json!({
        "stock_type": stock_type,
        "mileage": 12000.0,
        "msrp": msrp,
        "model_year": 2020,
        "make": make,
        "transmission_from_vin": "A",
        "price": price
    })
}

fn only_run(env: &TestEnv) -> RunId {
    let entries: Vec<_> = std::fs::read_dir(&env.config.tracking.runs_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries.len(), 1);
    entries[0].parse().unwrap()
}

#[test]
fn test_evaluation_publishes_metrics_and_run() {
    let env = TestEnv::new();
    let monitor = env.monitor();
    let dataset = env.dataset(&[
        row("Volvo", "USED", 30000, expected_price(30000.0, true, true)),
        row("Toyota", "NEW", 25000, expected_price(25000.0, false, false)),
        row("Ford", "USED", 18000, expected_price(18000.0, false, true)),
        row("Volvo", "NEW", 40000, expected_price(40000.0, true, false) + 100.0),
    ]);

    let evaluation = autoprice::run_evaluation(&env.config, &monitor, "v1", &dataset).unwrap();
    assert_eq!(evaluation.version, "v1");
    assert_eq!(evaluation.report.samples, 4);
    assert!((evaluation.report.mse - 2500.0).abs() < 1e-6);
    assert!((evaluation.report.rmse - 50.0).abs() < 1e-6);
    assert!((evaluation.report.mae - 25.0).abs() < 1e-6);
    assert_eq!(evaluation.feature_importance[0].0, "stock_type_USED");

    let gauges = monitor.regression_gauges();
    assert!((gauges.mse - 2500.0).abs() < 1e-6);
    assert!((gauges.mae - 25.0).abs() < 1e-6);
    assert!(gauges.r_squared <= 1.0);

    let importance = monitor.feature_importance();
    assert_eq!(importance.len(), TOP_FEATURES);
    assert!(importance
        .iter()
        .any(|(name, value)| name == "stock_type_USED" && *value == -2000.0));
    assert!(importance
        .iter()
        .any(|(name, value)| name == "make_Volvo" && *value == 500.0));

    let tracker = FileRunTracker::from_config(&env.config.tracking);
    let record = tracker.load_run(only_run(&env)).unwrap();
    assert_eq!(record.status, RunStatus::Finished);
    assert!(record.ended_at.is_some());
    assert_eq!(record.params["model_version"], json!("v1"));
    assert_eq!(record.params["alpha"], json!(0.1));
    assert!((record.metrics["mse"] - 2500.0).abs() < 1e-6);
    assert!(record.metrics.contains_key("r2_score"));
}

#[test]
fn test_failed_evaluation_closes_run_as_failed() {
    let env = TestEnv::new();
    let monitor = env.monitor();
    let dataset = env.dataset(&[row("Volvo", "USED", 30000, 1.0)]);

    let err = autoprice::run_evaluation(&env.config, &monitor, "v2", &dataset).unwrap_err();
    assert_eq!(err.status_code(), 404);

    let tracker = FileRunTracker::from_config(&env.config.tracking);
    let record = tracker.load_run(only_run(&env)).unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.metrics.is_empty());
    assert_eq!(monitor.regression_gauges().mse, 0.0);
}

#[test]
fn test_dataset_errors_name_the_line() {
    let env = TestEnv::new();
    let monitor = env.monitor();
    let mut bad = row("Volvo", "USED", 30000, 1.0);
    bad.as_object_mut().unwrap().remove("price");
    let dataset = env.dataset(&[row("Volvo", "USED", 30000, 1.0), bad]);

    let err = autoprice::run_evaluation(&env.config, &monitor, "v1", &dataset).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("line 2"), "{}", message);
    assert!(message.contains("price"), "{}", message);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_evaluation() {
    let env = TestEnv::new();
    let monitor = env.monitor();
    let dataset = env.dataset(&[
        row("Volvo", "USED", 30000, expected_price(30000.0, true, true) + 10.0),
        row("Toyota", "NEW", 25000, expected_price(25000.0, false, false) - 10.0),
    ]);
    autoprice::run_evaluation(&env.config, &monitor, "v1", &dataset).unwrap();

    let response = metrics_router(monitor)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains("regression_mean_squared_error 100"));
    assert!(text.contains("regression_mean_absolute_error 10"));
    assert!(text.contains("feature_importance{feature_name=\"stock_type_USED\"} -2000"));
}

#[tokio::test]
async fn test_telemetry_samples_resources_during_evaluation() {
    let mut env = TestEnv::new();
    env.config.monitor.metrics_addr = "127.0.0.1:0".parse().unwrap();
    let monitor = env.monitor();
    let coordinator = ShutdownCoordinator::with_timeout(Duration::from_secs(5));

    let handles = autoprice::spawn_telemetry(&env.config, monitor.clone(), &coordinator);
    assert_eq!(handles.len(), 2);

    let dataset = env.dataset(&[row("Volvo", "USED", 30000, 1.0)]);
    autoprice::run_evaluation(&env.config, &monitor, "v1", &dataset).unwrap();

    let sampled = tokio::time::timeout(Duration::from_secs(5), async {
        while monitor.resource_usage().memory_bytes == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(sampled.is_ok(), "memory_usage_bytes never published");
    assert!(monitor.render().unwrap().contains("memory_usage_bytes"));

    coordinator.shutdown();
    coordinator.drain(handles).await;
}
