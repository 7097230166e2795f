//! Smoke tests against a local observability stack.
//!
//! Requires an OTLP collector on :4317 feeding Tempo (:3200) and
//! Prometheus (:9090).
//!
//! Run with:
//! ```sh
//! cargo test --test telemetry_smoke_test -- --ignored --nocapture
//! ```

use flightmap::Group;
use flightmap::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use std::convert::Infallible;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static TELEMETRY: OnceLock<TelemetryGuard> = OnceLock::new();

fn ensure_telemetry() -> &'static TelemetryGuard {
    TELEMETRY.get_or_init(|| {
        init_telemetry(TelemetryConfig {
            endpoint: Some("http://localhost:4317".to_string()),
            service_name: "flightmap-smoke-test".to_string(),
            log_level: "debug".to_string(),
        })
        .expect("failed to init telemetry")
    })
}

/// Force-flush all providers and give backends time to ingest.
async fn flush_and_wait(guard: &TelemetryGuard) {
    guard.force_flush();
    tokio::time::sleep(Duration::from_secs(8)).await;
}

/// Run one burst of duplicate calls so every instrument and span fires.
async fn run_burst() {
    let group = Arc::new(Group::<&'static str, u64>::new());
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                group
                    .run("smoke", || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, Infallible>(1)
                    })
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }
}

#[test]
#[ignore]
fn smoke_traces() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();
        run_burst().await;
        flush_and_wait(guard).await;

        let client = reqwest::Client::new();
        let resp = client
            .get("http://localhost:3200/api/search")
            .query(&[("tags", "service.name=flightmap-smoke-test"), ("limit", "5")])
            .send()
            .await
            .expect("failed to query Tempo");
        assert!(
            resp.status().is_success(),
            "Tempo query failed: {}",
            resp.status()
        );

        let body: serde_json::Value = resp.json().await.expect("failed to parse Tempo response");
        let traces = body["traces"].as_array();
        assert!(
            traces.is_some_and(|t| !t.is_empty()),
            "expected traces in Tempo, got: {body}"
        );
    });
}

#[test]
#[ignore]
fn smoke_metrics() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();
        run_burst().await;
        flush_and_wait(guard).await;

        let client = reqwest::Client::new();
        let resp = client
            .get("http://localhost:9090/api/v1/query")
            .query(&[("query", "flightmap_flight_calls_total")])
            .send()
            .await
            .expect("failed to query Prometheus");
        assert!(
            resp.status().is_success(),
            "Prometheus query failed: {}",
            resp.status()
        );

        let body: serde_json::Value = resp
            .json()
            .await
            .expect("failed to parse Prometheus response");
        let results = body["data"]["result"].as_array();
        assert!(
            results.is_some_and(|r| !r.is_empty()),
            "expected metric results in Prometheus, got: {body}"
        );
        println!(
            "Prometheus: found {} series for flightmap_flight_calls_total",
            results.unwrap().len()
        );
    });
}
