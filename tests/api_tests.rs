mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{ScriptedSource, at, open_store, process, snapshot};
use driftx::analysis::Thresholds;
use driftx::api;
use driftx::monitor::{AnalysisSettings, Monitor};
use driftx::scheduler::{Scheduler, SchedulerSettings};
use driftx::store::SnapshotStore;
use driftx::system::{SnapshotId, SnapshotSource};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

struct Harness {
    _dir: TempDir,
    store: Arc<SnapshotStore>,
    app: Router,
}

fn harness(source: ScriptedSource) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open_store(dir.path(), 50));
    let source: Arc<dyn SnapshotSource> = Arc::new(source);
    let scheduler = Scheduler::new(
        source,
        Arc::clone(&store),
        SchedulerSettings {
            interval: Duration::from_secs(300),
            auto_snapshot_enabled: false,
        },
    );
    let monitor = Arc::new(Monitor::new(
        Arc::clone(&store),
        scheduler,
        AnalysisSettings {
            thresholds: Thresholds::default(),
            stuck_window: 3,
        },
    ));
    Harness {
        _dir: dir,
        store,
        app: api::router(monitor, 5),
    }
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri).await
}

#[tokio::test]
async fn empty_store_responses() {
    let h = harness(ScriptedSource::new(Vec::new()));

    let (status, body) = get(&h.app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "driftx running");

    let (status, body) = get(&h.app, "/latest-snapshot").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());

    let (status, _) = get(&h.app, "/resource-analysis").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&h.app, "/alerts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));

    let (status, body) = get(&h.app, "/drift").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "need at least 2 snapshots, found 0");

    let (status, body) = get(&h.app, "/snapshot-info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_snapshots"], 0);
    assert!(body["latest_snapshot"].is_null());
}

#[tokio::test]
async fn analysis_endpoints_over_stored_history() {
    let h = harness(ScriptedSource::new(Vec::new()));
    h.store
        .persist(&snapshot(
            at(0),
            vec![process(1, "A", 1.0, 1.0), process(2, "B", 30.0, 2.0)],
        ))
        .unwrap();
    h.store
        .persist(&snapshot(
            at(300),
            vec![process(2, "B", 95.0, 2.0), process(3, "C", 0.5, 25.0)],
        ))
        .unwrap();

    let (status, body) = get(&h.app, "/drift").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], serde_json::json!(["C"]));
    assert_eq!(body["removed"], serde_json::json!(["A"]));
    assert_eq!(
        body["new_snapshot"],
        SnapshotId::from_timestamp(at(300)).as_str()
    );

    let (status, body) = get(&h.app, "/resource-analysis").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_processes"], 2);
    assert_eq!(body["risk_level"], "HIGH");
    assert_eq!(body["high_cpu_processes"][0]["pid"], 2);
    assert_eq!(body["high_memory_processes"][0]["severity"], "critical");
    assert_eq!(body["stuck_processes"], serde_json::json!([]));

    let (status, body) = get(&h.app, "/alerts").await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|a| (a["pid"].as_u64().unwrap(), a["type"].as_str().unwrap()))
        .collect();
    assert_eq!(kinds, vec![(2, "high_cpu"), (3, "high_memory")]);

    let (status, body) = get(&h.app, "/process-details/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "C");

    let (status, _) = get(&h.app, "/process-details/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&h.app, "/current-processes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = get(&h.app, "/timeline?count=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(
        body[0]["snapshot"],
        SnapshotId::from_timestamp(at(300)).as_str()
    );

    let (status, body) = get(&h.app, "/timeline").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn drift_over_a_corrupt_newest_snapshot_fails() {
    let h = harness(ScriptedSource::new(Vec::new()));
    for i in 0..3 {
        h.store
            .persist(&snapshot(at(i), vec![process(1, "A", 0.0, 0.0)]))
            .unwrap();
    }
    let newest = SnapshotId::from_timestamp(at(2));
    std::fs::write(h.store.dir().join(newest.as_str()), b"{ truncated").unwrap();

    let (status, body) = get(&h.app, "/drift").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body["error"]
            .as_str()
            .is_some_and(|e| e.contains(newest.as_str()))
    );
}

#[tokio::test]
async fn stuck_process_raises_risk_and_alert() {
    let h = harness(ScriptedSource::new(Vec::new()));
    for (i, cpu) in [85.0, 90.0, 88.0].into_iter().enumerate() {
        h.store
            .persist(&snapshot(
                at(i as i64 * 300),
                vec![process(100, "spinner", cpu, 1.0)],
            ))
            .unwrap();
    }

    let (status, body) = get(&h.app, "/stuck-processes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["pid"], 100);
    assert_eq!(body[0]["avg_cpu"], 87.67);
    assert_eq!(body[0]["duration_snapshots"], 3);

    let (_, body) = get(&h.app, "/alerts").await;
    let stuck: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["type"] == "stuck")
        .collect();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0]["severity"], "critical");
}

#[tokio::test]
async fn trigger_snapshot_persists() {
    let h = harness(ScriptedSource::new(vec![
        process(1, "init", 0.1, 0.2),
        process(2, "api", 20.0, 4.0),
    ]));

    let (status, body) = send(&h.app, Method::POST, "/trigger-snapshot").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["processes"], 2);
    assert_eq!(body["skipped"], 1);
    assert_eq!(h.store.count().unwrap(), 1);

    let (status, body) = get(&h.app, "/latest-snapshot").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processes"].as_array().unwrap().len(), 2);

    let (status, body) = get(&h.app, "/scheduler-status").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["last_capture_at"].is_string());

    let (status, _) = get(&h.app, "/trigger-snapshot").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trigger_while_capturing_conflicts() {
    let gate = Arc::new(Notify::new());
    let h = harness(ScriptedSource::new(Vec::new()).gated(Arc::clone(&gate)));

    let first = tokio::spawn({
        let app = h.app.clone();
        async move { send(&app, Method::POST, "/trigger-snapshot").await }
    });

    let mut conflict = None;
    for _ in 0..200 {
        let (status, body) = get(&h.app, "/scheduler-status").await;
        assert_eq!(status, StatusCode::OK);
        if body["capture_in_progress"] == true {
            conflict = Some(send(&h.app, Method::POST, "/trigger-snapshot").await);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let (status, body) = conflict.expect("first capture never started");
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "a capture is already in progress");

    gate.notify_one();
    let (status, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.store.count().unwrap(), 1);
}
