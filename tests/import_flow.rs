use std::sync::Arc;
use std::time::Duration;

use raster_import::api::BackendClient;
use raster_import::auth::AuthContext;
use raster_import::library::Library;
use raster_import::model::DataSource;
use raster_import::tracker::{ImportTracker, PollSettings, TrackerEvent};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tracker(server: &MockServer, interval_ms: u64) -> (ImportTracker, mpsc::Receiver<TrackerEvent>) {
    let auth = AuthContext::anonymous();
    let backend = BackendClient::new(reqwest::Client::new(), &server.uri(), auth);
    let (tx, rx) = mpsc::channel(256);
    let settings = PollSettings {
        interval: Duration::from_millis(interval_ms),
        max_transport_retries: 0,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(5),
    };
    (
        ImportTracker::new(Arc::new(backend), Library::shared(), settings, tx),
        rx,
    )
}

async fn mount_create(server: &MockServer, import_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/rasters"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "importId": import_id })),
        )
        .mount(server)
        .await;
}

async fn wait_for(
    rx: &mut mpsc::Receiver<TrackerEvent>,
    pred: impl Fn(&TrackerEvent) -> bool,
) -> TrackerEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let ev = rx.recv().await.expect("event channel closed");
            if pred(&ev) {
                return ev;
            }
        }
    })
    .await
    .expect("timed out waiting for tracker event")
}

async fn status_requests(server: &MockServer, import_id: &str) -> usize {
    let p = format!("/api/job_executions/{import_id}");
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "GET" && r.url.path() == p)
        .count()
}

#[tokio::test]
async fn test_rivers_imported_into_collection() {
    let server = MockServer::start().await;
    mount_create(&server, "J1").await;
    Mock::given(method("GET"))
        .and(path("/api/job_executions/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "PENDING"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/job_executions/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "OK",
            "rasterId": "R1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/rasters/R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "R1",
            "name": "rivers.tif"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/collections/C1/entities"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (tracker, mut rx) = tracker(&server, 20);
    tracker
        .submit(
            DataSource::link("rivers.tif", "https://example.org/rivers.tif"),
            Some("C1".into()),
        )
        .await
        .unwrap();
    {
        let lib = tracker.library();
        let lib = lib.lock().await;
        assert!(lib.placeholder("J1").is_some());
        assert!(lib.is_temporary_member("C1", "J1"));
    }

    wait_for(&mut rx, |e| matches!(e, TrackerEvent::Succeeded { .. })).await;

    let lib = tracker.library();
    let lib = lib.lock().await;
    assert!(lib.entity("J1").is_none());
    assert_eq!(lib.raster("R1").unwrap().name, "rivers.tif");
    assert!(lib.is_member("C1", "R1"));
    assert!(lib.memberships("R1").iter().all(|m| !m.ends_with('*')));
    drop(lib);
    assert_eq!(status_requests(&server, "J1").await, 2);
    server.verify().await;
}

#[tokio::test]
async fn test_failed_import_leaves_only_failure_record() {
    let server = MockServer::start().await;
    mount_create(&server, "J1").await;
    Mock::given(method("GET"))
        .and(path("/api/job_executions/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "FAILED",
            "reason": "bad format"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (tracker, mut rx) = tracker(&server, 20);
    tracker
        .submit(DataSource::link("rivers.tif", "https://example.org/rivers.tif"), None)
        .await
        .unwrap();
    wait_for(&mut rx, |e| matches!(e, TrackerEvent::Failed { .. })).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let lib = tracker.library();
    let lib = lib.lock().await;
    assert!(lib.entities().is_empty());
    assert_eq!(lib.failure("J1").unwrap().reason, "bad format");
    drop(lib);
    server.verify().await;
}

#[tokio::test]
async fn test_cancelled_import_is_never_polled_again() {
    let server = MockServer::start().await;
    mount_create(&server, "J1").await;
    Mock::given(method("GET"))
        .and(path("/api/job_executions/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "PENDING"
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/job_executions/J1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (tracker, mut rx) = tracker(&server, 300);
    let source = DataSource::link("rivers.tif", "https://example.org/rivers.tif");
    tracker.submit(source, Some("C1".into())).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while status_requests(&server, "J1").await < 1 {
        assert!(tokio::time::Instant::now() < deadline, "first poll never arrived");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tracker.cancel("J1").await.unwrap();
    wait_for(&mut rx, |e| matches!(e, TrackerEvent::Cancelled { .. })).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(status_requests(&server, "J1").await, 1);
    let lib = tracker.library();
    let lib = lib.lock().await;
    assert!(lib.entity("J1").is_none());
    assert!(!lib.is_temporary_member("C1", "J1"));
    drop(lib);
    server.verify().await;
}
