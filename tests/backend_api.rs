use std::sync::Arc;

use raster_import::api::{BackendClient, ImportBackend, fetch_env};
use raster_import::auth::{AuthContext, StaticTokenProvider};
use raster_import::error::ApiError;
use raster_import::model::{DataSource, JobStatus};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, token: Option<&str>) -> BackendClient {
    let auth = AuthContext::new(Arc::new(StaticTokenProvider::new(
        token.map(str::to_string),
    )));
    BackendClient::new(reqwest::Client::new(), &server.uri(), auth)
}

#[tokio::test]
async fn test_create_import_posts_data_source_with_bearer() {
    let server = MockServer::start().await;
    let ds = DataSource::link("rivers.tif", "https://example.org/rivers.tif");

    Mock::given(method("POST"))
        .and(path("/api/rasters"))
        .and(header("authorization", "Bearer tok"))
        .and(body_json(serde_json::to_value(&ds).unwrap()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "importId": "J1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server, Some("tok")).create_import(&ds).await.unwrap();
    assert_eq!(id, "J1");
}

#[tokio::test]
async fn test_create_import_without_id_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rasters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .create_import(&DataSource::link("a", "b"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Malformed(_)));
}

#[tokio::test]
async fn test_job_status_parses_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/job_executions/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "OK",
            "rasterId": "R1"
        })))
        .mount(&server)
        .await;

    let report = client(&server, None).job_status("J1").await.unwrap();
    assert_eq!(report.status, JobStatus::Ok);
    assert_eq!(report.raster_id.as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_server_error_becomes_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/job_executions/J1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client(&server, None).job_status("J1").await.unwrap_err();
    match err {
        ApiError::Status { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_anonymous_requests_carry_no_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rasters/R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "R1",
            "name": "rivers",
            "created": 1,
            "modified": 2
        })))
        .mount(&server)
        .await;

    let raster = client(&server, None).fetch_raster("R1").await.unwrap();
    assert_eq!(raster.name, "rivers");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_delete_job_and_raster_paths() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/job_executions/J1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/rasters/R1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let c = client(&server, Some("tok"));
    c.delete_job("J1").await.unwrap();
    c.delete_raster("R1").await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_add_to_collection_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/collections/C1/entities"))
        .and(body_json(serde_json::json!({ "entities": ["R1"] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, None)
        .add_to_collection("C1", &["R1".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_fetch_library_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/library"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "rasters": [{ "id": "R1", "name": "rivers" }],
            "collections": [{ "id": "C1", "title": "Hydrology", "entities": ["R1"] }],
            "visualisations": [{ "id": "V1", "name": "map", "rasterId": "R1" }],
            "dashboards": []
        })))
        .mount(&server)
        .await;

    let snap = client(&server, None).fetch_library().await.unwrap();
    assert_eq!(snap.rasters.len(), 1);
    assert_eq!(snap.collections[0].entities, vec!["R1".to_string()]);
    assert_eq!(snap.visualisations[0].raster_id.as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_fetch_env_bootstrap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/env"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "authProvider": "keycloak",
            "authClientId": "akvo-lumen",
            "authURL": "https://login.example.org/auth",
            "tenant": "t1"
        })))
        .mount(&server)
        .await;

    let env = fetch_env(&reqwest::Client::new(), &server.uri()).await.unwrap();
    assert_eq!(env.auth_provider.as_deref(), Some("keycloak"));
    assert_eq!(env.auth_client_id.as_deref(), Some("akvo-lumen"));
    assert_eq!(env.tenant.as_deref(), Some("t1"));
}
