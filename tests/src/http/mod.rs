use assessor::commands::{self, Context};
use assessor_core::api::{ApiError, AssessmentApi, HttpAssessmentApi};
use assessor_core::config::ApiSettings;
use assessor_core::model::{AssessmentUpdate, JobStatus, UploadFile};
use assessor_core::polling::Pollable;
use assessor_core::JobStore;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer, token: Option<&str>) -> HttpAssessmentApi {
    HttpAssessmentApi::new(&ApiSettings {
        base_url: server.uri(),
        token: token.map(str::to_string),
        timeout: Duration::from_secs(5),
    })
    .expect("client")
}

fn assessment(id: &str, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "sourceType": "rvtools",
        "createdAt": "2026-03-01T10:00:00Z"
    })
}

#[tokio::test]
async fn uploads_rvtools_file_as_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/assessments/rvtools"))
        .and(header("authorization", "Bearer secret"))
        .and(body_string_contains("name=\"name\""))
        .and(body_string_contains("filename=\"cluster.xlsx\""))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "id": 1,
            "status": "pending"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server, Some("secret"));
    let job = api
        .create_rvtools_job(
            "Cluster",
            &UploadFile::new("cluster.xlsx", b"rvtools-bytes".to_vec()),
            &CancellationToken::new(),
        )
        .await
        .expect("job");
    assert_eq!(job.id, 1);
    assert_eq!(job.status, JobStatus::Pending);
}

#[tokio::test]
async fn maps_error_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assessments/jobs/404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "job not found"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assessments/jobs/500"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(json!({"code": "parse_error", "message": "bad sheet"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/assessments/jobs/401"))
        .respond_with(ResponseTemplate::new(401).set_body_string("<html>denied</html>"))
        .mount(&server)
        .await;

    let api = api_for(&server, None);
    let cancel = CancellationToken::new();

    let err = api.get_job(404, &cancel).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(ref message) if message == "job not found"));

    let err = api.get_job(500, &cancel).await.unwrap_err();
    match err {
        ApiError::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 500);
            assert_eq!(code, "parse_error");
            assert_eq!(message, "bad sheet");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = api.cancel_job(401).await.unwrap_err();
    assert!(matches!(err, ApiError::Auth(ref message) if message == "HTTP 401"));
}

#[tokio::test]
async fn classifies_errors_by_status_without_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assessments/jobs/7"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/assessments/a-7"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "read-only token"})))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/assessments/a-7"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let api = api_for(&server, None);
    let err = api.get_job(7, &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(ref message) if message == "HTTP 404"));

    let err = api.delete_assessment("a-7").await.unwrap_err();
    assert!(matches!(err, ApiError::Auth(ref message) if message == "read-only token"));

    let err = api
        .update_assessment("a-7", &AssessmentUpdate::default())
        .await
        .unwrap_err();
    match err {
        ApiError::Api { status, code, message } => {
            assert_eq!(status, 502);
            assert_eq!(code, "unknown");
            assert_eq!(message, "HTTP 502");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn normalizes_list_payloads_and_rejects_unknown_shapes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assessments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "assessments": [assessment("a-1", "Lab"), assessment("a-2", "Prod")]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assessments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let api = api_for(&server, None);
    let cancel = CancellationToken::new();
    let listed = api.list_assessments(&cancel).await.expect("list");
    assert_eq!(
        listed.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
        vec!["Lab", "Prod"]
    );
    assert!(listed[0].created_at.is_some());

    let err = api.list_assessments(&cancel).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn cancelled_token_abandons_slow_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assessments/jobs/3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 3, "status": "parsing"}))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let api = api_for(&server, None);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = api.get_job(3, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn updates_and_deletes_assessments() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/assessments/a-1"))
        .and(body_json(json!({"name": "Renamed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(assessment("a-1", "Renamed")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/assessments/a-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let api = api_for(&server, None);
    let updated = api
        .update_assessment(
            "a-1",
            &AssessmentUpdate {
                name: Some("Renamed".into()),
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.name, "Renamed");
    api.delete_assessment("a-1").await.expect("delete");
}

#[tokio::test]
async fn job_store_polls_http_backend_until_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/assessments/rvtools"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"id": 1, "status": "parsing"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/assessments/jobs/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "status": "completed",
            "assessmentId": "a-1"
        })))
        .mount(&server)
        .await;

    let jobs = Arc::new(JobStore::new(Arc::new(api_for(&server, None))));
    jobs.create_rvtools_job("My Assessment", &UploadFile::new("inv.xlsx", vec![1, 2]))
        .await
        .expect("create");
    jobs.start_polling(Duration::from_millis(20));

    let mut waited = Duration::ZERO;
    while !jobs.current_job().is_some_and(|job| job.is_terminal()) {
        assert!(waited < Duration::from_secs(5), "job never completed");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    let requests = server.received_requests().await.expect("recording").len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.received_requests().await.expect("recording").len(), requests);
    jobs.stop_polling();

    let job = jobs.current_job().expect("job");
    assert_eq!(job.assessment_id.as_deref(), Some("a-1"));
}

#[tokio::test]
async fn import_command_posts_inventory() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/assessments"))
        .and(body_json(json!({
            "name": "Agent import",
            "sourceType": "inventory",
            "inventory": {"vms": {"total": 12}}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "a-9",
            "name": "Agent import",
            "sourceType": "inventory"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut inventory = tempfile::NamedTempFile::new()?;
    write!(inventory, "{}", json!({"vms": {"total": 12}}))?;

    let ctx = Context {
        api: Arc::new(api_for(&server, None)),
        poll_interval: Duration::from_millis(100),
    };
    commands::import_inventory(&ctx, "Agent import", inventory.path()).await?;
    Ok(())
}
