use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use appointment_cell::services::store::{AppointmentStore, PostgrestAppointmentStore};
use appointment_cell::services::time_rules;
use appointment_cell::AppState;
use directory_cell::{Directory, PostgrestDirectory};
use mailer_cell::{
    CancellationJob, CancellationMailProducer, CancellationQueue, JobStatus, MailQueueError,
};
use shared_database::PostgrestClient;
use shared_utils::test_utils::{JwtTestUtils, MockPostgrestResponses, TestConfig, TestUser};

/// Captures enqueued cancellation jobs so tests can assert on the snapshot.
#[derive(Default)]
struct RecordingQueue {
    jobs: Mutex<HashMap<Uuid, CancellationJob>>,
}

impl RecordingQueue {
    async fn enqueued_jobs(&self) -> Vec<CancellationJob> {
        self.jobs.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl CancellationQueue for RecordingQueue {
    async fn enqueue_job(&self, job: &CancellationJob) -> Result<(), MailQueueError> {
        self.jobs.lock().await.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn dequeue_job(&self, _worker_id: &str) -> Result<Option<CancellationJob>, MailQueueError> {
        Ok(None)
    }

    async fn update_job_status(
        &self,
        _job_id: Uuid,
        _status: JobStatus,
        _error_message: Option<String>,
    ) -> Result<(), MailQueueError> {
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<CancellationJob>, MailQueueError> {
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }

    async fn retry_job(&self, _job_id: Uuid) -> Result<(), MailQueueError> {
        Ok(())
    }

    async fn cleanup_expired_jobs(&self) -> Result<u64, MailQueueError> {
        Ok(0)
    }
}

fn create_test_app(mock_server: &MockServer, queue: Arc<RecordingQueue>) -> Router {
    let config = Arc::new(TestConfig::with_postgrest_url(&mock_server.uri()).to_app_config());
    let db = Arc::new(PostgrestClient::new(&config));
    let store: Arc<dyn AppointmentStore> =
        Arc::new(PostgrestAppointmentStore::new(Arc::clone(&db)));
    let directory: Arc<dyn Directory> = Arc::new(PostgrestDirectory::new(Arc::clone(&db)));
    let producer = Arc::new(CancellationMailProducer::new(queue));

    let state = Arc::new(AppState::new(config, db, store, directory, producer));
    appointment_routes(state)
}

fn bearer_token(user: &TestUser) -> String {
    JwtTestUtils::create_test_token(user, &TestConfig::default().jwt_secret, Some(24))
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

/// A raw booking date two days out, at 23 minutes past the hour, plus the
/// hour-aligned slot it should normalize to.
fn future_raw_date() -> (String, DateTime<Utc>) {
    let base = Utc::now() + Duration::days(2);
    let raw = base
        .date_naive()
        .and_hms_opt(base.hour(), 23, 0)
        .unwrap()
        .and_utc();
    (raw.to_rfc3339(), time_rules::normalize(raw))
}

#[tokio::test]
async fn booking_normalizes_the_slot_and_notifies_the_provider() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::new("Alice Souza", "alice@example.com");
    let provider_id = Uuid::new_v4();
    let (raw_date, slot) = future_raw_date();
    let appointment_id = Uuid::new_v4();

    // Free slot.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::profile_row(provider_id, "Cecília Ramos", "cecilia@example.com", true)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", requester.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::profile_row(requester.id, "Alice Souza", "alice@example.com", false)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockPostgrestResponses::appointment_row(appointment_id, requester.id, provider_id, slot)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockPostgrestResponses::notification_row(provider_id, "Novo agendamento")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, queue);
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "provider_id": provider_id, "date": raw_date }).to_string(),
        ))
        .unwrap();

    let (status, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(appointment_id));
    assert_eq!(body["provider_id"], json!(provider_id));
    let returned_slot: DateTime<Utc> = body["slot"].as_str().unwrap().parse().unwrap();
    assert_eq!(returned_slot, slot);
    assert_eq!(returned_slot.minute(), 0);
}

#[tokio::test]
async fn booking_a_past_date_is_rejected() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::default();
    let provider_id = Uuid::new_v4();

    let app = create_test_app(&mock_server, queue);
    let raw_date = (Utc::now() - Duration::days(1)).to_rfc3339();
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "provider_id": provider_id, "date": raw_date }).to_string(),
        ))
        .unwrap();

    let (status, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Past dates are not permitted"));
}

#[tokio::test]
async fn booking_a_malformed_date_is_rejected() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::default();

    let app = create_test_app(&mock_server, queue);
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "provider_id": Uuid::new_v4(), "date": "not-a-date" }).to_string(),
        ))
        .unwrap();

    let (status, _body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_an_occupied_slot_is_rejected() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::default();
    let provider_id = Uuid::new_v4();
    let (raw_date, slot) = future_raw_date();

    // Another requester already holds the slot.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::appointment_row(Uuid::new_v4(), Uuid::new_v4(), provider_id, slot)
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, queue);
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "provider_id": provider_id, "date": raw_date }).to_string(),
        ))
        .unwrap();

    let (status, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Appointment date is not available"));
}

#[tokio::test]
async fn booking_with_a_non_provider_is_rejected() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::default();
    let target_id = Uuid::new_v4();
    let (raw_date, _slot) = future_raw_date();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // The provider flag filter matches nothing for this account.
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("provider", "is.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, queue);
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "provider_id": target_id, "date": raw_date }).to_string(),
        ))
        .unwrap();

    let (status, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("You can only create appointments with providers"));
}

#[tokio::test]
async fn booking_survives_a_failed_notification_insert() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::new("Alice Souza", "alice@example.com");
    let provider_id = Uuid::new_v4();
    let (raw_date, slot) = future_raw_date();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::profile_row(provider_id, "Cecília Ramos", "cecilia@example.com", true)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockPostgrestResponses::appointment_row(Uuid::new_v4(), requester.id, provider_id, slot)
        ])))
        .mount(&mock_server)
        .await;

    // Notification insert blows up; the booking must stand regardless.
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, queue);
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "provider_id": provider_id, "date": raw_date }).to_string(),
        ))
        .unwrap();

    let (status, _body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn listing_joins_provider_display_fields() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::default();
    let provider_id = Uuid::new_v4();
    let first_slot = time_rules::normalize(Utc::now() + Duration::days(1));
    let second_slot = first_slot + Duration::hours(3);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("requester_id", format!("eq.{}", requester.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::appointment_row(Uuid::new_v4(), requester.id, provider_id, first_slot),
            MockPostgrestResponses::appointment_row(Uuid::new_v4(), requester.id, provider_id, second_slot),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("in.({})", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::profile_row(provider_id, "Cecília Ramos", "cecilia@example.com", true)
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, queue);
    let request = Request::builder()
        .method("GET")
        .uri("/?page=1")
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["provider"]["name"], json!("Cecília Ramos"));
    assert_eq!(entries[1]["provider"]["id"], json!(provider_id));
}

#[tokio::test]
async fn cancellation_enqueues_a_mail_job_with_the_snapshot() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::new("Alice Souza", "alice@example.com");
    let provider_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let slot = time_rules::normalize(Utc::now() + Duration::hours(3));
    let canceled_at = Utc::now();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::appointment_row(appointment_id, requester.id, provider_id, slot)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(query_param("canceled_at", "is.null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::canceled_appointment_row(
                appointment_id, requester.id, provider_id, slot, canceled_at,
            )
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::profile_row(provider_id, "Cecília Ramos", "cecilia@example.com", true)
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", requester.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::profile_row(requester.id, "Alice Souza", "alice@example.com", false)
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, Arc::clone(&queue));
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/{}", appointment_id))
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["canceled_at"].is_string());

    let jobs = queue.enqueued_jobs().await;
    assert_eq!(jobs.len(), 1);
    let snapshot = &jobs[0].snapshot;
    assert_eq!(snapshot.appointment_id, appointment_id);
    assert_eq!(snapshot.slot, slot);
    assert_eq!(snapshot.requester_name, "Alice Souza");
    assert_eq!(snapshot.provider_name, "Cecília Ramos");
    assert_eq!(snapshot.provider_email, "cecilia@example.com");
}

#[tokio::test]
async fn cancellation_inside_the_lead_window_is_rejected() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::default();
    let appointment_id = Uuid::new_v4();
    // The next hour boundary is always less than two hours away.
    let slot = time_rules::normalize(Utc::now() + Duration::hours(1));

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::appointment_row(appointment_id, requester.id, Uuid::new_v4(), slot)
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, Arc::clone(&queue));
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/{}", appointment_id))
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["error"],
        json!("You can only cancel appointments 2 hours in advance")
    );
    assert!(queue.enqueued_jobs().await.is_empty());
}

#[tokio::test]
async fn cancelling_someone_elses_appointment_is_rejected() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::default();
    let appointment_id = Uuid::new_v4();
    let slot = time_rules::normalize(Utc::now() + Duration::days(1));

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::appointment_row(appointment_id, Uuid::new_v4(), Uuid::new_v4(), slot)
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, Arc::clone(&queue));
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/{}", appointment_id))
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .body(Body::empty())
        .unwrap();

    let (status, _body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(queue.enqueued_jobs().await.is_empty());
}

#[tokio::test]
async fn cancelling_a_missing_appointment_is_not_found() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::default();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, queue);
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/{}", Uuid::new_v4()))
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .body(Body::empty())
        .unwrap();

    let (status, _body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancelling_twice_reports_a_conflict() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());
    let requester = TestUser::default();
    let appointment_id = Uuid::new_v4();
    let slot = time_rules::normalize(Utc::now() + Duration::days(1));
    let earlier = Utc::now() - Duration::hours(1);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockPostgrestResponses::canceled_appointment_row(
                appointment_id, requester.id, Uuid::new_v4(), slot, earlier,
            )
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server, Arc::clone(&queue));
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/{}", appointment_id))
        .header("Authorization", format!("Bearer {}", bearer_token(&requester)))
        .body(Body::empty())
        .unwrap();

    let (status, _body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(queue.enqueued_jobs().await.is_empty());
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let mock_server = MockServer::start().await;
    let queue = Arc::new(RecordingQueue::default());

    let app = create_test_app(&mock_server, queue);
    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();

    let (status, _body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
