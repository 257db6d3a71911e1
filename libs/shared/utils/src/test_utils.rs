use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::AuthUser;

pub struct TestConfig {
    pub jwt_secret: String,
    pub postgrest_url: String,
    pub postgrest_service_key: String,
    pub mail_api_url: String,
    pub mail_api_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            postgrest_url: "http://localhost:54321".to_string(),
            postgrest_service_key: "test-service-key".to_string(),
            mail_api_url: "http://localhost:58080".to_string(),
            mail_api_key: "test-mail-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Variant pointing at a wiremock server standing in for PostgREST.
    pub fn with_postgrest_url(url: &str) -> Self {
        Self {
            postgrest_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            postgrest_url: self.postgrest_url.clone(),
            postgrest_service_key: self.postgrest_service_key.clone(),
            jwt_secret: self.jwt_secret.clone(),
            redis_url: None,
            mail_api_url: self.mail_api_url.clone(),
            mail_api_key: self.mail_api_key.clone(),
            mail_sender: "Equipe Slotbook <noreply@slotbook.test>".to_string(),
            cancellation_lead_hours: 2,
            page_size: 20,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            name: "Test User".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
        }
    }

    pub fn to_auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: Some(self.email.clone()),
            name: Some(self.name.clone()),
            issued_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id.to_string(),
            "email": user.email,
            "name": user.name,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for wiremock-backed tests.
pub struct MockPostgrestResponses;

impl MockPostgrestResponses {
    pub fn appointment_row(
        id: Uuid,
        requester_id: Uuid,
        provider_id: Uuid,
        slot: DateTime<Utc>,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "requester_id": requester_id,
            "provider_id": provider_id,
            "slot": slot.to_rfc3339(),
            "created_at": "2024-01-01T00:00:00Z",
            "canceled_at": null
        })
    }

    pub fn canceled_appointment_row(
        id: Uuid,
        requester_id: Uuid,
        provider_id: Uuid,
        slot: DateTime<Utc>,
        canceled_at: DateTime<Utc>,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "requester_id": requester_id,
            "provider_id": provider_id,
            "slot": slot.to_rfc3339(),
            "created_at": "2024-01-01T00:00:00Z",
            "canceled_at": canceled_at.to_rfc3339()
        })
    }

    pub fn profile_row(id: Uuid, name: &str, email: &str, provider: bool) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "email": email,
            "provider": provider,
            "avatar_url": null
        })
    }

    pub fn notification_row(recipient_id: Uuid, content: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "recipient_id": recipient_id,
            "content": content,
            "read": false,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
