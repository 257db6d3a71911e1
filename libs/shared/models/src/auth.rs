use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub iat: Option<u64>,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// The authenticated caller, injected as a request extension by the auth
/// middleware. `id` is the JWT subject and doubles as the requester id for
/// every appointment operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}
