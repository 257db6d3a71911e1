use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Display and contact fields of an account, as the identity service exposes
/// them. Identity lifecycle (signup, credentials, avatars) is owned elsewhere;
/// this cell only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub provider: bool,
    pub avatar_url: Option<String>,
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Profile not found")]
    NotFound,

    #[error("Directory lookup failed: {0}")]
    LookupFailed(String),
}
