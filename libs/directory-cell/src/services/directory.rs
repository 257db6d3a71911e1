use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_database::{DbError, PostgrestClient};

use crate::models::{DirectoryError, Profile};

/// Read-side interface to the identity service. Booking only ever needs to
/// know whether an account is a provider and how to address it.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn is_provider(&self, id: Uuid) -> Result<bool, DirectoryError>;

    async fn get_profile(&self, id: Uuid) -> Result<Profile, DirectoryError>;

    /// Batch lookup used by the appointment listing to join display fields.
    /// Unknown ids are simply absent from the result.
    async fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>, DirectoryError>;
}

pub struct PostgrestDirectory {
    db: Arc<PostgrestClient>,
}

impl PostgrestDirectory {
    pub fn new(db: Arc<PostgrestClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Directory for PostgrestDirectory {
    async fn is_provider(&self, id: Uuid) -> Result<bool, DirectoryError> {
        debug!("Checking provider flag for {}", id);

        let path = format!("/rest/v1/profiles?id=eq.{}&provider=is.true&select=id&limit=1", id);
        let rows: Vec<serde_json::Value> = self
            .db
            .request(Method::GET, &path, None)
            .await
            .map_err(map_db_error)?;

        Ok(!rows.is_empty())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Profile, DirectoryError> {
        debug!("Fetching profile {}", id);

        let path = format!("/rest/v1/profiles?id=eq.{}", id);
        let rows: Vec<Profile> = self
            .db
            .request(Method::GET, &path, None)
            .await
            .map_err(map_db_error)?;

        rows.into_iter().next().ok_or(DirectoryError::NotFound)
    }

    async fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>, DirectoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let id_list = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("/rest/v1/profiles?id=in.({})", id_list);

        self.db
            .request(Method::GET, &path, None)
            .await
            .map_err(map_db_error)
    }
}

fn map_db_error(err: DbError) -> DirectoryError {
    match err {
        DbError::NotFound(_) => DirectoryError::NotFound,
        other => DirectoryError::LookupFailed(other.to_string()),
    }
}
