use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::AuthUser;
use shared_models::error::AppError;

use crate::models::{AppointmentError, BookAppointmentRequest};
use crate::state::AppState;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ListAppointmentsQuery {
    pub page: Option<i64>,
}

// ==============================================================================
// HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let page = params.page.unwrap_or(1);

    let appointments = state
        .booking
        .list_appointments(user.id, page)
        .await
        .map_err(map_error)?;

    Ok(Json(json!(appointments)))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking
        .book_appointment(&user, request)
        .await
        .map_err(map_error)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking
        .cancel_appointment(&user, appointment_id)
        .await
        .map_err(map_error)?;

    Ok(Json(json!(appointment)))
}

/// Every `AppointmentError` kind keeps its own user-visible status; mail and
/// notification faults never reach this mapping because the services recover
/// from them locally.
fn map_error(e: AppointmentError) -> AppError {
    let message = e.to_string();
    match e {
        AppointmentError::InvalidInput(_) => AppError::ValidationError(message),
        AppointmentError::PastDate => AppError::BadRequest(message),
        AppointmentError::SlotTaken => AppError::BadRequest(message),
        AppointmentError::NotAProvider => AppError::Auth(message),
        AppointmentError::NotFound => AppError::NotFound(message),
        AppointmentError::Unauthorized => AppError::Auth(message),
        AppointmentError::AlreadyCanceled => AppError::Conflict(message),
        AppointmentError::TooLate(_) => AppError::Auth(message),
        AppointmentError::Database(_) => AppError::Database(message),
        AppointmentError::ExternalService(_) => AppError::ExternalService(message),
    }
}
