use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::warn;

use shared_models::error::{AppError, ErrorBody};
use shared_models::AppointmentView;

use crate::models::{
    CreateAppointmentRequest, CreateAppointmentResponse, MALFORMED_BODY_MESSAGE, MISSING_INSURED_ID_MESSAGE,
    PENDING_SCHEDULING_MESSAGE,
};
use crate::router::AppointmentState;

/// Schedules an appointment. The record is stored as `pending` and the
/// country backend confirms it asynchronously.
#[utoipa::path(
    post,
    path = "/appointment",
    tag = "appointments",
    request_body = CreateAppointmentRequest,
    responses(
        (status = 200, description = "Appointment stored and sent for scheduling", body = CreateAppointmentResponse),
        (status = 400, description = "Missing fields or unsupported country", body = ErrorBody),
        (status = 500, description = "Store or channel failure", body = ErrorBody),
    )
)]
pub async fn create_appointment(
    State(state): State<Arc<AppointmentState>>,
    payload: Result<Json<CreateAppointmentRequest>, JsonRejection>,
) -> Result<Json<CreateAppointmentResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected appointment body: {}", rejection.body_text());
        AppError::BadRequest(MALFORMED_BODY_MESSAGE.to_string())
    })?;

    let appointment = state.creation.create(&request).await?;

    Ok(Json(CreateAppointmentResponse {
        message: PENDING_SCHEDULING_MESSAGE.to_string(),
        appointment,
    }))
}

/// Lists the appointments of an insured party.
#[utoipa::path(
    get,
    path = "/appointment/{insuredId}",
    tag = "appointments",
    params(
        ("insuredId" = String, Path, description = "Insured party identifier"),
    ),
    responses(
        (status = 200, description = "Appointments in creation order, possibly empty", body = [AppointmentView]),
        (status = 400, description = "insuredId missing", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody),
    )
)]
pub async fn list_appointments(
    State(state): State<Arc<AppointmentState>>,
    Path(insured_id): Path<String>,
) -> Result<Json<Vec<AppointmentView>>, AppError> {
    let appointments = state.query.list_for_insured(&insured_id).await?;
    Ok(Json(appointments))
}

/// `GET /appointment` without the path parameter.
pub async fn missing_insured_id() -> AppError {
    AppError::BadRequest(MISSING_INSURED_ID_MESSAGE.to_string())
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
