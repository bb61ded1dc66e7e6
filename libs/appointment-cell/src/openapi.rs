use axum::Json;
use utoipa::OpenApi;

use shared_models::error::ErrorBody;
use shared_models::{AppointmentRecord, AppointmentStatus, AppointmentView, CountryCode};

use crate::models::{CreateAppointmentRequest, CreateAppointmentResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Appointment scheduling API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Creates appointments that are confirmed asynchronously by the Peru and Chile backends."
    ),
    paths(
        crate::handlers::create_appointment,
        crate::handlers::list_appointments,
    ),
    components(
        schemas(
            CreateAppointmentRequest,
            CreateAppointmentResponse,
            AppointmentRecord,
            AppointmentView,
            AppointmentStatus,
            CountryCode,
            ErrorBody,
        )
    ),
    tags(
        (name = "appointments", description = "Appointment scheduling"),
    ),
)]
pub struct AppointmentApiDoc;

pub async fn get_openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(AppointmentApiDoc::openapi())
}
