use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use shared_models::error::AppError;
use shared_models::AppointmentRecord;

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

/// Body of `POST /appointment`. Every field is optional at the wire level so
/// that missing values are reported as a validation error, not a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateAppointmentRequest {
    #[serde(rename = "insuredId")]
    #[schema(example = "00123")]
    pub insured_id: Option<String>,

    #[serde(rename = "scheduleId")]
    #[schema(example = 456)]
    pub schedule_id: Option<u64>,

    #[serde(rename = "countryISO", alias = "countryCode")]
    #[schema(example = "PE")]
    pub country_iso: Option<String>,
}

impl CreateAppointmentRequest {
    pub fn new(insured_id: impl Into<String>, schedule_id: u64, country_iso: impl Into<String>) -> Self {
        Self {
            insured_id: Some(insured_id.into()),
            schedule_id: Some(schedule_id),
            country_iso: Some(country_iso.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAppointmentResponse {
    #[schema(example = "appointment pending scheduling")]
    pub message: String,
    pub appointment: AppointmentRecord,
}

pub const PENDING_SCHEDULING_MESSAGE: &str = "appointment pending scheduling";
pub const MISSING_FIELDS_MESSAGE: &str = "missing required fields";
pub const UNSUPPORTED_COUNTRY_MESSAGE: &str = "unsupported country";
pub const MALFORMED_BODY_MESSAGE: &str = "request body is missing or malformed";
pub const MISSING_INSURED_ID_MESSAGE: &str = "insuredId path parameter is required";

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Delivery error: {0}")]
    DeliveryError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::ValidationError(message) => AppError::ValidationError(message),
            AppointmentError::DeliveryError(detail) => {
                error!("Appointment notification could not be delivered: {}", detail);
                AppError::Internal("appointment could not be sent for scheduling".to_string())
            }
            AppointmentError::PersistenceError(detail) => {
                error!("Appointment store failure: {}", detail);
                AppError::Internal("appointment store unavailable".to_string())
            }
        }
    }
}
