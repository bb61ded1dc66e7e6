use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

// ==============================================================================
// APPOINTMENT RECORD MODEL
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum CountryCode {
    #[serde(rename = "PE")]
    Peru,
    #[serde(rename = "CL")]
    Chile,
}

impl CountryCode {
    pub const ALL: [CountryCode; 2] = [CountryCode::Peru, CountryCode::Chile];

    pub fn as_str(&self) -> &'static str {
        match self {
            CountryCode::Peru => "PE",
            CountryCode::Chile => "CL",
        }
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountryCode {
    type Err = ValidationFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PE" => Ok(CountryCode::Peru),
            "CL" => Ok(CountryCode::Chile),
            other => Err(ValidationFailure::UnsupportedCountry(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Completed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Completed => "completed",
        }
    }

    /// Status only ever moves forward; re-applying `Completed` is allowed.
    pub fn can_transition_to(&self, target: &AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, target),
            (Pending, Pending) | (Pending, Completed) | (Completed, Completed)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = ValidationFailure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "completed" => Ok(AppointmentStatus::Completed),
            other => Err(ValidationFailure::UnsupportedStatus(other.to_string())),
        }
    }
}

/// A scheduled appointment awaiting (or having received) confirmation from
/// its country backend.
///
/// Deserialization always goes through [`validate_appointment`], so a value
/// of this type is known to be well formed regardless of where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", try_from = "serde_json::Value")]
pub struct AppointmentRecord {
    appointment_id: String,
    insured_id: String,
    country_code: CountryCode,
    status: AppointmentStatus,
    created_at: DateTime<Utc>,
}

impl AppointmentRecord {
    /// Builds a fresh `pending` record stamped with the current time.
    pub fn new(appointment_id: impl Into<String>, insured_id: impl Into<String>, country_code: CountryCode) -> Self {
        Self {
            appointment_id: appointment_id.into(),
            insured_id: insured_id.into(),
            country_code,
            status: AppointmentStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn appointment_id(&self) -> &str {
        &self.appointment_id
    }

    pub fn insured_id(&self) -> &str {
        &self.insured_id
    }

    pub fn country_code(&self) -> CountryCode {
        self.country_code
    }

    pub fn status(&self) -> AppointmentStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_completed(&self) -> bool {
        self.status == AppointmentStatus::Completed
    }

    /// Advances the record to `completed`. Returns `true` if the status changed.
    pub fn mark_completed(&mut self) -> bool {
        if self.is_completed() {
            return false;
        }
        self.status = AppointmentStatus::Completed;
        true
    }

    pub fn to_view(&self) -> AppointmentView {
        AppointmentView::from(self)
    }
}

impl TryFrom<Value> for AppointmentRecord {
    type Error = ValidationFailure;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        validate_appointment(&value)
    }
}

/// Public projection of a record returned by queries. `createdAt` is never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub appointment_id: String,
    pub insured_id: String,
    pub country_code: CountryCode,
    pub status: AppointmentStatus,
}

impl From<&AppointmentRecord> for AppointmentView {
    fn from(record: &AppointmentRecord) -> Self {
        Self {
            appointment_id: record.appointment_id.clone(),
            insured_id: record.insured_id.clone(),
            country_code: record.country_code,
            status: record.status,
        }
    }
}

// ==============================================================================
// SHAPE VALIDATOR
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("payload is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    InvalidField { field: &'static str, expected: &'static str },

    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("unsupported country: {0}")]
    UnsupportedCountry(String),

    #[error("unsupported status: {0}")]
    UnsupportedStatus(String),

    #[error("invalid createdAt timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Checks that an arbitrary JSON value has the appointment record shape and
/// returns the typed record on success.
///
/// Used at every boundary where a record enters the system: the master
/// store read path, the notification message decoder and serde itself.
pub fn validate_appointment(value: &Value) -> Result<AppointmentRecord, ValidationFailure> {
    let object = value.as_object().ok_or(ValidationFailure::NotAnObject)?;

    let appointment_id = required_string(object, "appointmentId")?;
    let insured_id = required_string(object, "insuredId")?;

    // Older producers named the field `countryISO`.
    let country_code = if object.contains_key("countryCode") {
        required_string(object, "countryCode")?
    } else if object.contains_key("countryISO") {
        required_string(object, "countryISO")?
    } else {
        return Err(ValidationFailure::MissingField("countryCode"));
    };
    let country_code = CountryCode::from_str(country_code)?;

    let status = AppointmentStatus::from_str(required_string(object, "status")?)?;

    let created_at = parse_timestamp(required_string(object, "createdAt")?)?;

    Ok(AppointmentRecord {
        appointment_id: appointment_id.to_string(),
        insured_id: insured_id.to_string(),
        country_code,
        status,
        created_at,
    })
}

fn required_string<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, ValidationFailure> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationFailure::MissingField(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ValidationFailure::EmptyField(field)),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ValidationFailure::InvalidField { field, expected: "a string" }),
    }
}

/// RFC 3339, or a zone-less date-time (`T` or space separated) read as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationFailure> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| ValidationFailure::InvalidTimestamp(raw.to_string()))
}

pub fn is_valid_appointment(value: &Value) -> bool {
    validate_appointment(value).is_ok()
}

// ==============================================================================
// NOTIFICATION MESSAGE
// ==============================================================================

/// Wire payload handed from the fan-out router to a country consumer: the
/// serialized snapshot of a record at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    body: String,
}

impl NotificationMessage {
    pub fn from_record(record: &AppointmentRecord) -> Result<Self, serde_json::Error> {
        Ok(Self {
            body: serde_json::to_string(record)?,
        })
    }

    pub fn from_body(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn into_body(self) -> String {
        self.body
    }

    /// Parses and validates the snapshot carried by this message.
    pub fn decode(&self) -> Result<AppointmentRecord, ValidationFailure> {
        let value: Value = serde_json::from_str(&self.body)
            .map_err(|e| ValidationFailure::MalformedJson(e.to_string()))?;
        validate_appointment(&value)
    }
}
