use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

use crate::models::trip::TripStatus;

/// Main error type for the dispatch core.
#[derive(Debug)]
pub enum DispatchError {
    // Business logic errors
    ActiveTripExists {
        trip_id: u64,
        status: TripStatus,
    },
    InsufficientFunds {
        required: f64,
        balance: f64,
    },
    TripNotAvailable(String),
    DriverAtCapacity(usize),
    StaleState {
        expected: TripStatus,
        actual: TripStatus,
    },
    NotFound(String),

    // Validation errors
    Validation {
        field: String,
        message: String,
    },
    MissingRequiredField(String),

    // External collaborators
    NotificationDelivery(String),
    BroadcastFailed(String),

    // Everything else
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::ActiveTripExists { trip_id, status } => write!(
                f,
                "an active trip already exists: trip {} is {:?}",
                trip_id, status
            ),
            DispatchError::InsufficientFunds { required, balance } => write!(
                f,
                "insufficient wallet balance: required {:.2}, available {:.2}",
                required, balance
            ),
            DispatchError::TripNotAvailable(msg) => write!(f, "trip not available: {}", msg),
            DispatchError::DriverAtCapacity(max) => write!(
                f,
                "driver already holds the maximum of {} concurrent trips",
                max
            ),
            DispatchError::StaleState { expected, actual } => write!(
                f,
                "stale trip state: expected {:?}, found {:?}",
                expected, actual
            ),
            DispatchError::NotFound(msg) => write!(f, "not found: {}", msg),
            DispatchError::Validation { field, message } => {
                write!(f, "invalid value for '{}': {}", field, message)
            }
            DispatchError::MissingRequiredField(field) => {
                write!(f, "missing required field: {}", field)
            }
            DispatchError::NotificationDelivery(msg) => {
                write!(f, "notification delivery failed: {}", msg)
            }
            DispatchError::BroadcastFailed(msg) => write!(f, "broadcast failed: {}", msg),
            DispatchError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for DispatchError {}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            DispatchError::ActiveTripExists { .. } => {
                (StatusCode::CONFLICT, "active_trip_exists", self.to_string())
            }
            DispatchError::InsufficientFunds { .. } => {
                (StatusCode::BAD_REQUEST, "insufficient_funds", self.to_string())
            }
            DispatchError::TripNotAvailable(_) => {
                (StatusCode::CONFLICT, "trip_not_available", self.to_string())
            }
            DispatchError::DriverAtCapacity(_) => {
                (StatusCode::CONFLICT, "driver_at_capacity", self.to_string())
            }
            // Race losses on the conditional transition surface the same way
            // a wrong-status request does.
            DispatchError::StaleState { .. } => {
                (StatusCode::CONFLICT, "trip_not_available", self.to_string())
            }
            DispatchError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            DispatchError::Validation { .. } | DispatchError::MissingRequiredField(_) => {
                (StatusCode::BAD_REQUEST, "validation_failed", self.to_string())
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                self.to_string(),
            ),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

// Convenience type alias for Results
pub type DispatchResult<T> = Result<T, DispatchError>;

// Helper functions for creating common errors
impl DispatchError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        DispatchError::NotFound(resource.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DispatchError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        DispatchError::Internal(msg.into())
    }

    pub fn trip_not_available(msg: impl Into<String>) -> Self {
        DispatchError::TripNotAvailable(msg.into())
    }

    /// Collapse a conditional-transition race loss into the caller-facing
    /// `TripNotAvailable` kind; every other error passes through.
    pub fn surface_stale(self, what: &str) -> Self {
        match self {
            DispatchError::StaleState { actual, .. } => DispatchError::TripNotAvailable(format!(
                "{} (current status {:?})",
                what, actual
            )),
            other => other,
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::NotificationDelivery(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Internal(format!("serialization error: {}", err))
    }
}
