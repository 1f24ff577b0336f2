// crates/link-locker-server/src/error.rs
// ============================================================================
// Module: Link Locker API Errors
// Description: Mapping of engine errors to HTTP responses.
// Purpose: Keep the status-code taxonomy in one place.
// Dependencies: axum, link-locker-core, serde
// ============================================================================

//! ## Overview
//! Validation maps to 400, bad credentials to 401, untargeted tasks to 403,
//! unknown entities to 404, and unusable state to 409. Store failures and
//! anything unexpected become a generic 500 so internal details never leak.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use link_locker_core::EngineError;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Message returned for every 500.
const INTERNAL_MESSAGE: &str = "internal error";

/// Handler errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Engine rejected the request.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The handler exceeded the configured request timeout.
    #[error("request timed out")]
    Timeout,
    /// The blocking worker failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Engine(EngineError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Engine(EngineError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            Self::Engine(EngineError::Forbidden(_)) => StatusCode::FORBIDDEN,
            Self::Engine(EngineError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Engine(EngineError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::Engine(EngineError::Store(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the client-facing message.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Always false.
    success: bool,
    /// Human-readable reason.
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use link_locker_core::StoreError;

    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (EngineError::Validation("x".to_string()), StatusCode::BAD_REQUEST),
            (EngineError::Unauthorized("x".to_string()), StatusCode::UNAUTHORIZED),
            (EngineError::Forbidden("x".to_string()), StatusCode::FORBIDDEN),
            (EngineError::NotFound("x".to_string()), StatusCode::NOT_FOUND),
            (EngineError::Conflict("x".to_string()), StatusCode::CONFLICT),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
        assert_eq!(ApiError::Timeout.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn store_failures_hide_details() {
        let error = ApiError::from(EngineError::Store(StoreError::Io("disk /var/x".to_string())));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.public_message(), "internal error");
        let message = ApiError::from(EngineError::NotFound("task t".to_string())).public_message();
        assert_eq!(message, "not found: task t");
    }
}
