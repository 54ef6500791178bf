//! HTTP error envelope.
//!
//! Every failure leaves the server as
//! `{ "error": { "kind", "message", "field"?, "correlationId" } }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tally_core::errors::{ApplicationError, InterfaceError};
use tracing::{error, warn};

use crate::workflows::Caller;

#[derive(Debug)]
pub enum ApiError {
    /// No usable identity headers, or an identity the store does not know.
    Unauthenticated { message: String, correlation_id: String },
    Interface(InterfaceError),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    kind: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
    correlation_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::Unauthenticated { message: message.into(), correlation_id: correlation_id.into() }
    }

    pub fn application(error: ApplicationError, correlation_id: &str) -> Self {
        Self::Interface(error.into_interface(correlation_id))
    }

    /// A body or query string that could not be decoded.
    pub fn malformed(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::Interface(InterfaceError::BadRequest {
            message: message.into(),
            field: None,
            correlation_id: correlation_id.into(),
        })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::Interface(interface) => match interface {
                InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
                InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
                InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
                InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn body(&self) -> ErrorBody<'_> {
        match self {
            Self::Unauthenticated { message, correlation_id } => ErrorBody {
                kind: "unauthenticated",
                message,
                field: None,
                correlation_id,
            },
            Self::Interface(interface) => ErrorBody {
                kind: interface.kind(),
                message: interface.message(),
                field: match interface {
                    InterfaceError::BadRequest { field, .. } => field.as_deref(),
                    _ => None,
                },
                correlation_id: interface.correlation_id(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %body.correlation_id,
                status = status.as_u16(),
                kind = body.kind,
                error = %body.message,
                "request failed"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            warn!(
                event_name = "api.request.unauthenticated",
                correlation_id = %body.correlation_id,
                error = %body.message,
                "request rejected without identity"
            );
        }
        (status, Json(ErrorEnvelope { error: body })).into_response()
    }
}

/// Attaches the caller's correlation id to a workflow failure.
pub trait ForCaller<T> {
    fn for_caller(self, caller: &Caller) -> Result<T, ApiError>;
}

impl<T> ForCaller<T> for Result<T, ApplicationError> {
    fn for_caller(self, caller: &Caller) -> Result<T, ApiError> {
        self.map_err(|error| ApiError::application(error, &caller.correlation_id))
    }
}
