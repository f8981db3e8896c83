// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::container::Status;

/// Error taxonomy for the compute-dispatch gateway core.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("not found")]
    NotFound,

    #[error("transition {from:?} -> {to:?} not allowed")]
    TransitionNotAllowed { from: Status, to: Status },

    #[error("hook rejected transition {from:?} -> {to:?}: {source}")]
    HookFailure { from: Status, to: Status, #[source] source: anyhow::Error },

    #[error("container runtime error: {0}")]
    Runtime(#[source] anyhow::Error),

    #[error("probe failed: {0}")]
    Probe(#[source] anyhow::Error),

    #[error("timed out waiting for container to become ready")]
    Timeout,

    #[error("aggregator already finalized")]
    Canceled,

    #[error("container entry is terminally failed; retry with a new request")]
    EntryFailed,

    #[error("entry already exists")]
    AlreadyExists,

    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl GatewayError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TransitionNotAllowed { .. } => StatusCode::CONFLICT,
            Self::HookFailure { .. } => StatusCode::BAD_GATEWAY,
            Self::Runtime(_) | Self::Probe(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Canceled => StatusCode::CONFLICT,
            Self::EntryFailed => StatusCode::CONFLICT,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::TransitionNotAllowed { .. } => "TRANSITION_NOT_ALLOWED",
            Self::HookFailure { .. } => "HOOK_FAILURE",
            Self::Runtime(_) => "RUNTIME_ERROR",
            Self::Probe(_) => "PROBE_FAILURE",
            Self::Timeout => "TIMEOUT",
            Self::Canceled => "CANCELED",
            Self::EntryFailed => "ENTRY_FAILED",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody { code: self.code().to_owned(), message: self.to_string() }
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        (self.http_status(), Json(ErrorResponse { error: self.to_error_body() }))
    }

    /// gRPC status mapping per the "User-visible codes" rule: internal
    /// errors become `Internal`, timeouts become `DeadlineExceeded`, unknown
    /// IDs become `NotFound`.
    pub fn to_tonic_status(&self) -> tonic::Status {
        match self {
            Self::NotFound => tonic::Status::not_found(self.to_string()),
            Self::Timeout => tonic::Status::deadline_exceeded(self.to_string()),
            Self::AlreadyExists => tonic::Status::already_exists(self.to_string()),
            _ => tonic::Status::internal(self.to_string()),
        }
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<crate::runtime::RuntimeError> for GatewayError {
    fn from(err: crate::runtime::RuntimeError) -> Self {
        Self::Runtime(err.into())
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        self.to_http_response().into_response()
    }
}
