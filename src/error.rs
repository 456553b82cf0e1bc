// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Control-plane errors. These are the only errors a caller of the HTTP API
/// ever observes; ingest-path failures (decode, source, bus) are counted and
/// logged instead, never surfaced — see the Metrics Registry.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("camera '{id}' already exists")]
    Conflict { id: String },

    #[error("camera '{id}' not found")]
    NotFound { id: String },

    #[error("camera '{id}' is not an http_push source")]
    WrongSourceType { id: String },

    #[error("camera '{id}' has no frame yet")]
    NoFrameYet { id: String },

    #[error("could not decode frame: {0}")]
    BadFrame(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IngestError {
    fn kind(&self) -> &'static str {
        match self {
            IngestError::Validation(_) => "validation_error",
            IngestError::Conflict { .. } => "conflict",
            IngestError::NotFound { .. } => "not_found",
            IngestError::WrongSourceType { .. } => "wrong_source_type",
            IngestError::NoFrameYet { .. } => "no_frame_yet",
            IngestError::BadFrame(_) => "bad_frame",
            IngestError::Config(_) => "config_error",
            IngestError::Io(_) => "io_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::Conflict { .. } => StatusCode::CONFLICT,
            IngestError::NotFound { .. } => StatusCode::NOT_FOUND,
            IngestError::WrongSourceType { .. } => StatusCode::CONFLICT,
            IngestError::NoFrameYet { .. } => StatusCode::CONFLICT,
            IngestError::BadFrame(_) => StatusCode::BAD_REQUEST,
            IngestError::Config(_) | IngestError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody { error: self.kind(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}
