//! Response bodies.
//!
//! Every rejection is `{"error": <message>, "code": <reason_code>}` with the
//! reason's status. Messages are fixed strings; internals never leak.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::webhook::{Acceptance, RejectReason};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AcceptedBody {
    pub status: &'static str,
    pub fingerprint: String,
}

impl IntoResponse for RejectReason {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl IntoResponse for Acceptance {
    fn into_response(self) -> Response {
        let body = AcceptedBody {
            status: "accepted",
            fingerprint: self.fingerprint.as_str().to_string(),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

pub fn unknown_provider() -> Response {
    let body = ErrorBody {
        error: "Unknown provider".to_string(),
        code: "unknown_provider",
    };
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
