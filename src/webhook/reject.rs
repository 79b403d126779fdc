//! Rejection taxonomy.

use axum::http::StatusCode;

/// Why a webhook was not accepted.
///
/// The `Display` text is what the caller sees; it never carries detail
/// about the failing check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum RejectReason {
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Request too old")]
    StaleTimestamp,

    #[error("Duplicate request")]
    DuplicateRequest,

    #[error("Invalid payload")]
    MalformedPayload,

    #[error("Internal validation error")]
    InternalError,
}

impl RejectReason {
    pub const ALL: [RejectReason; 6] = [
        RejectReason::RateLimited,
        RejectReason::InvalidSignature,
        RejectReason::StaleTimestamp,
        RejectReason::DuplicateRequest,
        RejectReason::MalformedPayload,
        RejectReason::InternalError,
    ];

    pub fn status_code(&self) -> StatusCode {
        match self {
            RejectReason::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RejectReason::InvalidSignature => StatusCode::UNAUTHORIZED,
            RejectReason::StaleTimestamp => StatusCode::BAD_REQUEST,
            RejectReason::DuplicateRequest => StatusCode::CONFLICT,
            RejectReason::MalformedPayload => StatusCode::BAD_REQUEST,
            RejectReason::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, used in responses and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::RateLimited => "rate_limited",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::StaleTimestamp => "stale_timestamp",
            RejectReason::DuplicateRequest => "duplicate_request",
            RejectReason::MalformedPayload => "malformed_payload",
            RejectReason::InternalError => "internal_error",
        }
    }

    /// Position in `ALL`.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Rejections that may indicate an attack and are logged at `warn`.
    pub fn is_security_relevant(&self) -> bool {
        matches!(self, RejectReason::InvalidSignature | RejectReason::DuplicateRequest)
    }
}
