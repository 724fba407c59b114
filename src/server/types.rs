//! Request bodies and the API error type

use serde::Deserialize;
use serde_json::error::Category;

use super::rate_limit::Throttled;
use crate::accounts::AccountError;
use crate::domain::EventError;
use crate::store::StoreError;

/// POST /api/devices
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub device_id: String,
    pub character_name: String,
}

/// Error type for HTTP handlers. Each variant maps to one status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("missing or malformed bearer token")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("{0}")]
    Unprocessable(String),

    #[error("rate limit exceeded, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("database unavailable")]
    Unavailable,

    #[error("internal error")]
    Internal(#[source] StoreError),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::PayloadTooLarge => 413,
            Self::Unprocessable(_) => 422,
            Self::RateLimited { .. } => 429,
            Self::Internal(_) => 500,
            Self::Unavailable => 503,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Unprocessable(_) => "invalid",
            Self::RateLimited { .. } => "rate_limited",
            Self::Internal(_) => "internal",
            Self::Unavailable => "unavailable",
        }
    }

    /// Map a body decoding error: broken JSON is a 400, well-formed JSON of
    /// the wrong shape is a 422.
    pub fn from_json(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => Self::Unprocessable(err.to_string()),
            Category::Io | Category::Syntax | Category::Eof => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<Throttled> for ApiError {
    fn from(throttled: Throttled) -> Self {
        Self::RateLimited {
            retry_after: throttled.retry_after,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err)
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Invalid(msg) => Self::Unprocessable(msg),
            AccountError::NotFound => Self::NotFound("device not registered"),
            AccountError::Forbidden => Self::Forbidden(err.to_string()),
            AccountError::Store(e) => Self::Internal(e),
        }
    }
}

impl From<EventError> for ApiError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Json(e) => Self::from_json(e),
            EventError::MissingKind => Self::Unprocessable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_errors_split_by_category() {
        let syntax = serde_json::from_str::<RegisterRequest>("{oops").unwrap_err();
        assert_eq!(ApiError::from_json(syntax).status(), 400);

        let shape = serde_json::from_str::<RegisterRequest>(r#"{"device_id": 5}"#).unwrap_err();
        assert_eq!(ApiError::from_json(shape).status(), 422);
    }

    #[test]
    fn test_account_errors_map_to_statuses() {
        assert_eq!(ApiError::from(AccountError::Invalid("x".into())).status(), 422);
        assert_eq!(ApiError::from(AccountError::NotFound).status(), 404);
        assert_eq!(ApiError::from(AccountError::Forbidden).status(), 403);
    }

    #[test]
    fn test_missing_kind_is_unprocessable() {
        assert_eq!(ApiError::from(EventError::MissingKind).status(), 422);
    }
}
