//! 标准错误码：把各厂商的错误码与 HTTP 状态映射为统一的重试分类。
//!
//! Standard provider error codes.
//!
//! Every backend reports failures differently: OpenAI and xAI put a code in
//! `error.code`, Anthropic in `error.type`, Gemini in `error.status`, and a
//! local Ollama server only gives an HTTP status. This module folds all of them
//! into one [`StandardErrorCode`], which in turn decides the [`FailureClass`]
//! the retry policy acts on.
//!
//! | Prefix | Category    | Failure class           |
//! |--------|-------------|-------------------------|
//! | E1xxx  | client      | Fatal                   |
//! | E2xxx  | rate        | RateLimited             |
//! | E3xxx  | server      | Transient               |
//! | E4xxx  | operational | Transient / Fatal       |
//! | E9xxx  | unknown     | Fatal                   |
//!
//! ## Example
//!
//! ```rust
//! use bug_oracle::error_code::StandardErrorCode;
//! use bug_oracle::FailureClass;
//!
//! let code = StandardErrorCode::from_provider_code("insufficient_quota").unwrap();
//! assert_eq!(code.code(), "E2002");
//! assert_eq!(code.failure_class(), FailureClass::RateLimited);
//! ```

use crate::error::FailureClass;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardErrorCode {
    /// E1001: Malformed request, invalid parameters, or missing required fields
    InvalidRequest,
    /// E1002: Invalid, expired, or missing API key
    Authentication,
    /// E1003: Valid credentials but insufficient permissions
    PermissionDenied,
    /// E1004: Requested model or endpoint does not exist
    NotFound,
    /// E1005: Input exceeds context window or payload size limit
    RequestTooLarge,
    /// E2001: Request rate limit exceeded
    RateLimited,
    /// E2002: Account usage quota or billing limit reached
    QuotaExhausted,
    /// E3001: Internal server error on provider side
    ServerError,
    /// E3002: Provider temporarily overloaded
    Overloaded,
    /// E3003: Request timed out before a response arrived
    Timeout,
    /// E4001: State conflict on the provider side
    Conflict,
    /// E4002: Request was cancelled
    Cancelled,
    /// E9999: Error could not be classified
    Unknown,
}

impl StandardErrorCode {
    /// Returns the canonical code string (e.g., `"E1001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "E1001",
            Self::Authentication => "E1002",
            Self::PermissionDenied => "E1003",
            Self::NotFound => "E1004",
            Self::RequestTooLarge => "E1005",
            Self::RateLimited => "E2001",
            Self::QuotaExhausted => "E2002",
            Self::ServerError => "E3001",
            Self::Overloaded => "E3002",
            Self::Timeout => "E3003",
            Self::Conflict => "E4001",
            Self::Cancelled => "E4002",
            Self::Unknown => "E9999",
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::ServerError => "server_error",
            Self::Overloaded => "overloaded",
            Self::Timeout => "timeout",
            Self::Conflict => "conflict",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the category: `"client"`, `"rate"`, `"server"`, `"operational"`, or `"unknown"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::Authentication
            | Self::PermissionDenied
            | Self::NotFound
            | Self::RequestTooLarge => "client",
            Self::RateLimited | Self::QuotaExhausted => "rate",
            Self::ServerError | Self::Overloaded | Self::Timeout => "server",
            Self::Conflict | Self::Cancelled => "operational",
            Self::Unknown => "unknown",
        }
    }

    /// Retry classification. Quota exhaustion is treated like a rate limit:
    /// providers lift both after a wait.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::RateLimited | Self::QuotaExhausted => FailureClass::RateLimited,
            Self::ServerError | Self::Overloaded | Self::Timeout | Self::Conflict => {
                FailureClass::Transient
            }
            Self::InvalidRequest
            | Self::Authentication
            | Self::PermissionDenied
            | Self::NotFound
            | Self::RequestTooLarge
            | Self::Cancelled
            | Self::Unknown => FailureClass::Fatal,
        }
    }

    #[inline]
    pub fn retryable(&self) -> bool {
        self.failure_class().is_retryable()
    }

    /// Maps a provider error code/type/status string to a `StandardErrorCode`.
    ///
    /// Covers OpenAI-style codes (`insufficient_quota`, `rate_limit_exceeded`),
    /// Anthropic error types (`overloaded_error`, `rate_limit_error`) and Google
    /// RPC statuses (`RESOURCE_EXHAUSTED`, `UNAVAILABLE`).
    pub fn from_provider_code(provider_code: &str) -> Option<Self> {
        let code = match provider_code {
            "invalid_request" | "invalid_request_error" | "INVALID_ARGUMENT"
            | "FAILED_PRECONDITION" => Self::InvalidRequest,
            "authentication" | "invalid_api_key" | "authentication_error" | "UNAUTHENTICATED" => {
                Self::Authentication
            }
            "permission_denied" | "permission_error" | "PERMISSION_DENIED" => {
                Self::PermissionDenied
            }
            "not_found" | "not_found_error" | "model_not_found" | "NOT_FOUND" => Self::NotFound,
            "request_too_large" | "context_length_exceeded" => Self::RequestTooLarge,
            "rate_limited" | "rate_limit_exceeded" | "rate_limit_error" => Self::RateLimited,
            "quota_exhausted" | "insufficient_quota" | "RESOURCE_EXHAUSTED" => {
                Self::QuotaExhausted
            }
            "server_error" | "api_error" | "INTERNAL" => Self::ServerError,
            "overloaded" | "overloaded_error" | "UNAVAILABLE" => Self::Overloaded,
            "timeout" | "DEADLINE_EXCEEDED" => Self::Timeout,
            "conflict" | "ABORTED" => Self::Conflict,
            "cancelled" | "CANCELLED" => Self::Cancelled,
            _ => return None,
        };
        Some(code)
    }

    /// Maps an HTTP status code to the most likely `StandardErrorCode`.
    ///
    /// Any 5xx without a dedicated mapping counts as a server error.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            503 | 529 => Self::Overloaded,
            504 => Self::Timeout,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Provider code wins over the HTTP status when both are known.
    pub fn classify(status: u16, provider_code: Option<&str>) -> Self {
        provider_code
            .and_then(Self::from_provider_code)
            .unwrap_or_else(|| Self::from_http_status(status))
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
