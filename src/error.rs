//! Error taxonomy for the wallet ingestion service.
//!
//! One enum carries every failure category the pipeline and HTTP surface can
//! produce, each mapped to an HTTP status, a retry policy and a short machine
//! code so handlers never hand-roll status-code mapping.

use thiserror::Error;

pub type WalletDocResult<T> = Result<T, WalletDocError>;

#[derive(Error, Debug, Clone)]
pub enum WalletDocError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication denied")]
    AuthDenied,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream rate limited after {attempts} attempts")]
    UpstreamRateLimited { attempts: u32 },

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("upstream timeout after {0}s")]
    UpstreamTimeout(u64),

    #[error("requested wallet has no cached or fetchable data")]
    NotFound,

    #[error("feature disabled: {0}")]
    FeatureDisabled(String),

    #[error("pipeline canceled")]
    Canceled,

    #[error("pipeline exceeded wall-clock budget of {0}s")]
    Timeout(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WalletDocError {
    /// HTTP status code this error maps to (§6.3).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::AuthDenied => 401,
            Self::RateLimited { .. } => 429,
            Self::NotFound => 404,
            Self::FeatureDisabled(_) => 501,
            Self::UpstreamRateLimited { .. } | Self::UpstreamTimeout(_) => 504,
            Self::UpstreamFailure(_) => 502,
            Self::Canceled => 499,
            Self::Timeout(_) => 504,
            Self::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::AuthDenied => "auth_denied",
            Self::RateLimited { .. } => "rate_limited",
            Self::UpstreamRateLimited { .. } => "upstream_rate_limited",
            Self::UpstreamFailure(_) => "upstream_failure",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::NotFound => "not_found",
            Self::FeatureDisabled(_) => "feature_disabled",
            Self::Canceled => "canceled",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether retrying the same request is expected to help.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::UpstreamRateLimited { .. }
                | Self::UpstreamFailure(_)
                | Self::UpstreamTimeout(_)
                | Self::Timeout(_)
        )
    }

    /// `Retry-After` seconds, when meaningful.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for WalletDocError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout(20)
        } else {
            Self::UpstreamFailure(err.to_string())
        }
    }
}
