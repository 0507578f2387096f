//! SpaceCode API error types.
//!
//! Errors are split into transient (retry with backoff) and permanent (return
//! to the caller at once). Callers of status posts and webhook sync log both
//! kinds and carry on; only the retry loop cares about the difference.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceErrorKind {
    /// 5xx, 408, 429, network failures.
    Transient,
    /// Everything else: bad request, auth failures, not found.
    Permanent,
}

impl SpaceErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, SpaceErrorKind::Transient)
    }
}

#[derive(Debug, Clone, Error)]
pub struct SpaceApiError {
    pub kind: SpaceErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
    /// `Retry-After` of a rate-limited response.
    pub retry_after: Option<Duration>,
}

impl fmt::Display for SpaceApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "SpaceCode API error (HTTP {}): {}", code, self.message),
            None => write!(f, "SpaceCode API error: {}", self.message),
        }
    }
}

impl SpaceApiError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: SpaceErrorKind::Transient,
            status_code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: SpaceErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Categorizes an HTTP error response.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let kind = match status_code {
            408 | 429 => SpaceErrorKind::Transient,
            code if (500..600).contains(&code) => SpaceErrorKind::Transient,
            _ => SpaceErrorKind::Permanent,
        };
        Self {
            kind,
            status_code: Some(status_code),
            message: message.into(),
            retry_after: None,
        }
    }

    /// HTTP 429, optionally naming how long to back off.
    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self {
            retry_after,
            ..Self::from_status(429, message)
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::from_status(404, message)
    }

    /// The interpreter answered an effect with the wrong response variant.
    pub fn unexpected_response(effect: &str, response: impl fmt::Debug) -> Self {
        Self::permanent(format!("unexpected response to {effect}: {response:?}"))
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_categorization() {
        assert_eq!(SpaceApiError::from_status(503, "down").kind, SpaceErrorKind::Transient);
        assert_eq!(SpaceApiError::from_status(429, "slow").kind, SpaceErrorKind::Transient);
        assert_eq!(SpaceApiError::from_status(408, "timeout").kind, SpaceErrorKind::Transient);
        assert_eq!(SpaceApiError::from_status(401, "expired").kind, SpaceErrorKind::Permanent);
        assert_eq!(SpaceApiError::from_status(404, "gone").kind, SpaceErrorKind::Permanent);
    }

    #[test]
    fn rate_limited_is_transient_and_keeps_delay() {
        let err = SpaceApiError::rate_limited(Some(Duration::from_secs(5)), "slow down");
        assert!(err.kind.is_retriable());
        assert_eq!(err.status_code, Some(429));
        assert_eq!(err.retry_after, Some(Duration::from_secs(5)));
        assert_eq!(SpaceApiError::from_status(429, "slow").retry_after, None);
    }

    #[test]
    fn not_found_is_detectable() {
        assert!(SpaceApiError::not_found("webhook").is_not_found());
        assert!(!SpaceApiError::permanent("other").is_not_found());
    }

    #[test]
    fn display_includes_status() {
        let err = SpaceApiError::from_status(500, "boom");
        assert_eq!(err.to_string(), "SpaceCode API error (HTTP 500): boom");
        assert_eq!(
            SpaceApiError::transient("reset").to_string(),
            "SpaceCode API error: reset"
        );
    }

    #[test]
    fn only_transient_is_retriable() {
        assert!(SpaceErrorKind::Transient.is_retriable());
        assert!(!SpaceErrorKind::Permanent.is_retriable());
    }
}
