use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;

/// Maximum number of characters of a resource API body kept in errors.
pub const ERROR_BODY_LIMIT: usize = 500;

/// Errors surfaced by an authentication attempt.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{endpoint} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected {endpoint} response: {message}")]
    Protocol {
        endpoint: &'static str,
        message: String,
        body: String,
    },
    #[error("pod redirect did not settle after {attempts} StartAuthentication calls")]
    RedirectLoopExceeded { attempts: u32 },
    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),
    #[error("resource API returned HTTP {status}: {body}")]
    ResourceApi { status: StatusCode, body: String },
    #[error("another authentication attempt is already in progress")]
    AttemptInProgress,
    #[error("browser event stream closed before a credential was captured")]
    BrowserClosed,
    #[error("browser error: {0}")]
    Browser(String),
    #[error("no credential captured within {0:?}")]
    CaptureTimedOut(std::time::Duration),
}

/// Coarse classification used when reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Input,
    Transport,
    Protocol,
    RedirectLoop,
    Rejected,
    ResourceApi,
    Browser,
}

impl AuthError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AuthError::Config(_) | AuthError::InvalidInput(_) | AuthError::Url(_) => {
                FailureKind::Input
            }
            AuthError::Transport(_) | AuthError::UnexpectedStatus { .. } => FailureKind::Transport,
            AuthError::Protocol { .. } => FailureKind::Protocol,
            AuthError::RedirectLoopExceeded { .. } => FailureKind::RedirectLoop,
            AuthError::AuthenticationRejected(_) => FailureKind::Rejected,
            AuthError::ResourceApi { .. } => FailureKind::ResourceApi,
            AuthError::AttemptInProgress
            | AuthError::BrowserClosed
            | AuthError::Browser(_)
            | AuthError::CaptureTimedOut(_) => FailureKind::Browser,
        }
    }

    /// Build a resource API error, keeping only the head of the body.
    pub fn resource_api(status: StatusCode, body: &str) -> Self {
        AuthError::ResourceApi {
            status,
            body: truncate_body(body),
        }
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => body[..idx].to_owned(),
        None => body.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_body_is_capped() {
        let body = "x".repeat(2_000);
        let err = AuthError::resource_api(StatusCode::INTERNAL_SERVER_ERROR, &body);
        match err {
            AuthError::ResourceApi { body, .. } => assert_eq!(body.len(), ERROR_BODY_LIMIT),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let body = "é".repeat(600);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().count(), ERROR_BODY_LIMIT);
    }

    #[test]
    fn rejection_is_not_a_transport_failure() {
        let err = AuthError::AuthenticationRejected("Invalid code".into());
        assert_eq!(err.kind(), FailureKind::Rejected);
        assert_eq!(err.to_string(), "authentication rejected: Invalid code");
    }
}
