//! Clients for the two external vehicle data sources: the DVLA Vehicle
//! Enquiry Service (tax and MOT status) and the DVSA MOT History API.

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

pub mod dvla;
pub mod mot;
pub mod retry;

pub use dvla::{DvlaClient, DvlaVehicle};
pub use mot::{MotClient, MotHistory, MotTest};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("vehicle not found")]
    NotFound,
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid provider response: {0}")]
    Decode(String),
    #[error("provider authentication failed: {0}")]
    Auth(String),
}

impl ProviderError {
    /// Transport failures, throttling and 5xx responses may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited | ProviderError::Transport(_) => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::NotFound | ProviderError::Decode(_) | ProviderError::Auth(_) => false,
        }
    }

    pub(crate) fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::NOT_FOUND => ProviderError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
            other => ProviderError::Status {
                status: other.as_u16(),
                body,
            },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            ProviderError::Decode(value.to_string())
        } else {
            ProviderError::Transport(value.to_string())
        }
    }
}

#[async_trait]
pub trait VehicleEnquiry: Send + Sync + 'static {
    async fn lookup(&self, registration: &str) -> Result<DvlaVehicle, ProviderError>;
}

#[async_trait]
pub trait MotHistoryProvider: Send + Sync + 'static {
    async fn history(&self, registration: &str) -> Result<MotHistory, ProviderError>;
}

/// Canonical stored form: upper case with single inner spaces ("BG21 EXH").
pub fn normalize_registration(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| part.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Form expected by both APIs: upper case, no whitespace ("BG21EXH").
pub fn api_registration(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !ch.is_whitespace())
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

pub fn is_plausible_registration(raw: &str) -> bool {
    let compact = api_registration(raw);
    (2..=8).contains(&compact.len()) && compact.chars().all(|ch| ch.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_normalisation() {
        assert_eq!(normalize_registration("  bg21   exh "), "BG21 EXH");
        assert_eq!(api_registration(" bg21 exh"), "BG21EXH");
    }

    #[test]
    fn plausible_registrations() {
        assert!(is_plausible_registration("BG21 EXH"));
        assert!(is_plausible_registration("A1"));
        assert!(!is_plausible_registration("B"));
        assert!(!is_plausible_registration("BG21-EXH"));
        assert!(!is_plausible_registration("ABCDEFGHIJ"));
    }

    #[test]
    fn retryable_errors() {
        assert!(ProviderError::RateLimited.is_retryable());
        assert!(ProviderError::Transport("reset".into()).is_retryable());
        assert!(ProviderError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Status {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::NotFound.is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            ProviderError::from_status(StatusCode::NOT_FOUND, String::new()),
            ProviderError::NotFound
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::BAD_GATEWAY, "oops".into()),
            ProviderError::Status { status: 502, .. }
        ));
    }
}
