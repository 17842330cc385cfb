//! Error types for the location pipeline and punch flow
//!
//! Only `GeoError`, `SubmitError` and `SignInError` are ever surfaced to a
//! caller. `GeocodeError` stays inside the reverse geocode cascade, where it
//! is turned into a miss.

use thiserror::Error;

/// Location service failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    /// Foreground permission not granted. Terminal for the current attempt.
    #[error("location permission denied")]
    PermissionDenied,

    /// Device location services switched off. Terminal for the current attempt.
    #[error("location services disabled")]
    ServicesDisabled,

    /// No fix could be produced and no last-known fix exists
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single reverse geocode strategy
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("geocode request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("geocode response undecodable: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("geocode strategy timed out after {}ms", .0.as_millis())]
    Timeout(std::time::Duration),

    #[error("platform geocoder failed: {0}")]
    Platform(String),
}

/// Reason a punch submission is refused before anything is sent
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("please enter shop/party name before punching in")]
    MissingShop,

    #[error("please enter a valid amount before punching in")]
    MissingAmount,

    #[error("please enable location access to punch")]
    LocationPermissionRequired,

    #[error("location not available, please wait for GPS")]
    LocationNotReady,
}

impl ValidationFailure {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::MissingShop => "MISSING_SHOP",
            ValidationFailure::MissingAmount => "MISSING_AMOUNT",
            ValidationFailure::LocationPermissionRequired => "LOCATION_PERMISSION_REQUIRED",
            ValidationFailure::LocationNotReady => "LOCATION_NOT_READY",
        }
    }
}

/// Outcome of `PunchSession::submit` when no event is produced
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationFailure),

    /// Another submission is still pending
    #[error("a punch submission is already in progress")]
    InFlight,

    /// Called outside a tokio runtime; nothing can be dispatched
    #[error("punch dispatch requires a running async runtime")]
    NoRuntime,
}

/// Submission backend failure; surfaced as a dismissible notice
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to submit punch: {0}")]
pub struct SubmissionFailure(pub String);

impl From<reqwest::Error> for SubmissionFailure {
    fn from(e: reqwest::Error) -> Self {
        SubmissionFailure(e.to_string())
    }
}

/// Backend request failures outside the punch path
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(u16),
}

/// Durable store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Sign-in flow failures
#[derive(Error, Debug)]
pub enum SignInError {
    #[error("please enter employee name")]
    MissingName,

    #[error("please enter a valid 10-digit phone number")]
    InvalidPhone,

    #[error("sign-in failed: {0}")]
    Backend(#[from] BackendError),

    #[error("could not persist identity: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_codes() {
        assert_eq!(ValidationFailure::MissingShop.code(), "MISSING_SHOP");
        assert_eq!(ValidationFailure::MissingAmount.code(), "MISSING_AMOUNT");
        assert_eq!(
            ValidationFailure::LocationPermissionRequired.code(),
            "LOCATION_PERMISSION_REQUIRED"
        );
        assert_eq!(ValidationFailure::LocationNotReady.code(), "LOCATION_NOT_READY");
    }

    #[test]
    fn test_submit_error_wraps_validation() {
        let err: SubmitError = ValidationFailure::MissingShop.into();
        assert_eq!(err, SubmitError::Invalid(ValidationFailure::MissingShop));
        assert_eq!(err.to_string(), "please enter shop/party name before punching in");
    }
}
