//! Failure taxonomy for weather lookups.
//!
//! Providers return a [`FetchError`]; everything downstream acts on the
//! [`ErrorClass`] it is classified into.

use std::fmt;
use thiserror::Error;

/// Errors reported by the weather API itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("city not found")]
    CityNotFound,
    #[error("server failure")]
    ServerFailure,
    #[error("invalid API key")]
    InvalidKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The host could not be reached at all (no route, DNS failure, refused).
    NotConnected,
    TimedOut,
    Other,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportKind::NotConnected => "not connected",
            TransportKind::TimedOut => "timed out",
            TransportKind::Other => "transport error",
        };
        f.write_str(s)
    }
}

/// Raw failure of a single lookup attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{kind}: {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("failed to decode weather response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn not_connected(message: impl Into<String>) -> Self {
        FetchError::Transport {
            kind: TransportKind::NotConnected,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return FetchError::Decode(err.to_string());
        }
        let kind = if err.is_connect() {
            TransportKind::NotConnected
        } else if err.is_timeout() {
            TransportKind::TimedOut
        } else {
            TransportKind::Other
        };
        FetchError::Transport {
            kind,
            message: err.to_string(),
        }
    }
}

/// Closed set of failure classes the pipeline reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    CityNotFound,
    ServerFailure,
    InvalidApiKey,
    NoConnectivity,
    Unknown,
}

impl ErrorClass {
    pub fn classify(err: &FetchError) -> Self {
        match err {
            FetchError::Api(ApiError::CityNotFound) => ErrorClass::CityNotFound,
            FetchError::Api(ApiError::ServerFailure) => ErrorClass::ServerFailure,
            FetchError::Api(ApiError::InvalidKey) => ErrorClass::InvalidApiKey,
            FetchError::Transport { kind: TransportKind::NotConnected, .. } => {
                ErrorClass::NoConnectivity
            }
            _ => ErrorClass::Unknown,
        }
    }

    /// Message shown to the user for this class.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorClass::CityNotFound => "City Name is invalid",
            ErrorClass::ServerFailure => "Server error",
            ErrorClass::InvalidApiKey => "Key is invalid",
            ErrorClass::NoConnectivity => "No Internet Connection",
            ErrorClass::Unknown => "An error occurred",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A request that exhausted its attempts or lost its readiness source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("giving up after {attempts} attempt(s), last failure: {class}")]
pub struct TerminalFailure {
    pub class: ErrorClass,
    pub attempts: u32,
}
