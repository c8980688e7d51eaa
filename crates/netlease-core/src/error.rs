//! Error types for the netlease system
//!
//! This module defines all error types used throughout the crate.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Result type alias for netlease operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the netlease system
#[derive(Error, Debug)]
pub enum Error {
    /// OS network-mutation primitive failed
    #[error("network operation failed: {0}")]
    Network(String),

    /// The new lease address could not be installed.
    ///
    /// This is the only step failure that aborts a reconciliation pass:
    /// without the address in place nothing downstream is valid.
    #[error("failed to install address {address}/{netmask}: {message}")]
    AddressInstall {
        /// Address that failed to install
        address: Ipv4Addr,
        /// Netmask for the address
        netmask: Ipv4Addr,
        /// Underlying failure
        message: String,
    },

    /// Service-writer (resolver/NTP/NIS) errors
    #[error("service writer error: {0}")]
    ServiceWriter(String),

    /// Hook invocation errors
    #[error("hook error: {0}")]
    Hook(String),

    /// Session store errors
    #[error("session store error: {0}")]
    Session(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller handed us a lease that cannot be applied
    #[error("invalid lease: {0}")]
    InvalidLease(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a network-mutation error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an address-install error
    pub fn address_install(
        address: Ipv4Addr,
        netmask: Ipv4Addr,
        message: impl Into<String>,
    ) -> Self {
        Self::AddressInstall {
            address,
            netmask,
            message: message.into(),
        }
    }

    /// Create a service-writer error
    pub fn service_writer(msg: impl Into<String>) -> Self {
        Self::ServiceWriter(msg.into())
    }

    /// Create a hook error
    pub fn hook(msg: impl Into<String>) -> Self {
        Self::Hook(msg.into())
    }

    /// Create a session store error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid-lease error
    pub fn invalid_lease(msg: impl Into<String>) -> Self {
        Self::InvalidLease(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
