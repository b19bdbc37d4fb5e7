//! Error types for the invite-gate library.
//!
//! This module defines every error that can occur while issuing invoices, polling
//! for settlement and granting channel access.

use thiserror::Error;

/// Main error type for invite-gate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// No usable exchange-rate entry for the requested asset
    #[error("Exchange rate unavailable for {0}")]
    RateUnavailable(String),

    /// The payment gateway rejected a request
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// A status check failed; the poll counts as "not yet paid"
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    /// Invite creation failed after a confirmed payment
    #[error("Could not create invite link: {0}")]
    HostGrantError(String),

    /// Any other call to the messaging host failed
    #[error("Host error: {0}")]
    HostError(String),

    /// The poll bound was exhausted without observing settlement
    #[error("Invoice {invoice_id} not settled after {attempts} attempts")]
    SettlementTimeout {
        /// Invoice that was being watched
        invoice_id: i64,
        /// Number of status fetches performed
        attempts: u32,
    },

    /// Error during HTTP request/response handling
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error parsing URL
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for invite-gate operations.
pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GateError::RateUnavailable("TON".to_string());
        assert_eq!(err.to_string(), "Exchange rate unavailable for TON");

        let err = GateError::SettlementTimeout {
            invoice_id: 42,
            attempts: 30,
        };
        assert_eq!(err.to_string(), "Invoice 42 not settled after 30 attempts");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: GateError = json_err.into();
        assert!(matches!(err, GateError::JsonError(_)));

        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: GateError = url_err.into();
        assert!(matches!(err, GateError::UrlParseError(_)));
    }
}
