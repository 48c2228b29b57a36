//! Quote provider error types.

use std::time::Duration;

use exrate_common::NonPositiveRate;
use thiserror::Error;

/// Errors raised while talking to an upstream quote provider.
///
/// Provider implementations surface these to the engine wrapped in
/// [`RateError::Provider`](exrate_common::RateError::Provider).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The provider has no rate for a requested target.
    #[error("no rate for {base}/{target}")]
    NoData { base: String, target: String },

    /// The provider returned a rate the service cannot store.
    #[error(transparent)]
    InvalidRate(#[from] NonPositiveRate),

    /// The call did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The provider refused the call.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Result type for provider transport code.
pub type ProviderResult<T> = Result<T, ProviderError>;
