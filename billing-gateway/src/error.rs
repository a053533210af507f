//! Error types for the billing gateway.
//!
//! Every fallible gateway operation returns [`Result<T>`], whose error type is
//! [`GatewayError`]. The variants fall into four groups:
//!
//! - **Transport** ([`GatewayError::Transport`]): the backend could not be reached or
//!   did not answer within the request timeout. Never translated.
//! - **Backend** ([`GatewayError::Backend`]): the backend answered with a non-2xx status
//!   that has no domain meaning for the operation. Carries the original status and body.
//! - **Domain** ([`GatewayError::UnknownCustomer`] and friends): stable, caller-facing
//!   errors produced by translating backend status codes.
//! - **Local** ([`GatewayError::InvalidRequest`], [`GatewayError::InvalidResponse`],
//!   [`GatewayError::ConfigError`]): detected before or after the network call.
//!
//! # Examples
//!
//! ```
//! use billing_gateway::error::{GatewayError, Result};
//!
//! fn require_uid(uid: &str) -> Result<&str> {
//!     if uid.is_empty() {
//!         return Err(GatewayError::InvalidRequest("uid must not be empty".to_owned()));
//!     }
//!     Ok(uid)
//! }
//!
//! assert!(require_uid("").is_err());
//! ```

use std::fmt;

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// A non-2xx answer from the billing backend.
///
/// Produced by the backend client, which never interprets status codes. The
/// gateway either translates it into a domain error or passes it through
/// unchanged inside [`GatewayError::Backend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// Name of the backend operation that failed (e.g. `listPlans`).
    pub operation: &'static str,
    /// HTTP status code returned by the backend.
    pub status: u16,
    /// `message` field of a `{message}` error body, or the raw body text.
    pub message: String,
    /// Raw response body.
    pub body: String,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} returned status {}: {}", self.operation, self.status, self.message)
    }
}

impl std::error::Error for BackendError {}

/// Errors that can occur in the billing gateway.
///
/// # Error Recovery
///
/// - **Transient errors** ([`Transport`](Self::Transport)): retry at the caller's
///   discretion; the gateway itself never retries
/// - **Domain errors**: surface to the end user, retrying will not help
/// - **Passthrough errors** ([`Backend`](Self::Backend)): inspect
///   [`status`](GatewayError::status) and the body
/// - **Configuration errors** ([`ConfigError`](Self::ConfigError)): fix the TOML file
///
/// This type implements `#[must_use]` to ensure errors are not silently ignored.
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network communication with the billing backend failed.
    ///
    /// Wraps [`reqwest::Error`]. Common causes include:
    /// - Request timeout (default: 15 seconds)
    /// - Connection refused or DNS resolution failure
    /// - TLS errors
    ///
    /// # Recovery
    ///
    /// Check [`is_timeout`](GatewayError::is_timeout) and retry with backoff if the
    /// operation is safe to repeat.
    #[error("billing backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a status that has no domain translation.
    ///
    /// # Recovery
    ///
    /// Usually a backend-side issue. The original status and body are preserved
    /// for diagnosis.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The backend does not know this customer.
    #[error("unknown customer: {uid}")]
    UnknownCustomer {
        /// Account identifier that was looked up.
        uid: String,
    },

    /// The backend does not know this subscription.
    #[error("unknown subscription: {subscription_id}")]
    UnknownSubscription {
        /// Subscription identifier that was addressed.
        subscription_id: String,
    },

    /// The requested plan does not exist.
    #[error("unknown subscription plan: {plan_id}")]
    UnknownSubscriptionPlan {
        /// Plan identifier supplied by the caller.
        plan_id: String,
    },

    /// The payment token was rejected while creating a subscription.
    ///
    /// # Recovery
    ///
    /// Ask the user for a different payment method.
    #[error("subscription payment token rejected: {message}")]
    RejectedPaymentToken {
        /// Reason reported by the backend.
        message: String,
    },

    /// The backend refused to update the customer's payment details.
    #[error("customer update rejected: {message}")]
    RejectedCustomerUpdate {
        /// Reason reported by the backend.
        message: String,
    },

    /// Subscriptions are administratively disabled.
    ///
    /// Returned by every gateway operation, without any network I/O, when the
    /// gateway was built from a configuration with `enabled = false`.
    #[error("subscriptions feature is not enabled")]
    FeatureNotEnabled,

    /// The request is missing a path parameter or payload field.
    ///
    /// Detected before any network call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The backend answered 2xx with a body that does not match the expected schema.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    /// Configuration could not be parsed or failed validation.
    ///
    /// # Recovery
    ///
    /// Fix the configuration file. The message names the offending key.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl GatewayError {
    /// HTTP status of a passed-through backend error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend(err) => Some(err.status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the request timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_timeout())
    }

    /// Whether this is a stable, caller-facing domain error.
    #[must_use]
    pub const fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::UnknownCustomer { .. }
                | Self::UnknownSubscription { .. }
                | Self::UnknownSubscriptionPlan { .. }
                | Self::RejectedPaymentToken { .. }
                | Self::RejectedCustomerUpdate { .. }
                | Self::FeatureNotEnabled
        )
    }
}
