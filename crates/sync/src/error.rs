//! Cart error taxonomy with Sentry integration.
//!
//! Every fallible cart operation returns [`CartError`]. The facade reports
//! server-side failures through [`CartError::report`] before handing the
//! error to the UI layer, which decides between prompting for login, showing
//! a generic notice, or offering a retry.

use std::time::Duration;

use thiserror::Error;

use cartsync_core::LineId;

/// Errors surfaced by the remote adapter, the validation service and the facade.
#[derive(Debug, Error)]
pub enum CartError {
    /// The backend rejected the session; the UI should prompt re-authentication.
    #[error("Login required")]
    LoginRequired,

    /// The backend answered with a non-2xx, non-unauthorized status.
    #[error("Cart mutation failed: {status} - {message}")]
    Mutation { status: u16, message: String },

    /// Connectivity failure talking to the backend.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The call did not complete within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with a body that does not match the contract.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Absolute quantity updates must be at least 1.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// The command named a line that is not in the current snapshot.
    #[error("Line not found: {0}")]
    LineNotFound(LineId),

    /// Building the HTTP client or a request URL failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CartError {
    /// Whether the caller may retry the same command unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Network(err) => !err.is_decode() && !err.is_builder(),
            _ => false,
        }
    }

    /// Whether the backend may have applied the call even though it failed.
    ///
    /// True when the request could have reached the backend but no status
    /// came back. Such a call must be confirmed by a re-fetch, not replayed.
    #[must_use]
    pub fn may_have_committed(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Network(err) => !err.is_connect() && !err.is_builder(),
            _ => false,
        }
    }

    /// Whether the UI should prompt for authentication.
    #[must_use]
    pub const fn is_login_required(&self) -> bool {
        matches!(self, Self::LoginRequired)
    }

    /// Whether this error points at the backend or at this crate rather than at the user.
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        matches!(
            self,
            Self::Mutation { .. } | Self::Decode(_) | Self::Internal(_)
        )
    }

    /// Capture server-side errors to Sentry and log every error once.
    pub fn report(&self, operation: &str) {
        if self.is_server_side() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                operation,
                sentry_event_id = %event_id,
                "Cart operation failed"
            );
        } else {
            tracing::warn!(error = %self, operation, "Cart operation failed");
        }
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Add a breadcrumb for cart actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// commands leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added line", Some(&[("product_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
