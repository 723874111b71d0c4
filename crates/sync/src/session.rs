//! Authentication state that selects the active backing store.

use serde::{Deserialize, Serialize};

use crate::remote::SessionUser;

/// Who the cart currently belongs to.
///
/// `Guest` routes every cart command to the local store; `Authenticated`
/// routes them to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Guest,
    Authenticated { user: SessionUser },
}

impl AuthState {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    #[must_use]
    pub const fn user(&self) -> Option<&SessionUser> {
        match self {
            Self::Authenticated { user } => Some(user),
            Self::Guest => None,
        }
    }
}

/// How an authentication change affects the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    /// Anonymous -> authenticated: merge-on-login runs.
    SignedIn,
    /// Authenticated -> anonymous: the guest cart becomes active again.
    SignedOut,
    /// The authenticated user changed without passing through Guest.
    SwitchedUser,
    Unchanged,
}

impl SessionTransition {
    /// Classify the move from `from` to `to`.
    #[must_use]
    pub fn between(from: &AuthState, to: &AuthState) -> Self {
        match (from.user(), to.user()) {
            (None, Some(_)) => Self::SignedIn,
            (Some(_), None) => Self::SignedOut,
            (Some(a), Some(b)) if a.id != b.id => Self::SwitchedUser,
            _ => Self::Unchanged,
        }
    }
}
