//! Observable session state.

use crate::error::SessionError;
use shared::models::NO_ROLE_LABEL;
use shared::{AuthUser, UserProfile};

/// Outcome of the last profile load for an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStatus {
    Loaded,
    /// Not found, failed or timed out; permissions are denied
    Failed,
}

/// Session lifecycle
///
/// `Uninitialized → Loading → {Authenticated(_), SignedOut}`,
/// `Authenticated(_) → SignedOut`, `SignedOut → Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Loading,
    Authenticated(ProfileStatus),
    SignedOut,
}

/// `{user, profile, loading}` as seen by the rest of the application
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthSnapshot {
    pub user: Option<AuthUser>,
    pub profile: Option<UserProfile>,
    pub loading: bool,
    pub phase: SessionPhase,
}

impl AuthSnapshot {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Permission check; denies whenever no profile or role is loaded
    pub fn has_permission(&self, module: &str, action: &str) -> bool {
        self.profile
            .as_ref()
            .is_some_and(|p| p.has_permission(module, action))
    }

    /// Role name for display, "Sin rol" when none is loaded
    pub fn role_label(&self) -> &str {
        self.profile
            .as_ref()
            .map(UserProfile::role_label)
            .unwrap_or(NO_ROLE_LABEL)
    }
}

/// Result of a profile load request
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileLoad {
    Loaded(UserProfile),
    /// No profile row for the identity; a valid outcome, not an error
    NotFound,
    Failed(SessionError),
    /// Settled after sign-out or an identity switch; result dropped
    Discarded,
    /// Already attempted for this identity; nothing was fetched
    Skipped,
}

impl ProfileLoad {
    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            Self::Loaded(profile) => Some(profile),
            _ => None,
        }
    }
}
