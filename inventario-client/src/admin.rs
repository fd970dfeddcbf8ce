//! User administration
//!
//! Profile and role edits behind the permission gate. Every call checks the
//! signed-in user's role before touching the backend.

use crate::backend::AuthBackend;
use crate::error::{SessionError, SessionResult};
use crate::logger::AUDIT_TARGET;
use crate::session::SessionStore;
use shared::permissions::{EDIT, ROLES, USUARIOS, unknown_entries};
use shared::{PermissionSet, ProfileUpdate, Role, UserProfile};
use std::sync::Arc;

/// Shortest password accepted by `change_password`
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct UserAdmin {
    store: SessionStore,
}

impl UserAdmin {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    fn backend(&self) -> &Arc<dyn AuthBackend> {
        self.store.backend()
    }

    /// Signed-in user id, once the gate allows `module:action`
    fn authorize(&self, module: &str, action: &str) -> SessionResult<String> {
        let actor = self
            .store
            .snapshot()
            .user_id()
            .map(str::to_string)
            .ok_or(SessionError::NotAuthenticated)?;
        if let Err(e) = self.store.require_permission(module, action) {
            tracing::warn!(user_id = %actor, module, action, "Administration denied");
            return Err(e);
        }
        Ok(actor)
    }

    async fn apply_update(
        &self,
        actor: &str,
        user_id: &str,
        update: ProfileUpdate,
    ) -> SessionResult<UserProfile> {
        let profile = self.backend().update_profile(user_id, &update).await?;
        tracing::info!(
            target: AUDIT_TARGET,
            actor,
            user_id,
            display_name = ?update.display_name,
            role_id = ?update.role_id,
            active = ?update.active,
            "Profile updated"
        );
        if actor == user_id {
            self.refresh_own_profile().await;
        }
        Ok(profile)
    }

    async fn refresh_own_profile(&self) {
        if let Err(e) = self.store.refresh_profile().await {
            tracing::debug!(error = %e, "Own profile not refreshed");
        }
    }

    pub async fn change_role(&self, user_id: &str, role_id: &str) -> SessionResult<UserProfile> {
        let actor = self.authorize(USUARIOS, EDIT)?;
        let update = ProfileUpdate {
            role_id: Some(role_id.to_string()),
            ..Default::default()
        };
        self.apply_update(&actor, user_id, update).await
    }

    pub async fn set_active(&self, user_id: &str, active: bool) -> SessionResult<UserProfile> {
        let actor = self.authorize(USUARIOS, EDIT)?;
        let update = ProfileUpdate {
            active: Some(active),
            ..Default::default()
        };
        self.apply_update(&actor, user_id, update).await
    }

    pub async fn update_display_name(&self, user_id: &str, name: &str) -> SessionResult<UserProfile> {
        let actor = self.authorize(USUARIOS, EDIT)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::Validation("Display name cannot be empty".into()));
        }
        let update = ProfileUpdate {
            display_name: Some(name.to_string()),
            ..Default::default()
        };
        self.apply_update(&actor, user_id, update).await
    }

    pub async fn change_password(&self, user_id: &str, password: &str) -> SessionResult<()> {
        let actor = self.authorize(USUARIOS, EDIT)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SessionError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        self.backend().set_password(user_id, password).await?;
        tracing::info!(target: AUDIT_TARGET, actor = %actor, user_id, "Password changed");
        Ok(())
    }

    /// Replace a role's permission set
    ///
    /// Rejects modules or actions outside the catalogue.
    pub async fn update_role_permissions(
        &self,
        role_id: &str,
        permissions: PermissionSet,
    ) -> SessionResult<Role> {
        let actor = self.authorize(ROLES, EDIT)?;
        let unknown = unknown_entries(&permissions);
        if !unknown.is_empty() {
            return Err(SessionError::Validation(format!(
                "Unknown permissions: {}",
                unknown.join(", ")
            )));
        }

        let role = self
            .backend()
            .update_role_permissions(role_id, &permissions)
            .await?;
        tracing::info!(
            target: AUDIT_TARGET,
            actor = %actor,
            role_id,
            role = %role.name,
            "Role permissions updated"
        );

        let own_role = self
            .store
            .snapshot()
            .profile
            .and_then(|p| p.role_id)
            .is_some_and(|id| id == role_id);
        if own_role {
            self.refresh_own_profile().await;
        }
        Ok(role)
    }
}
