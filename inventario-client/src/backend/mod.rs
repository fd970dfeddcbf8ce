//! Backend module - the hosted auth/table/RPC collaborator.
//!
//! [`AuthBackend`] is everything the session layer needs from the backend.
//! [`RestBackend`] talks to the real service over HTTP; [`MemoryBackend`]
//! keeps everything in process for tests and offline demos.

mod memory;
mod rest;

pub use memory::{MemoryBackend, SignOutBehavior};
pub use rest::RestBackend;

use crate::error::ClientResult;
use async_trait::async_trait;
use shared::{AuthEvent, PermissionSet, ProfileUpdate, Role, Session, UserProfile};
use tokio::sync::broadcast;

/// Backend trait
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Current session, if any
    async fn get_session(&self) -> ClientResult<Option<Session>>;

    /// Password grant; emits `SIGNED_IN` on success
    async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<Session>;

    /// Login email for a username, `None` when the username is unknown
    async fn resolve_login_email(&self, username: &str) -> ClientResult<Option<String>>;

    /// Revoke the session; emits `SIGNED_OUT`
    async fn sign_out(&self) -> ClientResult<()>;

    /// Refresh grant; emits `TOKEN_REFRESHED`
    async fn refresh_session(&self) -> ClientResult<Session>;

    /// Profile row joined with its role, `None` when no row exists
    async fn fetch_profile(&self, user_id: &str) -> ClientResult<Option<UserProfile>>;

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> ClientResult<UserProfile>;

    async fn update_role_permissions(&self, role_id: &str, permissions: &PermissionSet) -> ClientResult<Role>;

    async fn set_password(&self, user_id: &str, password: &str) -> ClientResult<()>;

    /// Subscribe to auth lifecycle events
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
