//! In-process backend
//!
//! Keeps users, profiles, roles and the current session in memory. Latency and
//! failures of the profile fetch and sign-out calls can be programmed, and the
//! number of profile fetches is counted, so session behaviour can be driven
//! deterministically.

use super::AuthBackend;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{AuthEvent, AuthUser, PermissionSet, ProfileUpdate, Role, Session, UserProfile};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Token lifetime of in-memory sessions (seconds)
const SESSION_TTL_SECS: i64 = 3600;

/// How the sign-out call behaves
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SignOutBehavior {
    #[default]
    Succeed,
    /// Respond with a definite failure
    Fail(String),
    /// Never respond
    Hang,
}

#[derive(Debug, Clone)]
struct MemoryUser {
    id: String,
    email: String,
    username: String,
    password: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<MemoryUser>,
    profiles: HashMap<String, UserProfile>,
    roles: HashMap<String, Role>,
    session: Option<Session>,
    token_seq: u64,
    profile_delay: Option<Duration>,
    profile_hang: bool,
    profile_error: Option<String>,
    sign_out: SignOutBehavior,
}

impl MemoryState {
    fn joined(&self, profile: &UserProfile) -> UserProfile {
        let mut profile = profile.clone();
        profile.role = profile
            .role_id
            .as_ref()
            .and_then(|id| self.roles.get(id))
            .cloned();
        profile
    }

    fn issue_session(&mut self, user: AuthUser) -> Session {
        self.token_seq += 1;
        Session {
            access_token: format!("mem-access-{}", self.token_seq),
            refresh_token: format!("mem-refresh-{}", self.token_seq),
            expires_at: Some(shared::util::now_secs() + SESSION_TTL_SECS),
            user,
        }
    }
}

/// In-memory backend
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<AuthEvent>,
    profile_fetches: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(crate::config::DEFAULT_EVENT_CAPACITY);
        Self {
            state: Mutex::new(MemoryState::default()),
            events,
            profile_fetches: AtomicUsize::new(0),
        }
    }

    /// Register a login and its profile
    ///
    /// A role embedded in `profile` is registered too and linked through `role_id`.
    pub fn add_user(&self, email: &str, password: &str, mut profile: UserProfile) {
        let mut state = self.state.lock();
        if let Some(role) = profile.role.take() {
            profile.role_id = Some(role.id.clone());
            state.roles.insert(role.id.clone(), role);
        }
        state.users.push(MemoryUser {
            id: profile.id.clone(),
            email: email.to_string(),
            username: profile.username.clone(),
            password: password.to_string(),
        });
        state.profiles.insert(profile.id.clone(), profile);
    }

    /// Drop a profile row, keeping the login
    pub fn remove_profile(&self, user_id: &str) {
        self.state.lock().profiles.remove(user_id);
    }

    /// Issue a session for a registered user without emitting any event
    ///
    /// Mirrors a session that already existed before the app started.
    pub fn preload_session(&self, user_id: &str) -> ClientResult<Session> {
        let mut state = self.state.lock();
        let user = state
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| AuthUser {
                id: u.id.clone(),
                email: Some(u.email.clone()),
            })
            .ok_or_else(|| ClientError::NotFound(format!("user {}", user_id)))?;
        let session = state.issue_session(user);
        state.session = Some(session.clone());
        Ok(session)
    }

    pub fn set_profile_delay(&self, delay: Option<Duration>) {
        self.state.lock().profile_delay = delay;
    }

    /// Make profile fetches never complete
    pub fn set_profile_hang(&self, hang: bool) {
        self.state.lock().profile_hang = hang;
    }

    /// Make profile fetches fail with `message`
    pub fn set_profile_error(&self, message: Option<&str>) {
        self.state.lock().profile_error = message.map(str::to_string);
    }

    pub fn set_sign_out_behavior(&self, behavior: SignOutBehavior) {
        self.state.lock().sign_out = behavior;
    }

    /// Number of profile fetches issued so far
    pub fn profile_fetch_count(&self) -> usize {
        self.profile_fetches.load(Ordering::SeqCst)
    }

    /// Deliver an arbitrary auth event to subscribers
    pub fn emit(&self, event: AuthEvent) {
        if let Err(e) = self.events.send(event) {
            tracing::debug!("No subscribers for auth event: {}", e.0.kind);
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn get_session(&self) -> ClientResult<Option<Session>> {
        Ok(self.state.lock().session.clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<Session> {
        let session = {
            let mut state = self.state.lock();
            let user = state
                .users
                .iter()
                .find(|u| u.email.eq_ignore_ascii_case(email) && u.password == password)
                .map(|u| AuthUser {
                    id: u.id.clone(),
                    email: Some(u.email.clone()),
                })
                .ok_or_else(|| ClientError::Api {
                    status: 400,
                    code: "invalid_grant".into(),
                    message: "Invalid login credentials".into(),
                })?;
            let session = state.issue_session(user);
            state.session = Some(session.clone());
            session
        };

        self.emit(AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn resolve_login_email(&self, username: &str) -> ClientResult<Option<String>> {
        Ok(self
            .state
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.email.clone()))
    }

    async fn sign_out(&self) -> ClientResult<()> {
        let behavior = {
            let mut state = self.state.lock();
            state.session = None;
            state.sign_out.clone()
        };
        self.emit(AuthEvent::signed_out());

        match behavior {
            SignOutBehavior::Succeed => Ok(()),
            SignOutBehavior::Fail(message) => Err(ClientError::Internal(message)),
            SignOutBehavior::Hang => std::future::pending().await,
        }
    }

    async fn refresh_session(&self) -> ClientResult<Session> {
        let session = {
            let mut state = self.state.lock();
            let user = state
                .session
                .as_ref()
                .map(|s| s.user.clone())
                .ok_or_else(|| ClientError::Unauthorized("No session to refresh".into()))?;
            let session = state.issue_session(user);
            state.session = Some(session.clone());
            session
        };

        self.emit(AuthEvent::token_refreshed(session.clone()));
        Ok(session)
    }

    async fn fetch_profile(&self, user_id: &str) -> ClientResult<Option<UserProfile>> {
        self.profile_fetches.fetch_add(1, Ordering::SeqCst);

        let (delay, hang, error) = {
            let state = self.state.lock();
            (state.profile_delay, state.profile_hang, state.profile_error.clone())
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = error {
            return Err(ClientError::Internal(message));
        }

        let state = self.state.lock();
        Ok(state.profiles.get(user_id).map(|p| state.joined(p)))
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> ClientResult<UserProfile> {
        let mut state = self.state.lock();
        if let Some(role_id) = &update.role_id
            && !state.roles.contains_key(role_id)
        {
            return Err(ClientError::Validation(format!("Unknown role {}", role_id)));
        }

        let profile = state
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| ClientError::NotFound(format!("profile {}", user_id)))?;
        if let Some(name) = &update.display_name {
            profile.display_name = name.clone();
        }
        if let Some(role_id) = &update.role_id {
            profile.role_id = Some(role_id.clone());
        }
        if let Some(active) = update.active {
            profile.active = active;
        }

        let profile = profile.clone();
        Ok(state.joined(&profile))
    }

    async fn update_role_permissions(&self, role_id: &str, permissions: &PermissionSet) -> ClientResult<Role> {
        let mut state = self.state.lock();
        let role = state
            .roles
            .get_mut(role_id)
            .ok_or_else(|| ClientError::NotFound(format!("role {}", role_id)))?;
        role.permissions = permissions.clone();
        Ok(role.clone())
    }

    async fn set_password(&self, user_id: &str, password: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| ClientError::NotFound(format!("user {}", user_id)))?;
        user.password = password.to_string();
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
