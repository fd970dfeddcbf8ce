//! SessionStore - session bootstrap and permission gate
//!
//! Owns the `{user, profile, loading}` state for the lifetime of the app.
//! Only this type writes it; everything else reads snapshots or subscribes.
//!
//! Mutations happen under one synchronous mutex that is never held across an
//! `.await`. Profile loads go through a [`SingleFlight`] keyed by session epoch
//! and identity; the epoch moves forward on every sign-out so results of loads
//! started before it are dropped.

use super::single_flight::{Flight, SingleFlight};
use super::state::{AuthSnapshot, ProfileLoad, ProfileStatus, SessionPhase};
use crate::backend::AuthBackend;
use crate::config::ClientConfig;
use crate::error::{SessionError, SessionResult};
use parking_lot::Mutex;
use shared::{AuthEvent, AuthEventKind, AuthUser, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Handle to an in-flight profile load
pub type ProfileFlight = Flight<ProfileLoad>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProfileKey {
    epoch: u64,
    user_id: String,
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: AuthSnapshot,
    /// Identity whose profile was already requested in this epoch
    attempted_for: Option<String>,
    epoch: u64,
}

impl Inner {
    /// Record the session's user; a different identity invalidates the profile
    fn set_user(&mut self, user: AuthUser) {
        if self.snapshot.profile.as_ref().is_some_and(|p| p.id != user.id) {
            self.snapshot.profile = None;
        }
        self.snapshot.user = Some(user);
    }

    fn settled_phase(&self) -> SessionPhase {
        match (&self.snapshot.user, &self.snapshot.profile) {
            (None, _) => SessionPhase::SignedOut,
            (Some(_), Some(_)) => SessionPhase::Authenticated(ProfileStatus::Loaded),
            (Some(_), None) => SessionPhase::Authenticated(ProfileStatus::Failed),
        }
    }

    fn clear(&mut self) {
        self.epoch += 1;
        self.attempted_for = None;
        self.snapshot = AuthSnapshot {
            phase: SessionPhase::SignedOut,
            ..AuthSnapshot::default()
        };
    }
}

struct StoreShared {
    backend: Arc<dyn AuthBackend>,
    profile_timeout: Duration,
    sign_out_timeout: Duration,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<AuthSnapshot>,
    flights: SingleFlight<ProfileKey, ProfileLoad>,
}

/// Session store
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    shared: Arc<StoreShared>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.shared.state_tx.borrow())
            .field("flights", &self.shared.flights)
            .finish()
    }
}

impl SessionStore {
    pub fn new(backend: Arc<dyn AuthBackend>, config: &ClientConfig) -> Self {
        Self::with_timeouts(backend, config.profile_timeout, config.sign_out_timeout)
    }

    pub fn with_timeouts(
        backend: Arc<dyn AuthBackend>,
        profile_timeout: Duration,
        sign_out_timeout: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(AuthSnapshot::default());
        Self {
            shared: Arc::new(StoreShared {
                backend,
                profile_timeout,
                sign_out_timeout,
                inner: Mutex::new(Inner::default()),
                state_tx,
                flights: SingleFlight::new(),
            }),
        }
    }

    // ========== Read side ==========

    pub fn snapshot(&self) -> AuthSnapshot {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.shared.state_tx.subscribe()
    }

    pub fn has_permission(&self, module: &str, action: &str) -> bool {
        self.shared.state_tx.borrow().has_permission(module, action)
    }

    /// `Ok` when allowed, `PermissionDenied` otherwise
    pub fn require_permission(&self, module: &str, action: &str) -> SessionResult<()> {
        if self.has_permission(module, action) {
            Ok(())
        } else {
            Err(SessionError::permission_denied(module, action))
        }
    }

    pub fn backend(&self) -> &Arc<dyn AuthBackend> {
        &self.shared.backend
    }

    // ========== State mutation ==========

    /// Mutate under the lock and publish the new snapshot before releasing it
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.shared.inner.lock();
        let result = f(&mut *inner);
        self.shared.state_tx.send_if_modified(|published| {
            if *published == inner.snapshot {
                false
            } else {
                *published = inner.snapshot.clone();
                true
            }
        });
        result
    }

    fn clear_local(&self, reason: &str) {
        self.update(Inner::clear);
        tracing::debug!(reason, "Local session cleared");
    }

    // ========== Bootstrap ==========

    /// Fetch the current session and load its profile
    ///
    /// Never fails: a session fetch error leaves the store signed out.
    pub async fn bootstrap(&self) -> AuthSnapshot {
        let epoch = self.update(|inner| {
            inner.snapshot.loading = true;
            inner.snapshot.phase = SessionPhase::Loading;
            inner.epoch
        });

        let session = match self.shared.backend.get_session().await {
            Ok(session) => session,
            Err(e) => {
                let err = SessionError::SessionFetch(e.to_string());
                tracing::warn!(error = %err, "Session bootstrap failed, continuing signed out");
                None
            }
        };

        let flight = self.update(|inner| {
            if inner.epoch != epoch {
                // Signed out while the session was being fetched
                return None;
            }
            match session {
                Some(session) => {
                    inner.set_user(session.user);
                    self.begin_profile_load(inner)
                }
                None if inner.snapshot.user.is_none() => {
                    inner.snapshot.loading = false;
                    inner.snapshot.phase = SessionPhase::SignedOut;
                    None
                }
                // A sign-in event got here first
                None => None,
            }
        });

        match flight {
            Some(flight) => {
                flight.await;
            }
            None => self.settle_if_idle(),
        }

        let snapshot = self.snapshot();
        tracing::info!(
            user_id = snapshot.user_id().unwrap_or("-"),
            role = snapshot.role_label(),
            "Session bootstrap finished"
        );
        snapshot
    }

    /// Clear `loading` when nothing is in flight for the current identity
    fn settle_if_idle(&self) {
        self.update(|inner| {
            let in_flight = inner.snapshot.user.as_ref().is_some_and(|u| {
                self.shared.flights.is_in_flight(&ProfileKey {
                    epoch: inner.epoch,
                    user_id: u.id.clone(),
                })
            });
            if !in_flight && inner.snapshot.loading {
                inner.snapshot.loading = false;
                inner.snapshot.phase = inner.settled_phase();
            }
        });
    }

    // ========== Profile loading ==========

    /// Load the profile for `user_id` unless it was already requested
    ///
    /// Concurrent callers for the same identity share one fetch. Returns
    /// [`ProfileLoad::Skipped`] when the identity was already attempted and
    /// nothing is in flight.
    pub async fn load_profile(&self, user_id: &str) -> ProfileLoad {
        let flight = self.update(|inner| {
            if inner.snapshot.user_id() != Some(user_id) {
                tracing::debug!(user_id, "Profile load for an identity that is not signed in");
            }
            self.begin_profile_load_for(inner, user_id)
        });
        match flight {
            Some(flight) => flight.await,
            None => ProfileLoad::Skipped,
        }
    }

    /// Forget the attempt for the current identity and load again
    pub async fn refresh_profile(&self) -> SessionResult<ProfileLoad> {
        let flight = self.update(|inner| {
            let user_id = inner
                .snapshot
                .user_id()
                .map(str::to_string)
                .ok_or(SessionError::NotAuthenticated)?;
            let key = ProfileKey {
                epoch: inner.epoch,
                user_id: user_id.clone(),
            };
            if !self.shared.flights.is_in_flight(&key) {
                inner.attempted_for = None;
            }
            Ok::<_, SessionError>(self.begin_profile_load_for(inner, &user_id))
        })?;
        Ok(match flight {
            Some(flight) => flight.await,
            None => ProfileLoad::Skipped,
        })
    }

    fn begin_profile_load(&self, inner: &mut Inner) -> Option<ProfileFlight> {
        let user_id = inner.snapshot.user_id()?.to_string();
        self.begin_profile_load_for(inner, &user_id)
    }

    /// Guard check-and-set; runs under the state lock, before any suspension point
    fn begin_profile_load_for(&self, inner: &mut Inner, user_id: &str) -> Option<ProfileFlight> {
        let key = ProfileKey {
            epoch: inner.epoch,
            user_id: user_id.to_string(),
        };

        if inner.attempted_for.as_deref() == Some(user_id) {
            let joined = self.shared.flights.get(&key);
            if joined.is_none() {
                tracing::debug!(user_id, "Profile already requested for this identity, skipping");
            }
            return joined;
        }

        inner.attempted_for = Some(user_id.to_string());
        inner.snapshot.loading = true;
        inner.snapshot.phase = SessionPhase::Loading;

        let store = self.clone();
        let flight_key = key.clone();
        let (flight, _) = self
            .shared
            .flights
            .run(key, async move { store.fetch_and_apply(flight_key).await });
        tracing::debug!(user_id, "Profile load started");
        Some(flight)
    }

    async fn fetch_and_apply(&self, key: ProfileKey) -> ProfileLoad {
        let deadline = self.shared.profile_timeout;
        let fetch = self.shared.backend.fetch_profile(&key.user_id);

        let outcome = match tokio::time::timeout(deadline, fetch).await {
            Ok(Ok(Some(profile))) => ProfileLoad::Loaded(profile),
            Ok(Ok(None)) => ProfileLoad::NotFound,
            Ok(Err(e)) => ProfileLoad::Failed(SessionError::ProfileFetch(e.to_string())),
            Err(_) => ProfileLoad::Failed(SessionError::ProfileFetchTimeout(deadline)),
        };

        self.apply_profile(&key, outcome)
    }

    fn apply_profile(&self, key: &ProfileKey, outcome: ProfileLoad) -> ProfileLoad {
        self.update(|inner| {
            // Deregister while the result is published so a refresh sees a settled key
            self.shared.flights.forget(key);

            let current =
                inner.epoch == key.epoch && inner.snapshot.user_id() == Some(key.user_id.as_str());
            if !current {
                tracing::debug!(user_id = %key.user_id, "Discarding profile load for a stale session");
                return ProfileLoad::Discarded;
            }

            match &outcome {
                ProfileLoad::Loaded(profile) => {
                    tracing::info!(
                        user_id = %key.user_id,
                        role = profile.role_label(),
                        full_access = profile.role.as_ref().is_some_and(|r| r.grants_all()),
                        "Profile loaded"
                    );
                    inner.snapshot.profile = Some(profile.clone());
                }
                ProfileLoad::NotFound => {
                    tracing::warn!(user_id = %key.user_id, "No profile for user, permissions denied");
                    inner.snapshot.profile = None;
                }
                ProfileLoad::Failed(err) => {
                    tracing::warn!(user_id = %key.user_id, error = %err, "Profile load failed, permissions denied");
                    inner.snapshot.profile = None;
                }
                ProfileLoad::Discarded | ProfileLoad::Skipped => {}
            }
            inner.snapshot.loading = false;
            inner.snapshot.phase = inner.settled_phase();
            outcome
        })
    }

    // ========== Auth events ==========

    /// Apply an auth event synchronously
    ///
    /// Returns the profile load the event started or joined, if any. The load
    /// runs on its own; awaiting the handle is optional.
    pub fn dispatch(&self, event: AuthEvent) -> Option<ProfileFlight> {
        tracing::debug!(kind = %event.kind, user_id = event.user_id().unwrap_or("-"), "Auth event");

        match (event.kind, event.session) {
            (AuthEventKind::SignedIn, Some(session)) => self.update(|inner| {
                inner.set_user(session.user);
                self.begin_profile_load(inner)
            }),
            (AuthEventKind::SignedOut, _) => {
                self.clear_local("signed-out event");
                None
            }
            (AuthEventKind::TokenRefreshed, Some(session)) => {
                self.update(|inner| {
                    if inner.snapshot.user_id() != Some(session.user_id()) {
                        tracing::warn!(user_id = %session.user.id, "Token refresh carried a different identity");
                    }
                    inner.set_user(session.user);
                });
                None
            }
            (AuthEventKind::InitialSession, Some(session)) => self.update(|inner| {
                let cached_for_user = inner
                    .snapshot
                    .profile
                    .as_ref()
                    .is_some_and(|p| p.id == session.user.id);
                inner.set_user(session.user);
                if cached_for_user {
                    None
                } else {
                    self.begin_profile_load(inner)
                }
            }),
            (AuthEventKind::InitialSession, None) => {
                self.update(|inner| {
                    if inner.snapshot.user.is_none() && !inner.snapshot.loading {
                        inner.snapshot.phase = SessionPhase::SignedOut;
                    }
                });
                None
            }
            (kind, None) => {
                tracing::warn!(%kind, "Auth event without session ignored");
                None
            }
        }
    }

    /// Apply an auth event and wait for any profile load it triggered
    pub async fn on_auth_event(&self, event: AuthEvent) {
        if let Some(flight) = self.dispatch(event) {
            flight.await;
        }
    }

    /// Follow the backend's auth events
    ///
    /// Replays the current session as `INITIAL_SESSION` first, then applies
    /// every delivered event until the backend's channel closes. Abort the
    /// handle to stop listening.
    pub fn spawn_listener(&self) -> JoinHandle<()> {
        let mut events = self.shared.backend.subscribe();
        let store = self.clone();

        tokio::spawn(async move {
            match store.shared.backend.get_session().await {
                Ok(session) => {
                    store.dispatch(AuthEvent::initial_session(session));
                }
                Err(e) => {
                    let err = SessionError::SessionFetch(e.to_string());
                    tracing::warn!(error = %err, "Initial session replay failed");
                }
            }

            loop {
                match events.recv().await {
                    Ok(event) => {
                        store.dispatch(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("Auth event stream closed");
                        break;
                    }
                }
            }
        })
    }

    // ========== Sign in / out ==========

    /// Sign in with an email or a username
    ///
    /// Waits for the profile load before returning the resulting state.
    pub async fn sign_in(&self, identifier: &str, password: &str) -> SessionResult<AuthSnapshot> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(SessionError::Validation(
                "Identifier and password are required".into(),
            ));
        }

        let email = if identifier.contains('@') {
            identifier.to_string()
        } else {
            match self.shared.backend.resolve_login_email(identifier).await {
                Ok(Some(email)) => email,
                Ok(None) => {
                    tracing::info!(username = identifier, "Sign-in for unknown username");
                    return Err(SessionError::InvalidCredentials);
                }
                Err(e) => return Err(SessionError::SignIn(e.to_string())),
            }
        };

        let session: Session = self
            .shared
            .backend
            .sign_in_with_password(&email, password)
            .await
            .map_err(|e| {
                if e.is_auth_failure() {
                    SessionError::InvalidCredentials
                } else {
                    SessionError::SignIn(e.to_string())
                }
            })?;

        tracing::info!(user_id = %session.user.id, "Signed in");
        self.on_auth_event(AuthEvent::signed_in(session)).await;
        Ok(self.snapshot())
    }

    /// Sign out; local state is cleared whatever the backend does
    ///
    /// A timeout is logged and swallowed. Only a definite backend failure is
    /// returned, after the local state has been cleared.
    pub async fn sign_out(&self) -> SessionResult<()> {
        let deadline = self.shared.sign_out_timeout;
        let outcome = match tokio::time::timeout(deadline, self.shared.backend.sign_out()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::SignOut(e.to_string())),
            Err(_) => Err(SessionError::SignOutTimeout(deadline)),
        };

        self.clear_local("sign-out");

        match outcome {
            Ok(()) => {
                tracing::info!("Signed out");
                Ok(())
            }
            Err(SessionError::SignOutTimeout(waited)) => {
                tracing::warn!(timeout = ?waited, "Sign-out timed out, local session cleared anyway");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-out failed, local session cleared");
                Err(e)
            }
        }
    }
}
