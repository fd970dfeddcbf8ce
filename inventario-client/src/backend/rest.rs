// inventario-client/src/backend/rest.rs
// REST backend - 网络通信

use super::AuthBackend;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::jwt;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::client::{
    ApiErrorBody, PasswordGrantRequest, RefreshGrantRequest, RolePermissionsUpdate,
    SetPasswordRequest, TokenResponse, UsernameLookup,
};
use shared::{AuthEvent, AuthUser, PermissionSet, ProfileUpdate, Role, Session, UserProfile};
use tokio::sync::broadcast;

/// Profile select with the role row joined in
const PROFILE_SELECT: &str = "*,role:roles(*)";

/// REST backend for the hosted auth/table/RPC API
///
/// The session lives in memory only; dropping the backend forgets it.
/// Refresh tokens are single use, so refreshes are serialized.
#[derive(Debug)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    session: RwLock<Option<Session>>,
    refresh_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

impl RestBackend {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            session: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            events,
        })
    }

    /// 获取基础 URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Adopt an existing token pair (e.g. handed over by a launcher)
    ///
    /// The access token is only decoded, not verified; the backend rejects it
    /// on first use if it is forged. Emits `SIGNED_IN`.
    pub fn restore_session(&self, access_token: &str, refresh_token: &str) -> ClientResult<Session> {
        let claims = jwt::parse_claims(access_token)
            .ok_or_else(|| ClientError::Validation("Access token is not a readable JWT".into()))?;

        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at: claims.exp,
            user: AuthUser {
                id: claims.sub,
                email: claims.email,
            },
        };

        self.set_session(Some(session.clone()));
        self.emit(AuthEvent::signed_in(session.clone()));
        tracing::debug!(user_id = %session.user.id, "Session restored from tokens");
        Ok(session)
    }

    fn set_session(&self, session: Option<Session>) {
        *self.session.write() = session;
    }

    fn current_session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// Swap the session only while it still holds `refresh_token`
    fn replace_if_current(&self, refresh_token: &str, next: Option<Session>) -> bool {
        let mut session = self.session.write();
        if session.as_ref().is_some_and(|s| s.refresh_token == refresh_token) {
            *session = next;
            true
        } else {
            false
        }
    }

    /// Exchange `stale`'s refresh token unless another caller already did
    ///
    /// Returns the session current after the lock is taken. A rejected token
    /// drops the session only if it is still the current one.
    async fn refresh_from(&self, stale: &Session) -> ClientResult<Option<Session>> {
        let _guard = self.refresh_lock.lock().await;
        match self.current_session() {
            None => return Ok(None),
            Some(current) if current.refresh_token != stale.refresh_token => {
                tracing::debug!(user_id = %current.user.id, "Session already refreshed");
                return Ok(Some(current));
            }
            Some(_) => {}
        }

        let req = RefreshGrantRequest {
            refresh_token: stale.refresh_token.clone(),
        };
        match self.token_grant("refresh_token", &req).await {
            Ok(session) => {
                if !self.replace_if_current(&stale.refresh_token, Some(session.clone())) {
                    tracing::debug!(user_id = %stale.user.id, "Session changed during refresh, keeping it");
                    return Ok(self.current_session());
                }
                self.emit(AuthEvent::token_refreshed(session.clone()));
                Ok(Some(session))
            }
            Err(e) if e.is_auth_failure() => {
                if self.replace_if_current(&stale.refresh_token, None) {
                    tracing::warn!(user_id = %stale.user.id, error = %e, "Refresh rejected, dropping session");
                    self.emit(AuthEvent::signed_out());
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn emit(&self, event: AuthEvent) {
        if let Err(e) = self.events.send(event) {
            tracing::debug!("No subscribers for auth event: {}", e.0.kind);
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let bearer = self
            .current_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.api_key.clone());
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn error_from_response(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return ClientError::Http(e),
        };

        // 尝试解析为 API 错误响应
        let body = serde_json::from_str::<ApiErrorBody>(&text).unwrap_or_default();
        let message = body.message.clone().unwrap_or_else(|| text.clone());

        match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized(message),
            StatusCode::FORBIDDEN => ClientError::Forbidden(message),
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            _ if body.code.is_some() => ClientError::Api {
                status: status.as_u16(),
                code: body.code.unwrap_or_default(),
                message,
            },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ClientError::Validation(message)
            }
            _ => ClientError::Internal(message),
        }
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(response.json().await?)
    }

    async fn handle_empty(response: reqwest::Response) -> ClientResult<()> {
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    async fn token_grant<B: serde::Serialize + Sync>(&self, grant_type: &str, body: &B) -> ClientResult<Session> {
        let response = self
            .request(Method::POST, "auth/v1/token")
            .query(&[("grant_type", grant_type)])
            .json(body)
            .send()
            .await?;
        let token: TokenResponse = Self::handle_response(response).await?;
        Ok(token.into_session(shared::util::now_secs()))
    }

    async fn single_row<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> ClientResult<T> {
        let rows: Vec<T> = Self::handle_response(response).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(what.to_string()))
    }
}

#[async_trait]
impl AuthBackend for RestBackend {
    async fn get_session(&self) -> ClientResult<Option<Session>> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        tracing::debug!(user_id = %session.user.id, "Session expired, refreshing");
        match self.refresh_from(&session).await {
            Ok(current) => Ok(current),
            Err(e) if e.is_auth_failure() => Ok(self.current_session()),
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ClientResult<Session> {
        let req = PasswordGrantRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let session = self.token_grant("password", &req).await?;

        self.set_session(Some(session.clone()));
        self.emit(AuthEvent::signed_in(session.clone()));
        tracing::debug!(user_id = %session.user.id, "Signed in with password");
        Ok(session)
    }

    async fn resolve_login_email(&self, username: &str) -> ClientResult<Option<String>> {
        let req = UsernameLookup {
            p_username: username.to_string(),
        };
        let response = self
            .request(Method::POST, "rest/v1/rpc/get_email_by_username")
            .json(&req)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn sign_out(&self) -> ClientResult<()> {
        // Build the request while the token is still known, then forget the
        // session before the network call so a dropped future still signs out.
        let Some(session) = self.current_session() else {
            return Ok(());
        };
        let request = self
            .client
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(&session.access_token);

        self.set_session(None);
        self.emit(AuthEvent::signed_out());

        let response = request.send().await?;
        Self::handle_empty(response).await
    }

    async fn refresh_session(&self) -> ClientResult<Session> {
        let current = self
            .current_session()
            .ok_or_else(|| ClientError::Unauthorized("No session to refresh".into()))?;
        self.refresh_from(&current)
            .await?
            .ok_or_else(|| ClientError::Unauthorized("Signed out during refresh".into()))
    }

    async fn fetch_profile(&self, user_id: &str) -> ClientResult<Option<UserProfile>> {
        let response = self
            .request(Method::GET, "rest/v1/profiles")
            .query(&[("id", format!("eq.{}", user_id)), ("select", PROFILE_SELECT.to_string())])
            .send()
            .await?;
        let rows: Vec<UserProfile> = Self::handle_response(response).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> ClientResult<UserProfile> {
        let response = self
            .request(Method::PATCH, "rest/v1/profiles")
            .query(&[("id", format!("eq.{}", user_id)), ("select", PROFILE_SELECT.to_string())])
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await?;
        Self::single_row(response, &format!("profile {}", user_id)).await
    }

    async fn update_role_permissions(&self, role_id: &str, permissions: &PermissionSet) -> ClientResult<Role> {
        let req = RolePermissionsUpdate {
            permissions: permissions.clone(),
        };
        let response = self
            .request(Method::PATCH, "rest/v1/roles")
            .query(&[("id", format!("eq.{}", role_id))])
            .header("Prefer", "return=representation")
            .json(&req)
            .send()
            .await?;
        Self::single_row(response, &format!("role {}", role_id)).await
    }

    async fn set_password(&self, user_id: &str, password: &str) -> ClientResult<()> {
        let req = SetPasswordRequest {
            p_user_id: user_id.to_string(),
            p_password: password.to_string(),
        };
        let response = self
            .request(Method::POST, "rest/v1/rpc/admin_set_password")
            .json(&req)
            .send()
            .await?;
        Self::handle_empty(response).await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
