use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, Store, UserRecord};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use shared::client::{
    PasswordGrantRequest, RefreshGrantRequest, RolePermissionsUpdate, SetPasswordRequest,
    TokenResponse, UsernameLookup,
};
use shared::permissions::{EDIT, ROLES, USUARIOS};
use shared::{AuthUser, ProfileUpdate, Role, UserProfile};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shortest password `admin_set_password` accepts
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(logout))
        .route("/rest/v1/profiles", get(list_profiles).patch(update_profiles))
        .route("/rest/v1/roles", patch(update_roles))
        .route("/rest/v1/rpc/get_email_by_username", post(email_by_username))
        .route("/rest/v1/rpc/admin_set_password", post(admin_set_password))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ========== Request guards ==========

fn check_api_key(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let key = headers.get("apikey").and_then(|h| h.to_str().ok());
    if key == Some(state.config.api_key.as_str()) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("Invalid API key"))
    }
}

/// Claims of the bearer access token
fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<Claims> {
    check_api_key(state, headers)?;

    let token = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Missing or invalid Authorization header"))?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| ApiError::unauthorized(format!("Invalid token: {}", e)))
}

fn require_permission(store: &Store, claims: &Claims, module: &str, action: &str) -> ApiResult<()> {
    if store.has_permission(&claims.sub, module, action) {
        Ok(())
    } else {
        tracing::info!(user_id = %claims.sub, module, action, "Permission denied");
        Err(ApiError::forbidden(format!("Missing permission {}:{}", module, action)))
    }
}

/// Value of a `column=eq.value` row filter
fn eq_filter(params: &HashMap<String, String>, column: &str) -> ApiResult<String> {
    params
        .get(column)
        .and_then(|v| v.strip_prefix("eq."))
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request(format!("Expected filter {}=eq.<value>", column)))
}

// ========== Auth ==========

#[derive(Deserialize)]
pub struct GrantQuery {
    grant_type: String,
}

fn issue_tokens(state: &AppState, store: &mut Store, user: &UserRecord) -> ApiResult<TokenResponse> {
    let ttl = state.config.token_ttl.as_secs() as i64;
    let expires_at = Utc::now().timestamp() + ttl;

    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        exp: expires_at,
    };
    let access_token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))?;

    Ok(TokenResponse {
        access_token,
        refresh_token: store.issue_refresh_token(&user.id),
        expires_in: ttl,
        expires_at: Some(expires_at),
        user: AuthUser {
            id: user.id.clone(),
            email: Some(user.email.clone()),
        },
    })
}

async fn token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<GrantQuery>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<TokenResponse>> {
    check_api_key(&state, &headers)?;
    let mut store = state.store.write().await;

    let user = match query.grant_type.as_str() {
        "password" => {
            let req: PasswordGrantRequest = serde_json::from_value(body)
                .map_err(|e| ApiError::bad_request(format!("Invalid body: {}", e)))?;
            let user = store
                .authenticate(&req.email, &req.password)
                .cloned()
                .ok_or_else(|| ApiError::invalid_grant("Invalid login credentials"))?;
            if !store.is_active(&user.id) {
                tracing::info!(user_id = %user.id, "Sign-in rejected for inactive user");
                return Err(ApiError::invalid_grant("User is inactive"));
            }
            user
        }
        "refresh_token" => {
            let req: RefreshGrantRequest = serde_json::from_value(body)
                .map_err(|e| ApiError::bad_request(format!("Invalid body: {}", e)))?;
            let user_id = store
                .take_refresh_token(&req.refresh_token)
                .ok_or_else(|| ApiError::invalid_grant("Invalid Refresh Token"))?;
            store
                .user_by_id(&user_id)
                .cloned()
                .ok_or_else(|| ApiError::invalid_grant("User not found"))?
        }
        other => {
            return Err(ApiError::bad_request(format!("Unsupported grant_type: {}", other)));
        }
    };

    let response = issue_tokens(&state, &mut store, &user)?;
    tracing::info!(user_id = %user.id, grant_type = %query.grant_type, "Token issued");
    Ok(Json(response))
}

async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<StatusCode> {
    let claims = authenticate(&state, &headers)?;
    state.store.write().await.revoke_refresh_tokens(&claims.sub);
    tracing::info!(user_id = %claims.sub, "Signed out");
    Ok(StatusCode::NO_CONTENT)
}

// ========== Tables ==========

async fn list_profiles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    authenticate(&state, &headers)?;
    let user_id = eq_filter(&params, "id")?;

    if let Some(delay) = state.config.profile_delay {
        tokio::time::sleep(delay).await;
    }

    let store = state.store.read().await;
    Ok(Json(store.profile(&user_id).into_iter().collect()))
}

async fn update_profiles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    let claims = authenticate(&state, &headers)?;
    let user_id = eq_filter(&params, "id")?;
    if update.is_empty() {
        return Err(ApiError::bad_request("Nothing to update"));
    }

    let mut store = state.store.write().await;
    require_permission(&store, &claims, USUARIOS, EDIT)?;
    if let Some(role_id) = &update.role_id
        && store.role(role_id).is_none()
    {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "foreign_key_violation",
            format!("Role {} does not exist", role_id),
        ));
    }

    let updated = store.update_profile(&user_id, &update);
    if updated.is_some() {
        tracing::info!(actor = %claims.sub, user_id = %user_id, "Profile updated");
    }
    Ok(Json(updated.into_iter().collect()))
}

async fn update_roles(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(update): Json<RolePermissionsUpdate>,
) -> ApiResult<Json<Vec<Role>>> {
    let claims = authenticate(&state, &headers)?;
    let role_id = eq_filter(&params, "id")?;

    let mut store = state.store.write().await;
    require_permission(&store, &claims, ROLES, EDIT)?;

    let updated = store.role_mut(&role_id).map(|role| {
        role.permissions = update.permissions;
        role.clone()
    });
    if let Some(role) = &updated {
        tracing::info!(actor = %claims.sub, role = %role.name, "Role permissions updated");
    }
    Ok(Json(updated.into_iter().collect()))
}

// ========== RPC ==========

async fn email_by_username(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UsernameLookup>,
) -> ApiResult<Json<Option<String>>> {
    check_api_key(&state, &headers)?;
    let store = state.store.read().await;
    Ok(Json(store.email_for_username(&req.p_username)))
}

async fn admin_set_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SetPasswordRequest>,
) -> ApiResult<StatusCode> {
    let claims = authenticate(&state, &headers)?;
    if req.p_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let mut store = state.store.write().await;
    require_permission(&store, &claims, USUARIOS, EDIT)?;
    if !store.set_password(&req.p_user_id, &req.p_password) {
        return Err(ApiError::not_found(format!("User {} not found", req.p_user_id)));
    }
    store.revoke_refresh_tokens(&req.p_user_id);

    tracing::info!(actor = %claims.sub, user_id = %req.p_user_id, "Password reset");
    Ok(StatusCode::NO_CONTENT)
}
